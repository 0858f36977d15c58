use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;

use travel_core::{ClientId, TripId};

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_client))
        .route("/:id/trips", get(list_client_trips))
        .route(
            "/:id/trips/:trip_id",
            put(register_for_trip).delete(cancel_registration),
        )
}

pub async fn create_client(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::CreateClientRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_body", rejection.body_text());
        }
    };

    match services.registry.create_client(body.into()).await {
        Ok(id) => (StatusCode::CREATED, Json(json!({ "id": id }))).into_response(),
        Err(e) => errors::booking_error_to_response(e),
    }
}

pub async fn list_client_trips(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let client_id: ClientId = match dto::parse_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services.queries.list_client_trips(client_id).await {
        Ok(trips) => (StatusCode::OK, Json(trips)).into_response(),
        Err(e) => errors::booking_error_to_response(e),
    }
}

pub async fn register_for_trip(
    Extension(services): Extension<Arc<AppServices>>,
    Path((id, trip_id)): Path<(String, String)>,
) -> axum::response::Response {
    let (client_id, trip_id) = match parse_pair(&id, &trip_id) {
        Ok(pair) => pair,
        Err(res) => return res,
    };

    match services.engine.register(client_id, trip_id).await {
        Ok(registration) => (StatusCode::OK, Json(registration)).into_response(),
        Err(e) => errors::booking_error_to_response(e),
    }
}

pub async fn cancel_registration(
    Extension(services): Extension<Arc<AppServices>>,
    Path((id, trip_id)): Path<(String, String)>,
) -> axum::response::Response {
    let (client_id, trip_id) = match parse_pair(&id, &trip_id) {
        Ok(pair) => pair,
        Err(res) => return res,
    };

    match services.engine.cancel(client_id, trip_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::booking_error_to_response(e),
    }
}

fn parse_pair(client: &str, trip: &str) -> Result<(ClientId, TripId), axum::response::Response> {
    Ok((dto::parse_id(client)?, dto::parse_id(trip)?))
}
