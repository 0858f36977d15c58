use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/", get(list_trips))
}

pub async fn list_trips(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.queries.list_trips().await {
        Ok(trips) => (StatusCode::OK, Json(trips)).into_response(),
        Err(e) => errors::booking_error_to_response(e),
    }
}
