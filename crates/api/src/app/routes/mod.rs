use axum::Router;

pub mod clients;
pub mod system;
pub mod trips;

/// Router for all `/api` endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/clients", clients::router())
        .nest("/trips", trips::router())
}
