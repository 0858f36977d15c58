//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: record store selection and booking services
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request DTOs and path parameter parsing
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use travel_infra::{EngineConfig, StoreConfig};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(store: &StoreConfig, engine: EngineConfig) -> anyhow::Result<Router> {
    let services = services::build_services(store, engine).await?;
    Ok(router(Arc::new(services)))
}

/// Router over already constructed services.
pub fn router(services: Arc<services::AppServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/api", routes::router())
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(middleware::trace_requests))
                .layer(Extension(services)),
        )
}
