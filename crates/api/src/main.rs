use anyhow::Context;

use travel_infra::{EngineConfig, ServerConfig, StoreConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    travel_observability::init();

    let store_config = StoreConfig::from_env()?;
    let engine_config = EngineConfig::from_env()?;
    let server_config = ServerConfig::from_env()?;

    let app = travel_api::app::build_app(&store_config, engine_config).await?;

    let listener = tokio::net::TcpListener::bind(server_config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", server_config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
