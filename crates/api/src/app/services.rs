use std::sync::Arc;

use anyhow::Context;

use travel_infra::config::load_seed_trips;
use travel_infra::{
    ClientRegistry, EngineConfig, InMemoryRecordStore, PostgresRecordStore, RecordStore,
    RegistrationEngine, StoreBackend, StoreConfig, TripQueries,
};

type SharedStore = Arc<dyn RecordStore>;

/// Booking services shared by all handlers.
pub struct AppServices {
    pub engine: RegistrationEngine<SharedStore>,
    pub registry: ClientRegistry<SharedStore>,
    pub queries: TripQueries<SharedStore>,
}

impl AppServices {
    pub fn new(store: SharedStore, engine: EngineConfig) -> Self {
        Self {
            engine: RegistrationEngine::new(store.clone(), engine),
            registry: ClientRegistry::new(store.clone()),
            queries: TripQueries::new(store),
        }
    }
}

/// Build services over the configured record store.
///
/// `USE_PERSISTENT_STORES=true` selects Postgres (schema applied on startup);
/// otherwise an in-memory store is used. Either way `TRAVEL_SEED_FILE` trips
/// are loaded before serving.
pub async fn build_services(config: &StoreConfig, engine: EngineConfig) -> anyhow::Result<AppServices> {
    let seed = match &config.seed_file {
        Some(path) => load_seed_trips(path)?,
        None => Vec::new(),
    };

    let store: SharedStore = match &config.backend {
        StoreBackend::InMemory => {
            let store = InMemoryRecordStore::with_lock_timeout(config.lock_timeout);
            let count = store
                .seed_trips(seed)
                .context("failed to seed in-memory trips")?;
            tracing::info!(trips = count, "using in-memory record store");
            Arc::new(store)
        }
        StoreBackend::Postgres { database_url } => {
            let store = PostgresRecordStore::connect(
                database_url,
                config.max_connections,
                config.acquire_timeout,
                config.lock_timeout,
            )
            .await
            .context("failed to connect to Postgres")?;
            store
                .ensure_schema()
                .await
                .context("failed to apply database schema")?;
            for trip in &seed {
                store
                    .insert_trip(trip)
                    .await
                    .with_context(|| format!("failed to seed trip {}", trip.id))?;
            }
            tracing::info!(trips = seed.len(), "using Postgres record store");
            Arc::new(store)
        }
    };

    Ok(AppServices::new(store, engine))
}
