//! Infrastructure layer: record stores, the registration engine, queries and
//! configuration.

pub mod client_registry;
pub mod config;
pub mod record_store;
pub mod registration_engine;
pub mod trip_queries;


pub use client_registry::ClientRegistry;
pub use config::{ConfigError, EngineConfig, ServerConfig, StoreBackend, StoreConfig};
pub use record_store::{
    BookingTransaction, InMemoryRecordStore, PostgresRecordStore, RecordStore, StoreError,
};
pub use registration_engine::RegistrationEngine;
pub use trip_queries::TripQueries;
