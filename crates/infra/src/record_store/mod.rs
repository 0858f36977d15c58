//! Record store boundary.
//!
//! Clients, trips and registrations are persisted behind the [`RecordStore`]
//! trait. Booking writes go through a [`BookingTransaction`] that holds the
//! booking lock of the trip it touches; the in-memory backend serves tests and
//! dev, the Postgres backend serves production.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryRecordStore;
pub use postgres::PostgresRecordStore;
pub use r#trait::{BookingTransaction, RecordStore, StoreError};
