use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use travel_bookings::{BookingError, ClientTrip, Registration};
use travel_clients::ValidClient;
use travel_core::{ClientId, TripId};
use travel_trips::Trip;

/// Record store operation error.
///
/// These are **infrastructure errors** (locking, connectivity, constraints) as
/// opposed to booking outcomes. The registration engine turns them into
/// [`BookingError`]s.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Lock wait, pool acquisition or statement exceeded its time bound.
    #[error("store busy: {0}")]
    Busy(String),

    /// The backend cannot be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The (client, trip) uniqueness constraint rejected a write.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A registration referenced a client or trip that does not exist.
    #[error("referential integrity violated: {0}")]
    ForeignKeyViolation(String),

    /// A registration write was attempted without holding the trip's booking lock.
    #[error("trip {0} is not locked by this transaction")]
    TripNotLocked(TripId),

    /// The transaction was already committed.
    #[error("transaction already finished")]
    Finished,

    /// A record handed to the store was rejected.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Any other backend failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Busy(_) | StoreError::Unavailable(_))
    }
}

impl From<StoreError> for BookingError {
    fn from(value: StoreError) -> Self {
        if value.is_transient() {
            BookingError::StoreBusy(value.to_string())
        } else {
            BookingError::Internal(value.to_string())
        }
    }
}

/// One atomic unit of booking work.
///
/// ## Locking
///
/// `lock_trip` takes the trip's exclusive booking lock for the rest of the
/// transaction. Registration writes for a trip are only accepted while that
/// lock is held, so every read-count-then-write sequence on a trip is a
/// critical section. Acquisition is bounded by the store's lock timeout and
/// fails with [`StoreError::Busy`].
///
/// ## Lifetime
///
/// Nothing is visible to other transactions until `commit` succeeds. Dropping
/// an uncommitted transaction rolls it back and releases its locks.
#[async_trait]
pub trait BookingTransaction: Send {
    async fn client_exists(&mut self, client_id: ClientId) -> Result<bool, StoreError>;

    /// Acquire the trip's booking lock and return the trip, or `None` if the
    /// trip does not exist (no lock is taken then).
    async fn lock_trip(&mut self, trip_id: TripId) -> Result<Option<Trip>, StoreError>;

    async fn registration_exists(
        &mut self,
        client_id: ClientId,
        trip_id: TripId,
    ) -> Result<bool, StoreError>;

    /// Live registrations of the trip as seen by this transaction.
    async fn occupancy(&mut self, trip_id: TripId) -> Result<u32, StoreError>;

    async fn insert_registration(&mut self, registration: &Registration) -> Result<(), StoreError>;

    /// Returns whether a registration was deleted.
    async fn delete_registration(
        &mut self,
        client_id: ClientId,
        trip_id: TripId,
    ) -> Result<bool, StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;
}

/// Durable storage for clients, trips and registrations.
///
/// Implementations must:
/// - enforce (client, trip) uniqueness themselves, as a backstop to the engine
/// - serialize registration writes per trip (see [`BookingTransaction`])
/// - keep locking per trip so different trips never contend
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Open a booking transaction.
    async fn begin<'a>(&'a self) -> Result<Box<dyn BookingTransaction + 'a>, StoreError>;

    /// Persist a validated client and return its newly assigned id.
    async fn insert_client(&self, client: &ValidClient) -> Result<ClientId, StoreError>;

    /// All trips with their countries, latest start date first.
    async fn list_trips(&self) -> Result<Vec<Trip>, StoreError>;

    /// A client's registrations, most recent first; `None` if the client does not exist.
    async fn client_trips(&self, client_id: ClientId) -> Result<Option<Vec<ClientTrip>>, StoreError>;

    /// Committed occupancy of a trip.
    async fn occupancy(&self, trip_id: TripId) -> Result<u32, StoreError>;
}

#[async_trait]
impl<S> RecordStore for Arc<S>
where
    S: RecordStore + ?Sized,
{
    async fn begin<'a>(&'a self) -> Result<Box<dyn BookingTransaction + 'a>, StoreError> {
        (**self).begin().await
    }

    async fn insert_client(&self, client: &ValidClient) -> Result<ClientId, StoreError> {
        (**self).insert_client(client).await
    }

    async fn list_trips(&self) -> Result<Vec<Trip>, StoreError> {
        (**self).list_trips().await
    }

    async fn client_trips(&self, client_id: ClientId) -> Result<Option<Vec<ClientTrip>>, StoreError> {
        (**self).client_trips(client_id).await
    }

    async fn occupancy(&self, trip_id: TripId) -> Result<u32, StoreError> {
        (**self).occupancy(trip_id).await
    }
}
