//! Read-only trip listings.

use tracing::instrument;

use travel_bookings::{BookingError, BookingResult, ClientTrip};
use travel_core::ClientId;
use travel_trips::Trip;

use crate::record_store::RecordStore;

#[derive(Debug, Clone)]
pub struct TripQueries<S> {
    store: S,
}

impl<S> TripQueries<S>
where
    S: RecordStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// All trips with their countries, latest start date first.
    #[instrument(skip(self))]
    pub async fn list_trips(&self) -> BookingResult<Vec<Trip>> {
        self.store.list_trips().await.map_err(|e| {
            tracing::warn!(error = %e, "failed to list trips");
            BookingError::from(e)
        })
    }

    /// A client's registrations with trip details, most recent first.
    #[instrument(skip(self), fields(client_id = %client_id))]
    pub async fn list_client_trips(&self, client_id: ClientId) -> BookingResult<Vec<ClientTrip>> {
        self.store
            .client_trips(client_id)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "failed to list client trips");
                BookingError::from(e)
            })?
            .ok_or(BookingError::ClientNotFound(client_id))
    }
}
