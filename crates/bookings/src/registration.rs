use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use travel_core::{ClientId, TripId};
use travel_trips::Trip;

/// A live registration of a client for a trip.
///
/// Identified by the (client, trip) pair; at most one exists per pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub client_id: ClientId,
    pub trip_id: TripId,
    pub registered_at: DateTime<Utc>,
    /// Set by the payment process, never by the booking core.
    pub payment_date: Option<DateTime<Utc>>,
}

impl Registration {
    /// A fresh, unpaid registration.
    pub fn new(client_id: ClientId, trip_id: TripId, registered_at: DateTime<Utc>) -> Self {
        Self {
            client_id,
            trip_id,
            registered_at,
            payment_date: None,
        }
    }

    pub fn key(&self) -> (ClientId, TripId) {
        (self.client_id, self.trip_id)
    }

    pub fn is_paid(&self) -> bool {
        self.payment_date.is_some()
    }
}

/// A client's registration joined with the trip it refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientTrip {
    pub trip: Trip,
    pub registered_at: DateTime<Utc>,
    pub payment_date: Option<DateTime<Utc>>,
}

impl ClientTrip {
    pub fn new(trip: Trip, registration: &Registration) -> Self {
        Self {
            trip,
            registered_at: registration.registered_at,
            payment_date: registration.payment_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_registration_is_unpaid() {
        let reg = Registration::new(ClientId::new(1), TripId::new(2), Utc::now());
        assert!(!reg.is_paid());
        assert_eq!(reg.key(), (ClientId::new(1), TripId::new(2)));
    }
}
