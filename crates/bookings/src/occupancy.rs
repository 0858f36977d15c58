//! Capacity ledger arithmetic.
//!
//! Occupancy is never stored on its own: it is the count of live
//! registrations of a trip, read under the trip's booking lock. This type only
//! decides what that count allows.

use travel_core::TripId;

use crate::error::BookingError;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Occupancy {
    trip_id: TripId,
    taken: u32,
    capacity: u32,
}

impl Occupancy {
    pub fn new(trip_id: TripId, taken: u32, capacity: u32) -> Self {
        Self {
            trip_id,
            taken,
            capacity,
        }
    }

    pub fn trip_id(&self) -> TripId {
        self.trip_id
    }

    pub fn taken(&self) -> u32 {
        self.taken
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn free_slots(&self) -> u32 {
        self.capacity.saturating_sub(self.taken)
    }

    pub fn is_full(&self) -> bool {
        self.taken >= self.capacity
    }

    /// Occupancy after one more registration, or `CapacityExceeded`.
    pub fn admit(self) -> Result<Self, BookingError> {
        if self.is_full() {
            return Err(BookingError::CapacityExceeded {
                trip_id: self.trip_id,
                capacity: self.capacity,
            });
        }
        Ok(Self {
            taken: self.taken + 1,
            ..self
        })
    }

    /// Occupancy after one registration is cancelled.
    pub fn release(self) -> Self {
        Self {
            taken: self.taken.saturating_sub(1),
            ..self
        }
    }
}
