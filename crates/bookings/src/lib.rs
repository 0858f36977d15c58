//! Bookings domain module: registrations, trip occupancy and the booking
//! error taxonomy.
//!
//! Pure domain logic; the transactional side lives in `travel-infra`.

pub mod error;
pub mod occupancy;
pub mod registration;

pub use error::{BookingError, BookingResult, ErrorClass};
pub use occupancy::Occupancy;
pub use registration::{ClientTrip, Registration};
