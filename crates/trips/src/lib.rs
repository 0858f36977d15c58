//! Trips domain module.
//!
//! Trips are created and managed outside the booking core; this crate only
//! describes them and checks that a trip record is sane before it is used.

pub mod trip;

pub use trip::{Country, Trip};
