//! Booking error taxonomy.

use thiserror::Error;

use travel_core::{ClientId, DomainError, TripId};

pub type BookingResult<T> = Result<T, BookingError>;

/// Coarse classification of a [`BookingError`], used by callers to decide
/// whether to retry, correct the input, or give up.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorClass {
    /// Referenced entity does not exist.
    NotFound,
    /// Business rule violation for this input.
    Conflict,
    /// Retryable store condition.
    Transient,
    /// Malformed caller data.
    InvalidInput,
    /// Unexpected store failure.
    Internal,
}

/// Typed failure of a booking core operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BookingError {
    #[error("client {0} does not exist")]
    ClientNotFound(ClientId),

    #[error("trip {0} does not exist")]
    TripNotFound(TripId),

    #[error("client {client_id} is not registered for trip {trip_id}")]
    RegistrationNotFound { client_id: ClientId, trip_id: TripId },

    #[error("client {client_id} is already registered for trip {trip_id}")]
    AlreadyRegistered { client_id: ClientId, trip_id: TripId },

    #[error("trip {trip_id} has no free places (capacity {capacity})")]
    CapacityExceeded { trip_id: TripId, capacity: u32 },

    #[error("store busy: {0}")]
    StoreBusy(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BookingError {
    pub fn class(&self) -> ErrorClass {
        match self {
            BookingError::ClientNotFound(_)
            | BookingError::TripNotFound(_)
            | BookingError::RegistrationNotFound { .. } => ErrorClass::NotFound,
            BookingError::AlreadyRegistered { .. } | BookingError::CapacityExceeded { .. } => {
                ErrorClass::Conflict
            }
            BookingError::StoreBusy(_) => ErrorClass::Transient,
            BookingError::InvalidInput(_) => ErrorClass::InvalidInput,
            BookingError::Internal(_) => ErrorClass::Internal,
        }
    }

    /// Only transient failures may succeed when retried with the same input.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    pub fn busy(msg: impl Into<String>) -> Self {
        Self::StoreBusy(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<DomainError> for BookingError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                BookingError::InvalidInput(msg)
            }
            DomainError::InvariantViolation(msg) => BookingError::Internal(msg),
        }
    }
}
