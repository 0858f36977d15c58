use axum::http::{header, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use serde_json::json;

use travel_bookings::BookingError;

/// Seconds a client should wait before retrying a busy store.
const RETRY_AFTER_SECS: &str = "1";

pub fn booking_error_to_response(err: BookingError) -> axum::response::Response {
    match err {
        BookingError::ClientNotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "client_not_found", err.to_string())
        }
        BookingError::TripNotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "trip_not_found", err.to_string())
        }
        BookingError::RegistrationNotFound { .. } => {
            json_error(StatusCode::NOT_FOUND, "registration_not_found", err.to_string())
        }
        BookingError::AlreadyRegistered { .. } => {
            json_error(StatusCode::CONFLICT, "already_registered", err.to_string())
        }
        BookingError::CapacityExceeded { .. } => {
            json_error(StatusCode::CONFLICT, "capacity_exceeded", err.to_string())
        }
        BookingError::InvalidInput(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_input", msg),
        BookingError::StoreBusy(msg) => {
            let mut res = json_error(StatusCode::SERVICE_UNAVAILABLE, "store_busy", msg);
            res.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
            res
        }
        BookingError::Internal(msg) => {
            tracing::error!(error = %msg, "internal error");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
