use std::str::FromStr;

use axum::http::StatusCode;
use serde::Deserialize;

use travel_clients::NewClient;
use travel_core::DomainError;

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClientRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub telephone: Option<String>,
    pub pesel: Option<String>,
}

impl From<CreateClientRequest> for NewClient {
    fn from(body: CreateClientRequest) -> Self {
        NewClient {
            first_name: body.first_name,
            last_name: body.last_name,
            email: body.email,
            telephone: body.telephone,
            pesel: body.pesel,
        }
    }
}

// -------------------------
// Path parameters
// -------------------------

/// Parse a path segment into a typed id, or a 400 response.
pub fn parse_id<T>(raw: &str) -> Result<T, axum::response::Response>
where
    T: FromStr<Err = DomainError>,
{
    T::from_str(raw).map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string()))
}
