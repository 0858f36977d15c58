//! Client creation.

use tracing::instrument;

use travel_bookings::{BookingError, BookingResult};
use travel_clients::NewClient;
use travel_core::ClientId;

use crate::record_store::RecordStore;

/// Validates and persists new clients.
#[derive(Debug, Clone)]
pub struct ClientRegistry<S> {
    store: S,
}

impl<S> ClientRegistry<S>
where
    S: RecordStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Validate the submitted data and store it under a fresh id.
    ///
    /// Nothing is written when validation fails.
    #[instrument(skip(self, input))]
    pub async fn create_client(&self, input: NewClient) -> BookingResult<ClientId> {
        let client = input.validate().map_err(|e| {
            let err = BookingError::from(e);
            tracing::debug!(error = %err, "client rejected");
            err
        })?;

        let id = self.store.insert_client(&client).await.map_err(|e| {
            tracing::warn!(error = %e, "failed to store client");
            BookingError::from(e)
        })?;

        tracing::info!(client_id = %id, "client created");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::record_store::InMemoryRecordStore;

    fn registry() -> ClientRegistry<Arc<InMemoryRecordStore>> {
        ClientRegistry::new(Arc::new(InMemoryRecordStore::new()))
    }

    #[tokio::test]
    async fn minimal_client_gets_fresh_ids() {
        let registry = registry();
        let first = registry
            .create_client(NewClient::minimal("Anna", "Nowak", "anna@example.com"))
            .await
            .unwrap();
        let second = registry
            .create_client(NewClient::minimal("Piotr", "Nowak", "piotr@example.com"))
            .await
            .unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn malformed_email_is_invalid_input() {
        let err = registry()
            .create_client(NewClient::minimal("Anna", "Nowak", "not-an-email"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BookingError::InvalidInput("email must contain '@'".to_string())
        );
    }

    #[tokio::test]
    async fn short_pesel_is_invalid_input() {
        let err = registry()
            .create_client(
                NewClient::minimal("Anna", "Nowak", "anna@example.com").with_pesel("123456789"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn rejected_client_consumes_no_id() {
        let registry = registry();
        registry
            .create_client(NewClient::minimal("", "Nowak", "anna@example.com"))
            .await
            .unwrap_err();
        let id = registry
            .create_client(NewClient::minimal("Anna", "Nowak", "anna@example.com"))
            .await
            .unwrap();
        assert_eq!(id, ClientId::new(1));
    }
}
