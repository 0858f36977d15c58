//! Registration engine (booking orchestration).
//!
//! Runs Register and Cancel as single store transactions:
//!
//! ```text
//! Register(client, trip)
//!   ↓
//! 1. Begin transaction
//!   ↓
//! 2. Client must exist                      → ClientNotFound
//!   ↓
//! 3. Lock the trip (bounded wait)           → TripNotFound / StoreBusy
//!   ↓
//! 4. Pair must not be registered yet        → AlreadyRegistered
//!   ↓
//! 5. Occupancy under the lock < MaxPeople   → CapacityExceeded
//!   ↓
//! 6. Insert registration, commit
//! ```
//!
//! Steps 4 to 6 run while the trip lock is held, so concurrent Registers for
//! one trip are serialized and the capacity check can never be raced. Every
//! failure drops the transaction, which rolls it back and releases the lock.
//! Everything before the commit is bounded by
//! [`EngineConfig::operation_timeout`]; once the commit is issued its outcome
//! is reported as is.

use std::future::Future;

use chrono::Utc;
use tracing::instrument;

use travel_bookings::{BookingError, BookingResult, ErrorClass, Occupancy, Registration};
use travel_core::{ClientId, TripId};

use crate::config::EngineConfig;
use crate::record_store::{RecordStore, StoreError};

/// Serializes booking writes per trip on top of a [`RecordStore`].
#[derive(Debug, Clone)]
pub struct RegistrationEngine<S> {
    store: S,
    config: EngineConfig,
}

impl<S> RegistrationEngine<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }
}

impl<S> RegistrationEngine<S>
where
    S: RecordStore,
{
    /// Register a client for a trip, enforcing capacity and uniqueness.
    #[instrument(skip(self), fields(client_id = %client_id, trip_id = %trip_id))]
    pub async fn register(
        &self,
        client_id: ClientId,
        trip_id: TripId,
    ) -> BookingResult<Registration> {
        let result = self.register_in_tx(client_id, trip_id).await;
        log_outcome("register", result)
    }

    /// Cancel a client's registration for a trip.
    #[instrument(skip(self), fields(client_id = %client_id, trip_id = %trip_id))]
    pub async fn cancel(&self, client_id: ClientId, trip_id: TripId) -> BookingResult<()> {
        let result = self.cancel_in_tx(client_id, trip_id).await;
        log_outcome("cancel", result)
    }

    /// Committed occupancy of a trip.
    #[instrument(skip(self), fields(trip_id = %trip_id))]
    pub async fn occupancy(&self, trip_id: TripId) -> BookingResult<u32> {
        let result = self
            .bounded("occupancy", async {
                self.store
                    .occupancy(trip_id)
                    .await
                    .map_err(BookingError::from)
            })
            .await;
        log_outcome("occupancy", result)
    }

    async fn register_in_tx(
        &self,
        client_id: ClientId,
        trip_id: TripId,
    ) -> BookingResult<Registration> {
        let already_registered = || BookingError::AlreadyRegistered { client_id, trip_id };

        // The deadline stops at the commit point: a commit that reached the
        // store must not be reported as a failure.
        let (mut tx, registration, occupancy) = self
            .bounded("register", async {
                let mut tx = self.store.begin().await?;

                if !tx.client_exists(client_id).await? {
                    return Err(BookingError::ClientNotFound(client_id));
                }

                let trip = tx
                    .lock_trip(trip_id)
                    .await?
                    .ok_or(BookingError::TripNotFound(trip_id))?;

                if tx.registration_exists(client_id, trip_id).await? {
                    return Err(already_registered());
                }

                let taken = tx.occupancy(trip_id).await?;
                let occupancy = Occupancy::new(trip_id, taken, trip.max_people).admit()?;

                let registration = Registration::new(client_id, trip_id, Utc::now());
                tx.insert_registration(&registration)
                    .await
                    .map_err(|e| unique_as(e, already_registered))?;
                Ok::<_, BookingError>((tx, registration, occupancy))
            })
            .await?;

        tx.commit()
            .await
            .map_err(|e| unique_as(e, already_registered))?;

        tracing::info!(
            taken = occupancy.taken(),
            free_slots = occupancy.free_slots(),
            "client registered for trip"
        );
        Ok(registration)
    }

    async fn cancel_in_tx(&self, client_id: ClientId, trip_id: TripId) -> BookingResult<()> {
        let not_found = || BookingError::RegistrationNotFound { client_id, trip_id };

        let (mut tx, occupancy) = self
            .bounded("cancel", async {
                let mut tx = self.store.begin().await?;

                // A trip that does not exist has no registrations either.
                let Some(trip) = tx.lock_trip(trip_id).await? else {
                    return Err(not_found());
                };
                let taken = tx.occupancy(trip_id).await?;
                if !tx.delete_registration(client_id, trip_id).await? {
                    return Err(not_found());
                }
                let occupancy = Occupancy::new(trip_id, taken, trip.max_people).release();
                Ok::<_, BookingError>((tx, occupancy))
            })
            .await?;

        tx.commit().await?;

        tracing::info!(
            taken = occupancy.taken(),
            free_slots = occupancy.free_slots(),
            "registration cancelled"
        );
        Ok(())
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        work: impl Future<Output = BookingResult<T>>,
    ) -> BookingResult<T> {
        match tokio::time::timeout(self.config.operation_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(BookingError::busy(format!(
                "{operation} did not complete within {:?}",
                self.config.operation_timeout
            ))),
        }
    }
}

fn unique_as(err: StoreError, conflict: impl FnOnce() -> BookingError) -> BookingError {
    match err {
        StoreError::UniqueViolation(_) => conflict(),
        other => other.into(),
    }
}

fn log_outcome<T>(operation: &'static str, result: BookingResult<T>) -> BookingResult<T> {
    if let Err(err) = &result {
        match err.class() {
            ErrorClass::Transient | ErrorClass::Internal => {
                tracing::warn!(operation, error = %err, "booking operation failed");
            }
            _ => {
                tracing::debug!(operation, error = %err, "booking operation rejected");
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use travel_bookings::ClientTrip;
    use travel_clients::{NewClient, ValidClient};
    use travel_trips::Trip;

    use crate::record_store::{BookingTransaction, InMemoryRecordStore};

    /// Store whose commits apply immediately but are acknowledged late.
    struct SlowAckStore {
        inner: InMemoryRecordStore,
        ack_delay: Duration,
    }

    struct SlowAckTransaction<'a> {
        inner: Box<dyn BookingTransaction + 'a>,
        ack_delay: Duration,
    }

    #[async_trait]
    impl<'a> BookingTransaction for SlowAckTransaction<'a> {
        async fn client_exists(&mut self, client_id: ClientId) -> Result<bool, StoreError> {
            self.inner.client_exists(client_id).await
        }

        async fn lock_trip(&mut self, trip_id: TripId) -> Result<Option<Trip>, StoreError> {
            self.inner.lock_trip(trip_id).await
        }

        async fn registration_exists(
            &mut self,
            client_id: ClientId,
            trip_id: TripId,
        ) -> Result<bool, StoreError> {
            self.inner.registration_exists(client_id, trip_id).await
        }

        async fn occupancy(&mut self, trip_id: TripId) -> Result<u32, StoreError> {
            self.inner.occupancy(trip_id).await
        }

        async fn insert_registration(
            &mut self,
            registration: &Registration,
        ) -> Result<(), StoreError> {
            self.inner.insert_registration(registration).await
        }

        async fn delete_registration(
            &mut self,
            client_id: ClientId,
            trip_id: TripId,
        ) -> Result<bool, StoreError> {
            self.inner.delete_registration(client_id, trip_id).await
        }

        async fn commit(&mut self) -> Result<(), StoreError> {
            self.inner.commit().await?;
            tokio::time::sleep(self.ack_delay).await;
            Ok(())
        }
    }

    #[async_trait]
    impl RecordStore for SlowAckStore {
        async fn begin<'a>(&'a self) -> Result<Box<dyn BookingTransaction + 'a>, StoreError> {
            Ok(Box::new(SlowAckTransaction {
                inner: self.inner.begin().await?,
                ack_delay: self.ack_delay,
            }))
        }

        async fn insert_client(&self, client: &ValidClient) -> Result<ClientId, StoreError> {
            self.inner.insert_client(client).await
        }

        async fn list_trips(&self) -> Result<Vec<Trip>, StoreError> {
            self.inner.list_trips().await
        }

        async fn client_trips(
            &self,
            client_id: ClientId,
        ) -> Result<Option<Vec<ClientTrip>>, StoreError> {
            self.inner.client_trips(client_id).await
        }

        async fn occupancy(&self, trip_id: TripId) -> Result<u32, StoreError> {
            self.inner.occupancy(trip_id).await
        }
    }

    fn trip(id: i64, max_people: u32) -> Trip {
        let from = Utc::now() + ChronoDuration::days(30);
        Trip {
            id: TripId::new(id),
            name: format!("Trip {id}"),
            description: Some("test".to_string()),
            date_from: from,
            date_to: from + ChronoDuration::days(7),
            max_people,
            countries: vec![],
        }
    }

    async fn setup(
        max_people: u32,
        clients: usize,
    ) -> (RegistrationEngine<Arc<InMemoryRecordStore>>, Vec<ClientId>) {
        let store = Arc::new(InMemoryRecordStore::new());
        store.insert_trip(trip(1, max_people)).unwrap();
        let mut ids = Vec::new();
        for i in 0..clients {
            let valid = NewClient::minimal("Jan", "Kowalski", format!("jan{i}@example.com"))
                .validate()
                .unwrap();
            ids.push(store.insert_client(&valid).await.unwrap());
        }
        (RegistrationEngine::new(store, EngineConfig::default()), ids)
    }

    #[tokio::test]
    async fn register_then_duplicate_is_rejected() {
        let (engine, clients) = setup(5, 1).await;
        let t = TripId::new(1);

        let reg = engine.register(clients[0], t).await.unwrap();
        assert_eq!(reg.key(), (clients[0], t));
        assert!(!reg.is_paid());

        assert_eq!(
            engine.register(clients[0], t).await.unwrap_err(),
            BookingError::AlreadyRegistered {
                client_id: clients[0],
                trip_id: t
            }
        );
        assert_eq!(engine.occupancy(t).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn register_checks_client_before_trip() {
        let (engine, _) = setup(5, 0).await;
        let unknown_client = ClientId::new(404);

        assert_eq!(
            engine
                .register(unknown_client, TripId::new(999))
                .await
                .unwrap_err(),
            BookingError::ClientNotFound(unknown_client)
        );
    }

    #[tokio::test]
    async fn register_unknown_trip() {
        let (engine, clients) = setup(5, 1).await;
        assert_eq!(
            engine
                .register(clients[0], TripId::new(999))
                .await
                .unwrap_err(),
            BookingError::TripNotFound(TripId::new(999))
        );
    }

    #[tokio::test]
    async fn full_trip_rejects_with_capacity_exceeded() {
        let (engine, clients) = setup(1, 2).await;
        let t = TripId::new(1);

        engine.register(clients[0], t).await.unwrap();
        assert_eq!(
            engine.register(clients[1], t).await.unwrap_err(),
            BookingError::CapacityExceeded {
                trip_id: t,
                capacity: 1
            }
        );
        assert_eq!(engine.occupancy(t).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn zero_capacity_trip_is_always_full() {
        let (engine, clients) = setup(0, 1).await;
        assert!(matches!(
            engine.register(clients[0], TripId::new(1)).await,
            Err(BookingError::CapacityExceeded { capacity: 0, .. })
        ));
    }

    #[tokio::test]
    async fn cancel_restores_occupancy_and_allows_reregistration() {
        let (engine, clients) = setup(1, 1).await;
        let t = TripId::new(1);

        engine.register(clients[0], t).await.unwrap();
        engine.cancel(clients[0], t).await.unwrap();
        assert_eq!(engine.occupancy(t).await.unwrap(), 0);
        engine.register(clients[0], t).await.unwrap();
        assert_eq!(engine.occupancy(t).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn cancel_missing_pair_is_registration_not_found() {
        let (engine, clients) = setup(3, 2).await;
        let t = TripId::new(1);
        engine.register(clients[0], t).await.unwrap();

        assert_eq!(
            engine.cancel(clients[1], t).await.unwrap_err(),
            BookingError::RegistrationNotFound {
                client_id: clients[1],
                trip_id: t
            }
        );
        assert_eq!(
            engine.cancel(clients[0], TripId::new(77)).await.unwrap_err(),
            BookingError::RegistrationNotFound {
                client_id: clients[0],
                trip_id: TripId::new(77)
            }
        );
        assert_eq!(engine.occupancy(t).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn held_lock_beyond_operation_timeout_is_store_busy() {
        let store = Arc::new(InMemoryRecordStore::with_lock_timeout(Duration::from_secs(10)));
        store.insert_trip(trip(1, 5)).unwrap();
        let valid = NewClient::minimal("A", "B", "a@b").validate().unwrap();
        let client = store.insert_client(&valid).await.unwrap();
        let engine = RegistrationEngine::new(
            store.clone(),
            EngineConfig {
                operation_timeout: Duration::from_millis(50),
            },
        );

        let mut holder = store.begin().await.unwrap();
        holder.lock_trip(TripId::new(1)).await.unwrap();

        let err = engine.register(client, TripId::new(1)).await.unwrap_err();
        assert!(err.is_retryable(), "expected StoreBusy, got {err:?}");
        drop(holder);

        assert_eq!(engine.occupancy(TripId::new(1)).await.unwrap(), 0);
        engine.register(client, TripId::new(1)).await.unwrap();
    }

    #[tokio::test]
    async fn late_commit_acknowledgement_still_reports_the_outcome() {
        let store = Arc::new(SlowAckStore {
            inner: InMemoryRecordStore::new(),
            ack_delay: Duration::from_millis(200),
        });
        store.inner.insert_trip(trip(1, 5)).unwrap();
        let valid = NewClient::minimal("A", "B", "a@b").validate().unwrap();
        let client = store.insert_client(&valid).await.unwrap();
        let engine = RegistrationEngine::new(
            store.clone(),
            EngineConfig {
                operation_timeout: Duration::from_millis(50),
            },
        );
        let t = TripId::new(1);

        let reg = engine.register(client, t).await.unwrap();
        assert_eq!(reg.key(), (client, t));
        assert_eq!(engine.occupancy(t).await.unwrap(), 1);

        engine.cancel(client, t).await.unwrap();
        assert_eq!(engine.occupancy(t).await.unwrap(), 0);
    }

    #[test]
    fn unique_violation_becomes_the_given_conflict() {
        let c = ClientId::new(1);
        let t = TripId::new(2);
        let err = unique_as(StoreError::UniqueViolation("pk".into()), || {
            BookingError::AlreadyRegistered {
                client_id: c,
                trip_id: t,
            }
        });
        assert_eq!(
            err,
            BookingError::AlreadyRegistered {
                client_id: c,
                trip_id: t
            }
        );
        assert!(matches!(
            unique_as(StoreError::Busy("lock".into()), || BookingError::internal("x")),
            BookingError::StoreBusy(_)
        ));
        assert!(matches!(
            unique_as(StoreError::ForeignKeyViolation("fk".into()), || {
                BookingError::internal("x")
            }),
            BookingError::Internal(_)
        ));
    }
}
