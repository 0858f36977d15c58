use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex as TripLock, OwnedMutexGuard};

use travel_bookings::{ClientTrip, Registration};
use travel_clients::{Client, ValidClient};
use travel_core::{ClientId, TripId};
use travel_trips::Trip;

use super::r#trait::{BookingTransaction, RecordStore, StoreError};
use crate::config::DEFAULT_LOCK_TIMEOUT;

#[derive(Debug, Default)]
struct Tables {
    last_client_id: i64,
    clients: BTreeMap<ClientId, Client>,
    trips: BTreeMap<TripId, Trip>,
    /// Keyed trip first so a trip's registrations form one contiguous range.
    registrations: BTreeMap<(TripId, ClientId), Registration>,
}

impl Tables {
    fn registrations_of(&self, trip_id: TripId) -> impl Iterator<Item = &Registration> + '_ {
        self.registrations
            .range((trip_id, ClientId::MIN)..=(trip_id, ClientId::MAX))
            .map(|(_, registration)| registration)
    }
}

/// In-memory record store.
///
/// Intended for tests/dev. Each trip has its own async booking lock; committed
/// state lives behind one `RwLock` that is only ever held for short,
/// non-suspending critical sections.
#[derive(Debug)]
pub struct InMemoryRecordStore {
    tables: RwLock<Tables>,
    trip_locks: Mutex<HashMap<TripId, Arc<TripLock<()>>>>,
    lock_timeout: Duration,
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            trip_locks: Mutex::new(HashMap::new()),
            lock_timeout,
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Add or replace a trip record. Trips are maintained outside the booking core.
    pub fn insert_trip(&self, trip: Trip) -> Result<(), StoreError> {
        trip.validate()
            .map_err(|e| StoreError::InvalidRecord(e.to_string()))?;
        let mut tables = self.write_tables()?;
        tables.trips.insert(trip.id, trip);
        Ok(())
    }

    /// Load a batch of trips, returning how many were stored.
    pub fn seed_trips(&self, trips: impl IntoIterator<Item = Trip>) -> Result<usize, StoreError> {
        let mut count = 0;
        for trip in trips {
            self.insert_trip(trip)?;
            count += 1;
        }
        Ok(count)
    }

    fn read_tables(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write_tables(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn trip_lock(&self, trip_id: TripId) -> Result<Arc<TripLock<()>>, StoreError> {
        let mut locks = self
            .trip_locks
            .lock()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(locks.entry(trip_id).or_default().clone())
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn begin<'a>(&'a self) -> Result<Box<dyn BookingTransaction + 'a>, StoreError> {
        Ok(Box::new(InMemoryTransaction {
            store: self,
            held: HashMap::new(),
            staged: Vec::new(),
            finished: false,
        }))
    }

    async fn insert_client(&self, client: &ValidClient) -> Result<ClientId, StoreError> {
        let mut tables = self.write_tables()?;
        tables.last_client_id += 1;
        let id = ClientId::new(tables.last_client_id);
        tables.clients.insert(id, Client::new(id, client.clone()));
        Ok(id)
    }

    async fn list_trips(&self) -> Result<Vec<Trip>, StoreError> {
        let tables = self.read_tables()?;
        let mut trips: Vec<Trip> = tables.trips.values().cloned().collect();
        trips.sort_by(|a, b| b.date_from.cmp(&a.date_from));
        Ok(trips)
    }

    async fn client_trips(&self, client_id: ClientId) -> Result<Option<Vec<ClientTrip>>, StoreError> {
        let tables = self.read_tables()?;
        if !tables.clients.contains_key(&client_id) {
            return Ok(None);
        }

        let mut out = Vec::new();
        for registration in tables.registrations.values() {
            if registration.client_id != client_id {
                continue;
            }
            let trip = tables.trips.get(&registration.trip_id).ok_or_else(|| {
                StoreError::Backend(format!(
                    "registration references missing trip {}",
                    registration.trip_id
                ))
            })?;
            out.push(ClientTrip::new(trip.clone(), registration));
        }
        out.sort_by(|a, b| b.registered_at.cmp(&a.registered_at));
        Ok(Some(out))
    }

    async fn occupancy(&self, trip_id: TripId) -> Result<u32, StoreError> {
        let tables = self.read_tables()?;
        Ok(tables.registrations_of(trip_id).count() as u32)
    }
}

#[derive(Debug)]
enum StagedWrite {
    Insert(Registration),
    Delete { client_id: ClientId, trip_id: TripId },
}

/// Booking transaction over [`InMemoryRecordStore`].
///
/// Writes are staged locally and applied in one step on commit. Trip locks are
/// owned guards, released when the transaction is committed or dropped.
pub struct InMemoryTransaction<'a> {
    store: &'a InMemoryRecordStore,
    held: HashMap<TripId, OwnedMutexGuard<()>>,
    staged: Vec<StagedWrite>,
    finished: bool,
}

impl InMemoryTransaction<'_> {
    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.finished {
            return Err(StoreError::Finished);
        }
        Ok(())
    }

    fn ensure_locked(&self, trip_id: TripId) -> Result<(), StoreError> {
        self.ensure_open()?;
        if !self.held.contains_key(&trip_id) {
            return Err(StoreError::TripNotLocked(trip_id));
        }
        Ok(())
    }

    /// Clients registered for the trip once this transaction's staged writes apply.
    fn registered_clients(&self, trip_id: TripId) -> Result<BTreeSet<ClientId>, StoreError> {
        let tables = self.store.read_tables()?;
        let mut clients: BTreeSet<ClientId> = tables
            .registrations_of(trip_id)
            .map(|registration| registration.client_id)
            .collect();
        for write in &self.staged {
            match write {
                StagedWrite::Insert(registration) if registration.trip_id == trip_id => {
                    clients.insert(registration.client_id);
                }
                StagedWrite::Delete {
                    client_id,
                    trip_id: t,
                } if *t == trip_id => {
                    clients.remove(client_id);
                }
                _ => {}
            }
        }
        Ok(clients)
    }
}

#[async_trait]
impl BookingTransaction for InMemoryTransaction<'_> {
    async fn client_exists(&mut self, client_id: ClientId) -> Result<bool, StoreError> {
        self.ensure_open()?;
        let tables = self.store.read_tables()?;
        Ok(tables.clients.contains_key(&client_id))
    }

    async fn lock_trip(&mut self, trip_id: TripId) -> Result<Option<Trip>, StoreError> {
        self.ensure_open()?;
        // Unknown trips never get a lock entry.
        if !self.store.read_tables()?.trips.contains_key(&trip_id) {
            return Ok(None);
        }

        if !self.held.contains_key(&trip_id) {
            let lock = self.store.trip_lock(trip_id)?;
            let guard = tokio::time::timeout(self.store.lock_timeout, lock.lock_owned())
                .await
                .map_err(|_| {
                    StoreError::Busy(format!(
                        "timed out after {:?} waiting for the booking lock of trip {trip_id}",
                        self.store.lock_timeout
                    ))
                })?;
            self.held.insert(trip_id, guard);
        }

        let tables = self.store.read_tables()?;
        Ok(tables.trips.get(&trip_id).cloned())
    }

    async fn registration_exists(
        &mut self,
        client_id: ClientId,
        trip_id: TripId,
    ) -> Result<bool, StoreError> {
        self.ensure_open()?;
        Ok(self.registered_clients(trip_id)?.contains(&client_id))
    }

    async fn occupancy(&mut self, trip_id: TripId) -> Result<u32, StoreError> {
        self.ensure_open()?;
        Ok(self.registered_clients(trip_id)?.len() as u32)
    }

    async fn insert_registration(&mut self, registration: &Registration) -> Result<(), StoreError> {
        self.ensure_locked(registration.trip_id)?;
        self.staged.push(StagedWrite::Insert(registration.clone()));
        Ok(())
    }

    async fn delete_registration(
        &mut self,
        client_id: ClientId,
        trip_id: TripId,
    ) -> Result<bool, StoreError> {
        self.ensure_locked(trip_id)?;
        if !self.registered_clients(trip_id)?.contains(&client_id) {
            return Ok(false);
        }
        self.staged.push(StagedWrite::Delete { client_id, trip_id });
        Ok(true)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.ensure_open()?;
        {
            let mut tables = self.store.write_tables()?;

            // Validate every staged write against committed state before touching it.
            let mut overlay: BTreeMap<(TripId, ClientId), Option<Registration>> = BTreeMap::new();
            for write in &self.staged {
                match write {
                    StagedWrite::Insert(registration) => {
                        let key = (registration.trip_id, registration.client_id);
                        let present = match overlay.get(&key) {
                            Some(slot) => slot.is_some(),
                            None => tables.registrations.contains_key(&key),
                        };
                        if present {
                            return Err(StoreError::UniqueViolation(format!(
                                "client {} already registered for trip {}",
                                registration.client_id, registration.trip_id
                            )));
                        }
                        if !tables.clients.contains_key(&registration.client_id) {
                            return Err(StoreError::ForeignKeyViolation(format!(
                                "client {} does not exist",
                                registration.client_id
                            )));
                        }
                        if !tables.trips.contains_key(&registration.trip_id) {
                            return Err(StoreError::ForeignKeyViolation(format!(
                                "trip {} does not exist",
                                registration.trip_id
                            )));
                        }
                        overlay.insert(key, Some(registration.clone()));
                    }
                    StagedWrite::Delete { client_id, trip_id } => {
                        overlay.insert((*trip_id, *client_id), None);
                    }
                }
            }

            for (key, slot) in overlay {
                match slot {
                    Some(registration) => {
                        tables.registrations.insert(key, registration);
                    }
                    None => {
                        tables.registrations.remove(&key);
                    }
                }
            }
        }

        self.staged.clear();
        self.finished = true;
        self.held.clear();
        Ok(())
    }
}

impl Drop for InMemoryTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished && !self.staged.is_empty() {
            tracing::debug!(
                staged = self.staged.len(),
                "rolling back uncommitted booking transaction"
            );
        }
    }
}
