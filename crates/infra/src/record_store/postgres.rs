//! Postgres-backed record store.
//!
//! ## Serialization
//!
//! A booking transaction takes the trip's booking lock with
//! `SELECT ... FROM trip WHERE id_trip = $1 FOR UPDATE`. Competing writers for
//! the same trip queue on that row lock; other trips are unaffected. The wait
//! is bounded per transaction through the `lock_timeout` setting. The client
//! row is read `FOR KEY SHARE` so it cannot disappear before commit.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `UniqueViolation` |
//! | Database (foreign key violation) | `23503` | `ForeignKeyViolation` |
//! | Database (lock timeout, query canceled) | `55P03`, `57014` | `Busy` |
//! | Database (serialization failure, deadlock) | `40001`, `40P01` | `Busy` |
//! | Database (other) | Any other | `Backend` |
//! | PoolTimedOut | N/A | `Busy` |
//! | PoolClosed, Io, Tls | N/A | `Unavailable` |
//! | Other | N/A | `Backend` |

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use travel_bookings::{ClientTrip, Registration};
use travel_clients::ValidClient;
use travel_core::{ClientId, TripId};
use travel_trips::{Country, Trip};

use super::r#trait::{BookingTransaction, RecordStore, StoreError};

const SCHEMA: &str = include_str!("../../migrations/0001_travel_agency.sql");

const TRIP_COLUMNS: &str = "t.id_trip, t.name, t.description, t.date_from, t.date_to, t.max_people";

#[derive(Debug, Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresRecordStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Open a bounded connection pool.
    #[instrument(skip(database_url), err)]
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
        lock_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, lock_timeout))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the tables if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    /// Insert or replace a trip record together with its countries.
    #[instrument(skip(self, trip), fields(trip_id = %trip.id), err)]
    pub async fn insert_trip(&self, trip: &Trip) -> Result<(), StoreError> {
        trip.validate()
            .map_err(|e| StoreError::InvalidRecord(e.to_string()))?;
        let max_people = i32::try_from(trip.max_people)
            .map_err(|_| StoreError::InvalidRecord(format!("max_people {} too large", trip.max_people)))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("insert_trip", e))?;

        sqlx::query(
            r#"
            INSERT INTO trip (id_trip, name, description, date_from, date_to, max_people)
            OVERRIDING SYSTEM VALUE
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id_trip) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                date_from = EXCLUDED.date_from,
                date_to = EXCLUDED.date_to,
                max_people = EXCLUDED.max_people
            "#,
        )
        .bind(trip.id.get())
        .bind(&trip.name)
        .bind(trip.description.as_deref())
        .bind(trip.date_from)
        .bind(trip.date_to)
        .bind(max_people)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_trip", e))?;

        sqlx::query("DELETE FROM country_trip WHERE id_trip = $1")
            .bind(trip.id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_trip", e))?;

        for country in &trip.countries {
            let id_country: i64 = sqlx::query(
                r#"
                INSERT INTO country (name) VALUES ($1)
                ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
                RETURNING id_country
                "#,
            )
            .bind(&country.name)
            .fetch_one(&mut *tx)
            .await
            .and_then(|row| row.try_get("id_country"))
            .map_err(|e| map_sqlx_error("insert_trip", e))?;

            sqlx::query(
                "INSERT INTO country_trip (id_country, id_trip) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(id_country)
            .bind(trip.id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_trip", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("insert_trip", e))?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn begin<'a>(&'a self) -> Result<Box<dyn BookingTransaction + 'a>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        Ok(Box::new(PostgresTransaction {
            tx: Some(tx),
            locked: HashSet::new(),
        }))
    }

    #[instrument(skip(self, client), err)]
    async fn insert_client(&self, client: &ValidClient) -> Result<ClientId, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO client (first_name, last_name, email, telephone, pesel)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id_client
            "#,
        )
        .bind(client.first_name())
        .bind(client.last_name())
        .bind(client.email().as_str())
        .bind(client.telephone())
        .bind(client.pesel().map(|p| p.as_str()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_client", e))?;

        let id: i64 = row
            .try_get("id_client")
            .map_err(|e| map_sqlx_error("insert_client", e))?;
        Ok(ClientId::new(id))
    }

    #[instrument(skip(self), err)]
    async fn list_trips(&self) -> Result<Vec<Trip>, StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("list_trips", e))?;

        let rows = sqlx::query(&format!(
            "SELECT {TRIP_COLUMNS} FROM trip t ORDER BY t.date_from DESC, t.id_trip"
        ))
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("list_trips", e))?;

        let mut trips = rows
            .iter()
            .map(trip_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let ids: Vec<i64> = trips.iter().map(|t| t.id.get()).collect();
        let mut countries = load_countries(&mut *conn, &ids).await?;
        for trip in &mut trips {
            trip.countries = countries.remove(&trip.id.get()).unwrap_or_default();
        }
        Ok(trips)
    }

    #[instrument(skip(self), fields(client_id = %client_id), err)]
    async fn client_trips(&self, client_id: ClientId) -> Result<Option<Vec<ClientTrip>>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("client_trips", e))?;

        // One snapshot for the existence check and the listing.
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("client_trips", e))?;

        let exists = sqlx::query("SELECT 1 FROM client WHERE id_client = $1")
            .bind(client_id.get())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("client_trips", e))?
            .is_some();
        if !exists {
            return Ok(None);
        }

        let rows = sqlx::query(&format!(
            r#"
            SELECT {TRIP_COLUMNS}, ct.registered_at, ct.payment_date
            FROM client_trip ct
            JOIN trip t ON t.id_trip = ct.id_trip
            WHERE ct.id_client = $1
            ORDER BY ct.registered_at DESC
            "#
        ))
        .bind(client_id.get())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("client_trips", e))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let trip = trip_from_row(row)?;
            let registered_at: DateTime<Utc> = row
                .try_get("registered_at")
                .map_err(|e| map_sqlx_error("client_trips", e))?;
            let payment_date: Option<DateTime<Utc>> = row
                .try_get("payment_date")
                .map_err(|e| map_sqlx_error("client_trips", e))?;
            out.push(ClientTrip {
                trip,
                registered_at,
                payment_date,
            });
        }

        let ids: Vec<i64> = out.iter().map(|ct| ct.trip.id.get()).collect();
        let countries = load_countries(&mut *tx, &ids).await?;
        for client_trip in &mut out {
            if let Some(list) = countries.get(&client_trip.trip.id.get()) {
                client_trip.trip.countries = list.clone();
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("client_trips", e))?;
        Ok(Some(out))
    }

    async fn occupancy(&self, trip_id: TripId) -> Result<u32, StoreError> {
        count_registrations(&self.pool, trip_id).await
    }
}

/// Booking transaction over a single pooled connection.
pub struct PostgresTransaction {
    tx: Option<Transaction<'static, Postgres>>,
    locked: HashSet<TripId>,
}

impl PostgresTransaction {
    fn conn(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        self.tx.as_mut().ok_or(StoreError::Finished)
    }

    fn ensure_locked(&self, trip_id: TripId) -> Result<(), StoreError> {
        if self.tx.is_none() {
            return Err(StoreError::Finished);
        }
        if !self.locked.contains(&trip_id) {
            return Err(StoreError::TripNotLocked(trip_id));
        }
        Ok(())
    }
}

#[async_trait]
impl BookingTransaction for PostgresTransaction {
    async fn client_exists(&mut self, client_id: ClientId) -> Result<bool, StoreError> {
        let tx = self.conn()?;
        let row = sqlx::query("SELECT 1 FROM client WHERE id_client = $1 FOR KEY SHARE")
            .bind(client_id.get())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("client_exists", e))?;
        Ok(row.is_some())
    }

    async fn lock_trip(&mut self, trip_id: TripId) -> Result<Option<Trip>, StoreError> {
        let tx = self.conn()?;
        let row = sqlx::query(&format!(
            "SELECT {TRIP_COLUMNS} FROM trip t WHERE t.id_trip = $1 FOR UPDATE"
        ))
        .bind(trip_id.get())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_trip", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut trip = trip_from_row(&row)?;
        let mut countries = load_countries(&mut **tx, &[trip_id.get()]).await?;
        trip.countries = countries.remove(&trip_id.get()).unwrap_or_default();

        self.locked.insert(trip_id);
        Ok(Some(trip))
    }

    async fn registration_exists(
        &mut self,
        client_id: ClientId,
        trip_id: TripId,
    ) -> Result<bool, StoreError> {
        let tx = self.conn()?;
        let row = sqlx::query("SELECT 1 FROM client_trip WHERE id_client = $1 AND id_trip = $2")
            .bind(client_id.get())
            .bind(trip_id.get())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("registration_exists", e))?;
        Ok(row.is_some())
    }

    async fn occupancy(&mut self, trip_id: TripId) -> Result<u32, StoreError> {
        let tx = self.conn()?;
        count_registrations(&mut **tx, trip_id).await
    }

    async fn insert_registration(&mut self, registration: &Registration) -> Result<(), StoreError> {
        self.ensure_locked(registration.trip_id)?;
        let tx = self.conn()?;
        sqlx::query(
            r#"
            INSERT INTO client_trip (id_client, id_trip, registered_at, payment_date)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(registration.client_id.get())
        .bind(registration.trip_id.get())
        .bind(registration.registered_at)
        .bind(registration.payment_date)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_registration", e))?;
        Ok(())
    }

    async fn delete_registration(
        &mut self,
        client_id: ClientId,
        trip_id: TripId,
    ) -> Result<bool, StoreError> {
        self.ensure_locked(trip_id)?;
        let tx = self.conn()?;
        let result = sqlx::query("DELETE FROM client_trip WHERE id_client = $1 AND id_trip = $2")
            .bind(client_id.get())
            .bind(trip_id.get())
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("delete_registration", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::Finished)?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))?;
        self.locked.clear();
        Ok(())
    }
}

async fn count_registrations<'e, E>(executor: E, trip_id: TripId) -> Result<u32, StoreError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let row = sqlx::query("SELECT COUNT(*) AS taken FROM client_trip WHERE id_trip = $1")
        .bind(trip_id.get())
        .fetch_one(executor)
        .await
        .map_err(|e| map_sqlx_error("occupancy", e))?;
    let taken: i64 = row
        .try_get("taken")
        .map_err(|e| map_sqlx_error("occupancy", e))?;
    u32::try_from(taken).map_err(|_| StoreError::Backend(format!("occupancy {taken} out of range")))
}

/// Countries per trip id, ordered by name.
async fn load_countries(
    conn: &mut PgConnection,
    trip_ids: &[i64],
) -> Result<HashMap<i64, Vec<Country>>, StoreError> {
    let mut out: HashMap<i64, Vec<Country>> = HashMap::new();
    if trip_ids.is_empty() {
        return Ok(out);
    }

    let rows = sqlx::query(
        r#"
        SELECT ct.id_trip, c.name
        FROM country_trip ct
        JOIN country c ON c.id_country = ct.id_country
        WHERE ct.id_trip = ANY($1)
        ORDER BY ct.id_trip, c.name
        "#,
    )
    .bind(trip_ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("load_countries", e))?;

    for row in rows {
        let id_trip: i64 = row
            .try_get("id_trip")
            .map_err(|e| map_sqlx_error("load_countries", e))?;
        let name: String = row
            .try_get("name")
            .map_err(|e| map_sqlx_error("load_countries", e))?;
        out.entry(id_trip).or_default().push(Country::new(name));
    }
    Ok(out)
}

fn trip_from_row(row: &PgRow) -> Result<Trip, StoreError> {
    let decode = |e| map_sqlx_error("decode_trip", e);
    let id: i64 = row.try_get("id_trip").map_err(decode)?;
    let max_people: i32 = row.try_get("max_people").map_err(decode)?;
    Ok(Trip {
        id: TripId::new(id),
        name: row.try_get("name").map_err(decode)?,
        description: row.try_get("description").map_err(decode)?,
        date_from: row.try_get("date_from").map_err(decode)?,
        date_to: row.try_get("date_to").map_err(decode)?,
        max_people: u32::try_from(max_people)
            .map_err(|_| StoreError::Backend(format!("trip {id} has negative max_people")))?,
        countries: Vec::new(),
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::UniqueViolation(msg),
                Some("23503") => StoreError::ForeignKeyViolation(msg),
                Some("55P03") | Some("57014") | Some("40001") | Some("40P01") => {
                    StoreError::Busy(msg)
                }
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Busy(format!("timed out acquiring a connection in {}", operation))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("i/o error in {}: {}", operation, e)),
        sqlx::Error::Tls(e) => StoreError::Unavailable(format!("tls error in {}: {}", operation, e)),
        other => StoreError::Backend(format!("sqlx error in {}: {}", operation, other)),
    }
}
