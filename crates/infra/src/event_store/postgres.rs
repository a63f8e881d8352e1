//! Postgres-backed event store implementation.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | EventStoreError | Scenario |
//! |------------|----------------------|-----------------|----------|
//! | Database (unique violation) | `23505` | `Concurrency` | Concurrent append on the same stream version |
//! | Database (check constraint violation) | `23514` | `InvalidAppend` | Invalid data (e.g. `sequence_number <= 0`) |
//! | Database (other) | Any other | `Backend` | Other database errors |
//! | PoolClosed / Io / other | N/A | `Backend` | Connection and network failures |
//!
//! ## Sync access
//!
//! The async methods are the primary API. The [`EventStore`] impl bridges
//! them for the synchronous service layer: from a plain thread it blocks on
//! the store's runtime handle, from inside a multi-threaded Tokio runtime it
//! uses `block_in_place`. A current-thread runtime cannot block and is refused.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};
use tracing::instrument;

use brewforce_core::{AggregateId, ExpectedVersion};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent, validate_batch};

const SCHEMA: &str = include_str!("../../migrations/0001_events.sql");

/// Postgres-backed append-only event store.
///
/// `append()` runs in one transaction:
/// 1. read the current stream version (`MAX(sequence_number)`)
/// 2. compare it with `expected_version`
/// 3. insert the batch
///
/// If another transaction commits between steps 1 and 3, the unique
/// constraint on `(aggregate_id, sequence_number)` fails the insert and the
/// append reports a concurrency error.
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: Arc<PgPool>,
    handle: Handle,
    // Keeps an owned runtime alive for stores built with `connect_blocking`.
    _runtime: Option<Arc<Runtime>>,
}

impl PostgresEventStore {
    /// Wrap an existing pool; sync calls will run on `handle`.
    pub fn new(pool: PgPool, handle: Handle) -> Self {
        Self {
            pool: Arc::new(pool),
            handle,
            _runtime: None,
        }
    }

    /// Connect from inside a Tokio runtime.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, EventStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, Handle::current()))
    }

    /// Connect from synchronous code, spinning up a dedicated runtime.
    pub fn connect_blocking(database_url: &str, max_connections: u32) -> Result<Self, EventStoreError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("brewforce-pg")
            .build()
            .map_err(|e| EventStoreError::Backend(format!("failed to start runtime: {e}")))?;

        let pool = runtime.block_on(async {
            PgPoolOptions::new()
                .max_connections(max_connections)
                .connect(database_url)
                .await
                .map_err(|e| map_sqlx_error("connect", e))
        })?;

        Ok(Self {
            pool: Arc::new(pool),
            handle: runtime.handle().clone(),
            _runtime: Some(Arc::new(runtime)),
        })
    }

    /// Create the `events` table and indexes if missing.
    pub async fn ensure_schema(&self) -> Result<(), EventStoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    /// Blocking variant of [`PostgresEventStore::ensure_schema`].
    pub fn ensure_schema_blocking(&self) -> Result<(), EventStoreError> {
        self.block_on(self.ensure_schema())
    }

    /// Load all events for one aggregate stream, in sequence order.
    #[instrument(skip(self), fields(aggregate_id = %aggregate_id), err)]
    pub async fn load_stream_async(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                event_id,
                aggregate_id,
                aggregate_type,
                sequence_number,
                event_type,
                event_version,
                occurred_at,
                payload
            FROM events
            WHERE aggregate_id = $1
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(aggregate_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_stream", e))?;

        rows_to_events(rows)
    }

    /// Load all events of one aggregate type, ordered by stream then sequence.
    #[instrument(skip(self), err)]
    pub async fn load_by_type_async(
        &self,
        aggregate_type: &str,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                event_id,
                aggregate_id,
                aggregate_type,
                sequence_number,
                event_type,
                event_version,
                occurred_at,
                payload
            FROM events
            WHERE aggregate_type = $1
            ORDER BY aggregate_id ASC, sequence_number ASC
            "#,
        )
        .bind(aggregate_type)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_by_type", e))?;

        rows_to_events(rows)
    }

    /// Append events to a stream with optimistic concurrency control.
    #[instrument(
        skip(self, events),
        fields(event_count = events.len(), expected_version = ?expected_version),
        err
    )]
    pub async fn append_events(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        let (aggregate_id, aggregate_type) = validate_batch(&events)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let (current_version, existing_type) = check_stream_version(&mut tx, aggregate_id).await?;

        if let Some(existing_type) = existing_type {
            if existing_type != aggregate_type {
                tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{existing_type}', attempted append with '{aggregate_type}'"
                )));
            }
        }

        if let Err(mismatch) = expected_version.verify(current_version) {
            tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(EventStoreError::Concurrency(mismatch.to_string()));
        }

        let mut stored_events = Vec::with_capacity(events.len());
        let mut next_sequence = current_version + 1;

        for event in events {
            sqlx::query(
                r#"
                INSERT INTO events (
                    event_id,
                    aggregate_id,
                    aggregate_type,
                    sequence_number,
                    event_type,
                    event_version,
                    occurred_at,
                    payload
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(event.event_id)
            .bind(aggregate_id.as_uuid())
            .bind(&aggregate_type)
            .bind(next_sequence as i64)
            .bind(&event.event_type)
            .bind(event.event_version as i32)
            .bind(event.occurred_at)
            .bind(&event.payload)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    EventStoreError::Concurrency(format!(
                        "concurrent append detected: sequence_number {next_sequence} already exists"
                    ))
                } else {
                    map_sqlx_error("insert_event", e)
                }
            })?;

            stored_events.push(StoredEvent {
                event_id: event.event_id,
                aggregate_id: event.aggregate_id,
                aggregate_type: event.aggregate_type,
                sequence_number: next_sequence,
                event_type: event.event_type,
                event_version: event.event_version,
                occurred_at: event.occurred_at,
                payload: event.payload,
            });
            next_sequence += 1;
        }

        // A racing writer's unique violation can also surface at commit.
        tx.commit().await.map_err(|e| {
            if is_unique_violation(&e) {
                EventStoreError::Concurrency("concurrent append detected at commit".to_string())
            } else {
                map_sqlx_error("commit_transaction", e)
            }
        })?;

        Ok(stored_events)
    }

    fn block_on<F, T>(&self, fut: F) -> Result<T, EventStoreError>
    where
        F: Future<Output = Result<T, EventStoreError>>,
    {
        match Handle::try_current() {
            Ok(current) if current.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| self.handle.block_on(fut))
            }
            Ok(_) => Err(EventStoreError::Backend(
                "PostgresEventStore cannot block inside a current-thread runtime".to_string(),
            )),
            Err(_) => self.handle.block_on(fut),
        }
    }
}

impl EventStore for PostgresEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.block_on(self.append_events(events, expected_version))
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.block_on(self.load_stream_async(aggregate_id))
    }

    fn load_by_type(&self, aggregate_type: &str) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.block_on(self.load_by_type_async(aggregate_type))
    }
}

/// Returns `(current_version, aggregate_type)`; `(0, None)` for a new stream.
async fn check_stream_version(
    tx: &mut Transaction<'_, Postgres>,
    aggregate_id: AggregateId,
) -> Result<(u64, Option<String>), EventStoreError> {
    let row = sqlx::query(
        r#"
        SELECT
            COALESCE(MAX(sequence_number), 0) AS current_version,
            MAX(aggregate_type) AS aggregate_type
        FROM events
        WHERE aggregate_id = $1
        "#,
    )
    .bind(aggregate_id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("check_stream_version", e))?;

    let current_version: i64 = row
        .try_get("current_version")
        .map_err(|e| EventStoreError::Backend(format!("failed to read current_version: {e}")))?;
    let aggregate_type: Option<String> = row
        .try_get("aggregate_type")
        .map_err(|e| EventStoreError::Backend(format!("failed to read aggregate_type: {e}")))?;

    Ok((current_version.max(0) as u64, aggregate_type))
}

fn rows_to_events(rows: Vec<sqlx::postgres::PgRow>) -> Result<Vec<StoredEvent>, EventStoreError> {
    rows.iter()
        .map(|row| {
            StoredEventRow::from_row(row)
                .map(StoredEvent::from)
                .map_err(|e| EventStoreError::Backend(format!("failed to deserialize event row: {e}")))
        })
        .collect()
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => EventStoreError::Concurrency(msg),
                Some("23514") => EventStoreError::InvalidAppend(msg),
                _ => EventStoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            EventStoreError::Backend(format!("connection pool closed in {operation}"))
        }
        other => EventStoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

#[derive(Debug)]
struct StoredEventRow {
    event_id: uuid::Uuid,
    aggregate_id: uuid::Uuid,
    aggregate_type: String,
    sequence_number: i64,
    event_type: String,
    event_version: i32,
    occurred_at: DateTime<Utc>,
    payload: serde_json::Value,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredEventRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredEventRow {
            event_id: row.try_get("event_id")?,
            aggregate_id: row.try_get("aggregate_id")?,
            aggregate_type: row.try_get("aggregate_type")?,
            sequence_number: row.try_get("sequence_number")?,
            event_type: row.try_get("event_type")?,
            event_version: row.try_get("event_version")?,
            occurred_at: row.try_get("occurred_at")?,
            payload: row.try_get("payload")?,
        })
    }
}

impl From<StoredEventRow> for StoredEvent {
    fn from(row: StoredEventRow) -> Self {
        StoredEvent {
            event_id: row.event_id,
            aggregate_id: AggregateId::from_uuid(row.aggregate_id),
            aggregate_type: row.aggregate_type,
            sequence_number: row.sequence_number as u64,
            event_type: row.event_type,
            event_version: row.event_version as u32,
            occurred_at: row.occurred_at,
            payload: row.payload,
        }
    }
}
