//! `PostgreSQL` implementation of the `EventLog` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use budget_core::error::DomainError;
use budget_core::repository::{
    EventLog, EventStream, LoggedEvent, StoredEvent, check_contiguous,
};

// Appends hold this transaction-scoped lock so that `position` values
// become visible in the order they were assigned; a reader paging by
// position can then never skip a row that commits later.
const APPEND_LOCK_KEY: i64 = 0x6275_6467_6574_6c6f;

const APPEND_LOCK_SQL: &str = "SELECT pg_advisory_xact_lock($1)";

const CURRENT_VERSION_SQL: &str = r"
SELECT COALESCE(MAX(stream_version), -1)
FROM domain_events
WHERE aggregate_id = $1
";

const INSERT_EVENT_SQL: &str = r"
INSERT INTO domain_events (
    event_id, aggregate_id, event_type, payload, stream_version,
    correlation_id, causation_id, occurred_at
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
";

// With an `until` bound the read stops at the first event recorded after it,
// so the result is always a gap-free prefix of the stream.
const SELECT_EVENTS_SQL: &str = r"
SELECT event_id, aggregate_id, event_type, payload, stream_version,
       correlation_id, causation_id, occurred_at
FROM domain_events
WHERE aggregate_id = $1
  AND stream_version > $2
  AND (
    $3::timestamptz IS NULL
    OR stream_version < COALESCE(
        (SELECT MIN(stream_version) FROM domain_events
         WHERE aggregate_id = $1 AND occurred_at > $3),
        9223372036854775807)
  )
ORDER BY stream_version ASC
";

const SELECT_ALL_SQL: &str = r"
SELECT position, event_id, aggregate_id, event_type, payload, stream_version,
       correlation_id, causation_id, occurred_at
FROM domain_events
WHERE position > $1
ORDER BY position ASC
LIMIT $2
";

const HEAD_POSITION_SQL: &str = "SELECT COALESCE(MAX(position), 0) FROM domain_events";

fn infrastructure(e: &sqlx::Error) -> DomainError {
    DomainError::Infrastructure(format!("event log: {e}"))
}

fn row_to_event(row: &PgRow) -> Result<StoredEvent, DomainError> {
    let decode = |e: sqlx::Error| infrastructure(&e);
    Ok(StoredEvent {
        event_id: row.try_get("event_id").map_err(decode)?,
        aggregate_id: row.try_get("aggregate_id").map_err(decode)?,
        event_type: row.try_get("event_type").map_err(decode)?,
        payload: row.try_get("payload").map_err(decode)?,
        stream_version: row.try_get("stream_version").map_err(decode)?,
        correlation_id: row.try_get("correlation_id").map_err(decode)?,
        causation_id: row.try_get("causation_id").map_err(decode)?,
        occurred_at: row.try_get("occurred_at").map_err(decode)?,
    })
}

/// PostgreSQL-backed event log.
#[derive(Debug, Clone)]
pub struct PgEventLog {
    pool: PgPool,
}

impl PgEventLog {
    /// Creates a new `PgEventLog`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A writer that passed the version check can still lose the race on the
    /// `(aggregate_id, stream_version)` unique constraint.
    async fn insert_error(
        &self,
        error: sqlx::Error,
        aggregate_id: Uuid,
        expected_version: i64,
    ) -> DomainError {
        let unique_violation = match &error {
            sqlx::Error::Database(db) => db.is_unique_violation(),
            _ => false,
        };
        if !unique_violation {
            return infrastructure(&error);
        }
        let current = self.current_version(aggregate_id).await;
        lost_race(aggregate_id, expected_version, &error, current)
    }
}

/// Maps a lost unique-constraint race to a conflict carrying the version
/// that won, or to an infrastructure error when that version is unknown.
fn lost_race(
    aggregate_id: Uuid,
    expected_version: i64,
    error: &dyn std::fmt::Display,
    current: Result<i64, DomainError>,
) -> DomainError {
    match current {
        Ok(actual) => DomainError::ConcurrencyConflict {
            aggregate_id,
            expected: expected_version,
            actual,
        },
        Err(lookup) => DomainError::Infrastructure(format!(
            "append to {aggregate_id} lost a version race ({error}) and the current \
             version could not be read: {lookup}"
        )),
    }
}

#[async_trait]
impl EventLog for PgEventLog {
    async fn append(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        if events.is_empty() {
            return Ok(());
        }
        check_contiguous(aggregate_id, expected_version, events)?;

        let mut tx = self.pool.begin().await.map_err(|e| infrastructure(&e))?;
        sqlx::query(APPEND_LOCK_SQL)
            .bind(APPEND_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(|e| infrastructure(&e))?;

        let actual: i64 = sqlx::query_scalar(CURRENT_VERSION_SQL)
            .bind(aggregate_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| infrastructure(&e))?;
        if actual != expected_version {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual,
            });
        }

        for event in events {
            let inserted = sqlx::query(INSERT_EVENT_SQL)
                .bind(event.event_id)
                .bind(event.aggregate_id)
                .bind(&event.event_type)
                .bind(&event.payload)
                .bind(event.stream_version)
                .bind(event.correlation_id)
                .bind(event.causation_id)
                .bind(event.occurred_at)
                .execute(&mut *tx)
                .await;
            if let Err(e) = inserted {
                drop(tx);
                return Err(self.insert_error(e, aggregate_id, expected_version).await);
            }
        }

        if let Err(e) = tx.commit().await {
            return Err(self.insert_error(e, aggregate_id, expected_version).await);
        }

        debug!(%aggregate_id, expected_version, count = events.len(), "events appended");
        Ok(())
    }

    fn read_from(
        &self,
        aggregate_id: Uuid,
        from_version_exclusive: i64,
        until: Option<DateTime<Utc>>,
    ) -> EventStream<'_> {
        sqlx::query(SELECT_EVENTS_SQL)
            .bind(aggregate_id)
            .bind(from_version_exclusive)
            .bind(until)
            .fetch(&self.pool)
            .map(|row| {
                row.map_err(|e| infrastructure(&e))
                    .and_then(|r| row_to_event(&r))
            })
            .boxed()
    }

    async fn current_version(&self, aggregate_id: Uuid) -> Result<i64, DomainError> {
        sqlx::query_scalar(CURRENT_VERSION_SQL)
            .bind(aggregate_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| infrastructure(&e))
    }

    async fn read_all(
        &self,
        after_position: i64,
        limit: usize,
    ) -> Result<Vec<LoggedEvent>, DomainError> {
        let rows = sqlx::query(SELECT_ALL_SQL)
            .bind(after_position)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| infrastructure(&e))?;
        rows.iter()
            .map(|row| {
                Ok(LoggedEvent {
                    position: row.try_get("position").map_err(|e| infrastructure(&e))?,
                    event: row_to_event(row)?,
                })
            })
            .collect()
    }

    async fn head_position(&self) -> Result<i64, DomainError> {
        sqlx::query_scalar(HEAD_POSITION_SQL)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| infrastructure(&e))
    }
}
