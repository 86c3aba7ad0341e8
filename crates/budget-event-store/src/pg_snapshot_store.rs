//! `PostgreSQL` implementation of the `SnapshotStore` trait.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use budget_core::error::DomainError;
use budget_core::snapshot::{Snapshot, SnapshotStore};

const SELECT_SNAPSHOT_SQL: &str = r"
SELECT aggregate_id, aggregate_type, version, last_event_at, key_owner, state, taken_at
FROM aggregate_snapshots
WHERE aggregate_id = $1
";

// Older snapshots never overwrite newer ones.
const UPSERT_SNAPSHOT_SQL: &str = r"
INSERT INTO aggregate_snapshots (
    aggregate_id, aggregate_type, version, last_event_at, key_owner, state, taken_at
) VALUES ($1, $2, $3, $4, $5, $6, $7)
ON CONFLICT (aggregate_id) DO UPDATE SET
    aggregate_type = EXCLUDED.aggregate_type,
    version = EXCLUDED.version,
    last_event_at = EXCLUDED.last_event_at,
    key_owner = EXCLUDED.key_owner,
    state = EXCLUDED.state,
    taken_at = EXCLUDED.taken_at
WHERE aggregate_snapshots.version < EXCLUDED.version
";

fn infrastructure(e: &sqlx::Error) -> DomainError {
    DomainError::Infrastructure(format!("snapshot store: {e}"))
}

/// PostgreSQL-backed snapshot store.
#[derive(Debug, Clone)]
pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    /// Creates a new `PgSnapshotStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn latest(&self, aggregate_id: Uuid) -> Result<Option<Snapshot>, DomainError> {
        let row = sqlx::query(SELECT_SNAPSHOT_SQL)
            .bind(aggregate_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| infrastructure(&e))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let decode = |e: sqlx::Error| infrastructure(&e);
        Ok(Some(Snapshot {
            aggregate_id: row.try_get("aggregate_id").map_err(decode)?,
            aggregate_type: row.try_get("aggregate_type").map_err(decode)?,
            version: row.try_get("version").map_err(decode)?,
            last_event_at: row.try_get("last_event_at").map_err(decode)?,
            key_owner: row.try_get("key_owner").map_err(decode)?,
            state: row.try_get("state").map_err(decode)?,
            taken_at: row.try_get("taken_at").map_err(decode)?,
        }))
    }

    async fn save(&self, snapshot: Snapshot) -> Result<(), DomainError> {
        sqlx::query(UPSERT_SNAPSHOT_SQL)
            .bind(snapshot.aggregate_id)
            .bind(&snapshot.aggregate_type)
            .bind(snapshot.version)
            .bind(snapshot.last_event_at)
            .bind(snapshot.key_owner)
            .bind(&snapshot.state)
            .bind(snapshot.taken_at)
            .execute(&self.pool)
            .await
            .map_err(|e| infrastructure(&e))?;
        Ok(())
    }
}
