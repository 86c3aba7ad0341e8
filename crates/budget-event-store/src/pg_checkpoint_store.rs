//! `PostgreSQL` implementation of the `CheckpointStore` trait.
//!
//! For projections whose read models live in the same database, so the
//! checkpoint and the rows survive (or vanish) together.

use async_trait::async_trait;
use sqlx::PgPool;

use budget_core::error::DomainError;
use budget_core::projection::CheckpointStore;

const SELECT_CHECKPOINT_SQL: &str = r"
SELECT position FROM projection_checkpoints WHERE projection = $1
";

const UPSERT_CHECKPOINT_SQL: &str = r"
INSERT INTO projection_checkpoints (projection, position, updated_at)
VALUES ($1, $2, NOW())
ON CONFLICT (projection) DO UPDATE SET
    position = EXCLUDED.position,
    updated_at = EXCLUDED.updated_at
";

fn infrastructure(e: &sqlx::Error) -> DomainError {
    DomainError::Infrastructure(format!("checkpoint store: {e}"))
}

/// PostgreSQL-backed projection checkpoints.
#[derive(Debug, Clone)]
pub struct PgCheckpointStore {
    pool: PgPool,
}

impl PgCheckpointStore {
    /// Creates a new `PgCheckpointStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CheckpointStore for PgCheckpointStore {
    async fn load(&self, projection: &str) -> Result<Option<i64>, DomainError> {
        sqlx::query_scalar(SELECT_CHECKPOINT_SQL)
            .bind(projection)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| infrastructure(&e))
    }

    async fn save(&self, projection: &str, position: i64) -> Result<(), DomainError> {
        sqlx::query(UPSERT_CHECKPOINT_SQL)
            .bind(projection)
            .bind(position)
            .execute(&self.pool)
            .await
            .map_err(|e| infrastructure(&e))?;
        Ok(())
    }
}
