//! Event store database schema.

/// SQL to create the events table.
pub const CREATE_EVENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS domain_events (
    event_id        UUID PRIMARY KEY,
    aggregate_id    UUID NOT NULL,
    event_type      VARCHAR(255) NOT NULL,
    payload         JSONB NOT NULL,
    stream_version  BIGINT NOT NULL CHECK (stream_version >= 0),
    correlation_id  UUID NOT NULL,
    causation_id    UUID NOT NULL,
    occurred_at     TIMESTAMPTZ NOT NULL,
    recorded_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (aggregate_id, stream_version)
);

CREATE INDEX IF NOT EXISTS idx_domain_events_correlation_id
    ON domain_events (correlation_id);
";

/// SQL to create the snapshots table.
pub const CREATE_SNAPSHOTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS aggregate_snapshots (
    aggregate_id    UUID PRIMARY KEY,
    aggregate_type  VARCHAR(255) NOT NULL,
    version         BIGINT NOT NULL,
    last_event_at   TIMESTAMPTZ NOT NULL,
    key_owner       UUID NOT NULL,
    state           JSONB NOT NULL,
    taken_at        TIMESTAMPTZ NOT NULL
);
";

/// SQL giving every event a position in the global log.
pub const ADD_EVENT_POSITION: &str = r"
ALTER TABLE domain_events ADD COLUMN IF NOT EXISTS position BIGSERIAL;

CREATE UNIQUE INDEX IF NOT EXISTS idx_domain_events_position
    ON domain_events (position);
";

/// SQL to create the projection checkpoints table.
pub const CREATE_CHECKPOINTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS projection_checkpoints (
    projection  VARCHAR(255) PRIMARY KEY,
    position    BIGINT NOT NULL CHECK (position >= 0),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
";

/// Creates the event store tables if they do not exist yet.
///
/// # Errors
///
/// Returns the underlying `sqlx::Error` if a statement fails.
pub async fn ensure_schema(pool: &sqlx::PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(CREATE_EVENTS_TABLE).execute(pool).await?;
    sqlx::raw_sql(CREATE_SNAPSHOTS_TABLE).execute(pool).await?;
    sqlx::raw_sql(ADD_EVENT_POSITION).execute(pool).await?;
    sqlx::raw_sql(CREATE_CHECKPOINTS_TABLE).execute(pool).await?;
    Ok(())
}
