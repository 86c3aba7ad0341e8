//! Event log abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::error::DomainError;

/// Version reported for a stream that holds no events.
pub const EMPTY_STREAM_VERSION: i64 = -1;

/// Global log position before the first event.
pub const LOG_START: i64 = 0;

/// Stored representation of a domain event.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Aggregate this event belongs to.
    pub aggregate_id: Uuid,
    /// Event type name for deserialization routing.
    pub event_type: String,
    /// Serialized event payload (possibly with encrypted fields).
    pub payload: serde_json::Value,
    /// 0-based version within the aggregate stream.
    pub stream_version: i64,
    /// Correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Causation ID linking to the causing event/command.
    pub causation_id: Uuid,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
}

/// A stored event together with its position in the global log.
///
/// Positions start at 1 and grow in commit order, so the events of one
/// stream appear in version order.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedEvent {
    /// Position across all streams.
    pub position: i64,
    /// The event as stored.
    pub event: StoredEvent,
}

/// Lazy, finite, forward-only sequence of stored events.
///
/// A fresh call to [`EventLog::read_from`] re-queries storage.
pub type EventStream<'a> = BoxStream<'a, Result<StoredEvent, DomainError>>;

/// Append-only, per-aggregate storage of domain events.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Atomically appends `events` to the stream of `aggregate_id`.
    ///
    /// `expected_version` is the highest version the writer observed
    /// (`-1` for a new stream). The events must be numbered
    /// `expected_version + 1` onwards without gaps. Either all events are
    /// written or none are.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` if the stream has moved
    /// past `expected_version`.
    async fn append(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError>;

    /// Streams events with `stream_version > from_version_exclusive`,
    /// ordered by version. With `until`, events that occurred after it are
    /// excluded.
    fn read_from(
        &self,
        aggregate_id: Uuid,
        from_version_exclusive: i64,
        until: Option<DateTime<Utc>>,
    ) -> EventStream<'_>;

    /// Returns the highest version in the stream, or `-1` when empty.
    async fn current_version(&self, aggregate_id: Uuid) -> Result<i64, DomainError>;

    /// Returns up to `limit` events of every stream with
    /// `position > after_position`, in position order.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if storage cannot be read.
    async fn read_all(
        &self,
        after_position: i64,
        limit: usize,
    ) -> Result<Vec<LoggedEvent>, DomainError>;

    /// Returns the position of the newest event, or [`LOG_START`] when the
    /// log is empty.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if storage cannot be read.
    async fn head_position(&self) -> Result<i64, DomainError>;
}

/// Verifies that `events` belong to `aggregate_id` and continue the stream
/// from `expected_version` without gaps.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` describing the first offending event.
pub fn check_contiguous(
    aggregate_id: Uuid,
    expected_version: i64,
    events: &[StoredEvent],
) -> Result<(), DomainError> {
    let mut next = expected_version + 1;
    for event in events {
        if event.aggregate_id != aggregate_id {
            return Err(DomainError::Infrastructure(format!(
                "event {} belongs to stream {}, not {aggregate_id}",
                event.event_id, event.aggregate_id
            )));
        }
        if event.stream_version != next {
            return Err(DomainError::Infrastructure(format!(
                "event {} has version {}, expected {next}",
                event.event_id, event.stream_version
            )));
        }
        next += 1;
    }
    Ok(())
}
