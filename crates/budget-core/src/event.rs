//! Domain event abstractions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::repository::StoredEvent;

/// Metadata attached to every domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Type name for deserialization routing.
    pub event_type: String,
    /// Aggregate/stream this event belongs to.
    pub aggregate_id: Uuid,
    /// 0-based, strictly increasing version within the aggregate stream.
    pub stream_version: i64,
    /// Correlation ID for tracing a command through its effects.
    pub correlation_id: Uuid,
    /// Causation ID linking this event to the event/command that caused it.
    pub causation_id: Uuid,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
}

/// Sum type over the events one aggregate produces.
///
/// Each variant wraps a payload struct; the discriminator travels
/// separately as `event_type` so the payload stays a flat object the codec
/// can encrypt field by field.
pub trait EventKind: Clone + std::fmt::Debug + Send + Sync + 'static {
    /// Returns the event type name (used for serialization routing).
    fn event_type(&self) -> &'static str;

    /// Serializes the variant's payload to JSON.
    ///
    /// # Errors
    ///
    /// Returns the underlying serde error if the payload cannot be represented.
    fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error>;
}

/// An immutable fact about one aggregate: metadata plus a typed payload.
#[derive(Debug, Clone)]
pub struct DomainEvent<K> {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: K,
}

impl<K: EventKind> DomainEvent<K> {
    /// Returns the event type name of the payload.
    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    /// Converts to the plaintext storage representation.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if payload serialization fails.
    pub fn to_stored(&self) -> Result<StoredEvent, DomainError> {
        let meta = &self.metadata;
        let payload = self.kind.to_payload().map_err(|e| {
            DomainError::Infrastructure(format!("event serialization failed: {e}"))
        })?;
        Ok(StoredEvent {
            event_id: meta.event_id,
            aggregate_id: meta.aggregate_id,
            event_type: self.event_type().to_owned(),
            payload,
            stream_version: meta.stream_version,
            correlation_id: meta.correlation_id,
            causation_id: meta.causation_id,
            occurred_at: meta.occurred_at,
        })
    }

    /// Rebuilds a typed event from a decoded stored event.
    #[must_use]
    pub fn from_stored(stored: &StoredEvent, kind: K) -> Self {
        Self {
            metadata: EventMetadata {
                event_id: stored.event_id,
                event_type: stored.event_type.clone(),
                aggregate_id: stored.aggregate_id,
                stream_version: stored.stream_version,
                correlation_id: stored.correlation_id,
                causation_id: stored.causation_id,
                occurred_at: stored.occurred_at,
            },
            kind,
        }
    }
}
