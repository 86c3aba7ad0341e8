//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An aggregate was not found (no events, or all excluded by `as_of`).
    #[error("aggregate not found: {0}")]
    AggregateNotFound(Uuid),

    /// Optimistic concurrency conflict.
    #[error("concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The aggregate that had the conflict.
        aggregate_id: Uuid,
        /// The expected version.
        expected: i64,
        /// The actual version found.
        actual: i64,
    },

    /// A stored event could not be decrypted or decoded.
    #[error("corrupted event {stream_version} in stream {aggregate_id}: {reason}")]
    CorruptedEvent {
        /// The stream the event belongs to.
        aggregate_id: Uuid,
        /// Version of the offending event.
        stream_version: i64,
        /// What went wrong.
        reason: String,
    },

    /// A stored event carries a type no registry entry knows about.
    #[error("unknown event type {event_type} in stream {aggregate_id}")]
    UnknownEventType {
        /// The stream the event belongs to.
        aggregate_id: Uuid,
        /// The unrecognized discriminator.
        event_type: String,
    },

    /// A mutating operation was attempted on a deleted aggregate.
    #[error("aggregate {0} has been deleted")]
    AggregateDeleted(Uuid),

    /// The acting user does not own the aggregate.
    #[error("aggregate {aggregate_id} is not owned by user {user_id}")]
    NotOwner {
        /// The aggregate being acted upon.
        aggregate_id: Uuid,
        /// The acting user.
        user_id: Uuid,
    },

    /// A uniqueness rule was violated.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Returns `true` for errors that indicate damaged or unreadable history.
    ///
    /// These are never worth retrying: the same load will fail the same way.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::CorruptedEvent { .. } | Self::UnknownEventType { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corruption_errors_are_classified() {
        let id = Uuid::new_v4();
        assert!(
            DomainError::CorruptedEvent {
                aggregate_id: id,
                stream_version: 3,
                reason: "bad tag".into(),
            }
            .is_corruption()
        );
        assert!(
            DomainError::UnknownEventType {
                aggregate_id: id,
                event_type: "nope".into(),
            }
            .is_corruption()
        );
        assert!(!DomainError::AggregateNotFound(id).is_corruption());
    }

    #[test]
    fn test_concurrency_conflict_message_names_versions() {
        let id = Uuid::nil();
        let err = DomainError::ConcurrencyConflict {
            aggregate_id: id,
            expected: 4,
            actual: 5,
        };
        assert_eq!(
            err.to_string(),
            format!("concurrency conflict on aggregate {id}: expected version 4, found 5")
        );
    }
}
