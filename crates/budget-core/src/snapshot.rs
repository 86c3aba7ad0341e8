//! Snapshot store abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DomainError;

/// Serialized aggregate state folded up to `version`.
///
/// A snapshot is never required for correctness: replaying the events after
/// `version` on top of it yields the same state as a full replay.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Aggregate this snapshot belongs to.
    pub aggregate_id: Uuid,
    /// Aggregate type name, guards against restoring into the wrong type.
    pub aggregate_type: String,
    /// Version of the last event folded into the state.
    pub version: i64,
    /// `occurred_at` of that last event; point-in-time loads before it
    /// cannot use the snapshot.
    pub last_event_at: DateTime<Utc>,
    /// Owner of the key sealing `state`.
    pub key_owner: Uuid,
    /// Sealed aggregate state.
    pub state: serde_json::Value,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
}

/// Storage of the latest snapshot per aggregate.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Returns the latest snapshot for an aggregate, if any.
    async fn latest(&self, aggregate_id: Uuid) -> Result<Option<Snapshot>, DomainError>;

    /// Stores a snapshot, replacing an older one for the same aggregate.
    /// A snapshot older than the stored one is ignored.
    async fn save(&self, snapshot: Snapshot) -> Result<(), DomainError>;
}
