//! Projection and read-model abstractions.

use async_trait::async_trait;

use crate::error::DomainError;
use crate::repository::StoredEvent;

/// Idempotent consumer that maintains one read model from published events.
#[async_trait]
pub trait ProjectionHandler: Send + Sync {
    /// Stable name; keys the checkpoint and appears in logs.
    fn name(&self) -> &'static str;

    /// Returns `true` if the handler wants events of `event_type`.
    fn handles(&self, event_type: &str) -> bool;

    /// Applies the event. Redelivering the same event must leave the read
    /// model unchanged.
    async fn handle(&self, event: &StoredEvent) -> Result<(), DomainError>;
}

/// A denormalized row owned by exactly one projection.
pub trait ReadModel: Clone + Send + Sync + 'static {
    /// Stable key type.
    type Key: Ord + Clone + std::fmt::Debug + Send + Sync + 'static;

    /// Returns the row's stable key.
    fn key(&self) -> Self::Key;
}

/// Storage of read-model rows, consumed only by projection handlers and
/// query handlers.
#[async_trait]
pub trait ReadModelRepository<V: ReadModel>: Send + Sync {
    /// Finds a row by key.
    async fn find_one(&self, key: &V::Key) -> Result<Option<V>, DomainError>;

    /// Returns all rows ordered by key.
    async fn find_all(&self) -> Result<Vec<V>, DomainError>;

    /// Inserts or replaces the row with the same key.
    async fn save(&self, view: V) -> Result<(), DomainError>;

    /// Deletes a row; deleting a missing key is not an error.
    async fn delete(&self, key: &V::Key) -> Result<(), DomainError>;
}

/// Turns an event as stored in the log into the plaintext form projection
/// handlers consume.
pub trait EventDecoder: Send + Sync {
    /// Decodes one stored event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownEventType` for unregistered types and
    /// `DomainError::CorruptedEvent` if the payload cannot be opened.
    fn decode(&self, event: &StoredEvent) -> Result<StoredEvent, DomainError>;
}

/// Last global log position each projection has applied.
///
/// Checkpoints must live as long as the read models they describe: a
/// projection whose rows are lost must also lose its checkpoint.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Returns the checkpoint of `projection`, or `None` if it never ran.
    async fn load(&self, projection: &str) -> Result<Option<i64>, DomainError>;

    /// Records that `projection` applied everything up to `position`.
    async fn save(&self, projection: &str, position: i64) -> Result<(), DomainError>;
}
