//! Outbound signal for durably appended events.

use async_trait::async_trait;

use crate::error::DomainError;
use crate::repository::StoredEvent;

/// Tells asynchronous consumers that events were appended.
///
/// Only events that have been appended to the log are ever published.
/// Consumers read the log themselves, so a lost or failed publish only
/// delays them. Implementations must not wait for consumers to finish.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes events of one stream, in version order.
    async fn publish(&self, events: &[StoredEvent]) -> Result<(), DomainError>;
}
