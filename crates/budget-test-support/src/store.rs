//! In-memory event store wiring for handler tests.

use std::sync::Arc;

use budget_core::clock::{Clock, SystemClock};
use budget_core::publisher::EventPublisher;
use budget_core::repository::StoredEvent;
use budget_event_store::cipher::InMemoryKeyRing;
use budget_event_store::codec::EventCodec;
use budget_event_store::event_sourced_repository::{EventStoreContext, SnapshotPolicy};
use budget_event_store::memory::InMemorySnapshotStore;
use uuid::Uuid;

use crate::log::FaultyEventLog;
use crate::publisher::RecordingPublisher;

/// In-memory log, snapshot store, key ring and recording publisher, plus
/// the `EventStoreContext` that ties them together.
#[derive(Debug, Clone)]
pub struct TestStore {
    /// Event log; can be told to fail appends for chosen aggregates.
    pub log: Arc<FaultyEventLog>,
    /// Snapshot store.
    pub snapshots: Arc<InMemorySnapshotStore>,
    /// Key ring; revoke an owner to simulate crypto-shredding.
    pub keys: Arc<InMemoryKeyRing>,
    /// Everything published after successful saves.
    pub publisher: Arc<RecordingPublisher>,
    /// Context handed to repositories.
    pub context: EventStoreContext,
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TestStore {
    /// Creates a store that never snapshots and stamps snapshots with the
    /// system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with(SnapshotPolicy::Never, Arc::new(SystemClock))
    }

    /// Creates a store with the given snapshot policy and clock.
    #[must_use]
    pub fn with(snapshot_policy: SnapshotPolicy, clock: Arc<dyn Clock>) -> Self {
        let log = Arc::new(FaultyEventLog::new());
        let snapshots = Arc::new(InMemorySnapshotStore::new());
        let keys = Arc::new(InMemoryKeyRing::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let context = EventStoreContext {
            log: log.clone(),
            snapshots: snapshots.clone(),
            codec: EventCodec::new(keys.clone()),
            publisher: publisher.clone(),
            clock,
            snapshot_policy,
        };
        Self {
            log,
            snapshots,
            keys,
            publisher,
            context,
        }
    }

    /// Returns a copy of the context that publishes to `publisher` instead
    /// of the recording publisher.
    #[must_use]
    pub fn context_with_publisher(&self, publisher: Arc<dyn EventPublisher>) -> EventStoreContext {
        EventStoreContext {
            publisher,
            ..self.context.clone()
        }
    }

    /// Returns the raw, still encrypted, stream of an aggregate.
    ///
    /// # Panics
    ///
    /// Panics if the log's lock is poisoned.
    pub fn raw_stream(&self, aggregate_id: Uuid) -> Vec<StoredEvent> {
        self.log.inner().stream(aggregate_id).unwrap()
    }
}
