//! Aggregate root abstraction.

use uuid::Uuid;

use crate::clock::Clock;
use crate::event::{DomainEvent, EventKind, EventMetadata};
use crate::repository::EMPTY_STREAM_VERSION;

/// Buffer of events raised by business methods but not yet persisted.
#[derive(Debug, Clone)]
pub struct PendingEvents<K> {
    events: Vec<DomainEvent<K>>,
}

impl<K> Default for PendingEvents<K> {
    fn default() -> Self {
        Self { events: Vec::new() }
    }
}

impl<K> PendingEvents<K> {
    /// Appends a raised event.
    pub fn push(&mut self, event: DomainEvent<K>) {
        self.events.push(event);
    }

    /// Returns the buffered events in raise order.
    #[must_use]
    pub fn as_slice(&self) -> &[DomainEvent<K>] {
        &self.events
    }

    /// Returns the number of buffered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` when nothing is waiting to be persisted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Empties the buffer, returning its contents.
    pub fn drain(&mut self) -> Vec<DomainEvent<K>> {
        std::mem::take(&mut self.events)
    }
}

/// Trait for aggregate roots that reconstitute from event history.
pub trait AggregateRoot: Send + Sync + Sized {
    /// The event type this aggregate produces and consumes.
    type Event: EventKind;

    /// Name stored with snapshots of this aggregate.
    const AGGREGATE_TYPE: &'static str;

    /// Creates an aggregate with no history (version `-1`).
    fn empty(id: Uuid) -> Self;

    /// Returns the aggregate identifier.
    fn aggregate_id(&self) -> Uuid;

    /// Returns the version of the last applied event, `-1` if none.
    fn version(&self) -> i64;

    /// Applies an event to internal state. Must be pure and must set the
    /// version to the event's `stream_version`.
    fn apply(&mut self, event: &DomainEvent<Self::Event>);

    /// Returns events raised since the aggregate was loaded.
    fn pending_events(&self) -> &PendingEvents<Self::Event>;

    /// Mutable access to the pending-events buffer.
    fn pending_events_mut(&mut self) -> &mut PendingEvents<Self::Event>;

    /// Identity whose encryption key seals snapshots of this aggregate.
    fn key_owner(&self) -> Uuid;

    /// Returns `true` once at least one event has been applied.
    fn exists(&self) -> bool {
        self.version() > EMPTY_STREAM_VERSION
    }

    /// Version the aggregate had when it was loaded, used as the expected
    /// version on append.
    #[allow(clippy::cast_possible_wrap)]
    fn persisted_version(&self) -> i64 {
        self.version() - self.pending_events().len() as i64
    }

    /// Records a new event: applies it to local state so later operations in
    /// the same unit of work observe it, then buffers it for persistence.
    fn raise(&mut self, kind: Self::Event, correlation_id: Uuid, clock: &dyn Clock) {
        let event = DomainEvent {
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                event_type: kind.event_type().to_owned(),
                aggregate_id: self.aggregate_id(),
                stream_version: self.version() + 1,
                correlation_id,
                causation_id: correlation_id,
                occurred_at: clock.now(),
            },
            kind,
        };
        self.apply(&event);
        self.pending_events_mut().push(event);
    }

    /// Removes and returns all pending events.
    fn drain_pending_events(&mut self) -> Vec<DomainEvent<Self::Event>> {
        self.pending_events_mut().drain()
    }
}
