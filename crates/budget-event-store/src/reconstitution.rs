//! Aggregate reconstitution engine.
//!
//! Loads the nearest usable snapshot, then folds the tail of the stream
//! through the aggregate's `apply`, decoding each event on the way.

use budget_core::aggregate::AggregateRoot;
use budget_core::error::DomainError;
use budget_core::event::DomainEvent;
use budget_core::registry::EventTypeRegistry;
use budget_core::repository::{EventLog, StoredEvent};
use budget_core::snapshot::{Snapshot, SnapshotStore};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::codec::EventCodec;

/// Rebuilds aggregates of type `A` from snapshots and the event log.
pub struct Reconstitutor<'a, A: AggregateRoot> {
    log: &'a dyn EventLog,
    snapshots: &'a dyn SnapshotStore,
    codec: &'a EventCodec,
    registry: &'a EventTypeRegistry<A::Event>,
}

impl<'a, A> Reconstitutor<'a, A>
where
    A: AggregateRoot + DeserializeOwned,
{
    /// Creates an engine over the given stores.
    #[must_use]
    pub fn new(
        log: &'a dyn EventLog,
        snapshots: &'a dyn SnapshotStore,
        codec: &'a EventCodec,
        registry: &'a EventTypeRegistry<A::Event>,
    ) -> Self {
        Self {
            log,
            snapshots,
            codec,
            registry,
        }
    }

    /// Reconstitutes the aggregate as of now, or as of `as_of`.
    ///
    /// An aggregate without events comes back with version `-1`; that is
    /// not an error at this level.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::CorruptedEvent` or `DomainError::UnknownEventType`
    /// if an event cannot be decoded, and propagates event log failures.
    pub async fn reconstitute(
        &self,
        aggregate_id: Uuid,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<A, DomainError> {
        let mut aggregate = match self.usable_snapshot(aggregate_id, as_of).await {
            Some(restored) => restored,
            None => A::empty(aggregate_id),
        };
        let start_version = aggregate.version();

        let mut events = self.log.read_from(aggregate_id, start_version, as_of);
        let mut replayed = 0usize;
        while let Some(stored) = events.try_next().await? {
            self.apply_stored(&mut aggregate, &stored)?;
            replayed += 1;
        }

        debug!(
            %aggregate_id,
            aggregate_type = A::AGGREGATE_TYPE,
            start_version,
            replayed,
            version = aggregate.version(),
            "aggregate reconstituted"
        );
        Ok(aggregate)
    }

    /// Decodes one stored event and applies it.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::CorruptedEvent` if the event does not directly
    /// follow the aggregate's version or fails to decrypt/deserialize, and
    /// `DomainError::UnknownEventType` for unregistered types.
    pub fn apply_stored(&self, aggregate: &mut A, stored: &StoredEvent) -> Result<(), DomainError> {
        let expected = aggregate.version() + 1;
        if stored.stream_version != expected {
            return Err(DomainError::CorruptedEvent {
                aggregate_id: stored.aggregate_id,
                stream_version: stored.stream_version,
                reason: format!("stream gap: expected version {expected}"),
            });
        }
        let plain = self.decode(stored)?;
        let kind = self.registry.decode(&plain)?;
        aggregate.apply(&DomainEvent::from_stored(&plain, kind));
        Ok(())
    }

    /// Decrypts the payload of a stored event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownEventType` or `DomainError::CorruptedEvent`.
    pub fn decode(&self, stored: &StoredEvent) -> Result<StoredEvent, DomainError> {
        let fields = self
            .registry
            .encrypted_fields(&stored.event_type)
            .ok_or_else(|| DomainError::UnknownEventType {
                aggregate_id: stored.aggregate_id,
                event_type: stored.event_type.clone(),
            })?;
        self.codec.decode(stored, fields)
    }

    async fn usable_snapshot(&self, aggregate_id: Uuid, as_of: Option<DateTime<Utc>>) -> Option<A> {
        let snapshot = match self.snapshots.latest(aggregate_id).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return None,
            Err(e) => {
                // Unlike a missing snapshot, an unreachable store is an outage.
                error!(%aggregate_id, error = %e, "snapshot store unavailable, replaying from start");
                return None;
            }
        };
        if snapshot.aggregate_type != A::AGGREGATE_TYPE {
            warn!(
                %aggregate_id,
                found = %snapshot.aggregate_type,
                expected = A::AGGREGATE_TYPE,
                "snapshot belongs to another aggregate type"
            );
            return None;
        }
        if let Some(as_of) = as_of {
            if snapshot.last_event_at > as_of {
                debug!(%aggregate_id, version = snapshot.version, "snapshot newer than as_of, ignored");
                return None;
            }
        }
        match self.restore(&snapshot) {
            Ok(aggregate) => Some(aggregate),
            Err(e) => {
                warn!(%aggregate_id, version = snapshot.version, error = %e, "discarding unreadable snapshot");
                None
            }
        }
    }

    fn restore(&self, snapshot: &Snapshot) -> Result<A, DomainError> {
        let state = self.codec.open_state(snapshot.key_owner, &snapshot.state)?;
        let aggregate: A = serde_json::from_value(state).map_err(|e| {
            DomainError::Infrastructure(format!("snapshot state does not match aggregate: {e}"))
        })?;
        if aggregate.aggregate_id() != snapshot.aggregate_id || aggregate.version() != snapshot.version
        {
            return Err(DomainError::Infrastructure(
                "snapshot state disagrees with its header".into(),
            ));
        }
        Ok(aggregate)
    }
}
