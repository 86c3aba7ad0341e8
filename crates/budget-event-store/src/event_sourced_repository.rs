//! Event-sourced repository.
//!
//! The only component command handlers talk to. `get` reconstitutes an
//! aggregate; `save` appends its pending events under optimistic
//! concurrency, then snapshots and publishes.

use std::fmt;
use std::sync::Arc;

use budget_core::aggregate::AggregateRoot;
use budget_core::clock::Clock;
use budget_core::error::DomainError;
use budget_core::publisher::EventPublisher;
use budget_core::registry::EventTypeRegistry;
use budget_core::repository::{EMPTY_STREAM_VERSION, EventLog, StoredEvent};
use budget_core::snapshot::{Snapshot, SnapshotStore};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use crate::codec::EventCodec;
use crate::reconstitution::Reconstitutor;

/// When the repository writes a snapshot after a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotPolicy {
    /// Never snapshot.
    #[default]
    Never,
    /// Snapshot whenever a save crosses a multiple of `n` events.
    Every(u32),
}

impl SnapshotPolicy {
    /// Builds a policy from a configured interval; `0` disables snapshots.
    #[must_use]
    pub fn from_interval(interval: u32) -> Self {
        if interval == 0 {
            Self::Never
        } else {
            Self::Every(interval)
        }
    }

    /// Returns `true` if a stream growing from `previous` to `current`
    /// (versions, `-1` for empty) crossed a snapshot boundary.
    #[must_use]
    pub fn is_due(self, previous: i64, current: i64) -> bool {
        match self {
            Self::Never => false,
            Self::Every(n) => {
                let n = i64::from(n);
                (current + 1) / n > (previous + 1) / n
            }
        }
    }
}

/// Stores and collaborators shared by every repository in a process.
#[derive(Clone)]
pub struct EventStoreContext {
    /// Append-only event log.
    pub log: Arc<dyn EventLog>,
    /// Latest-snapshot store.
    pub snapshots: Arc<dyn SnapshotStore>,
    /// Field encryption.
    pub codec: EventCodec,
    /// Receives events once they are durable.
    pub publisher: Arc<dyn EventPublisher>,
    /// Timestamps snapshots.
    pub clock: Arc<dyn Clock>,
    /// Snapshot frequency.
    pub snapshot_policy: SnapshotPolicy,
}

impl fmt::Debug for EventStoreContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStoreContext")
            .field("snapshot_policy", &self.snapshot_policy)
            .finish_non_exhaustive()
    }
}

/// Repository for one aggregate type.
pub struct EventSourcedRepository<A: AggregateRoot> {
    context: EventStoreContext,
    registry: Arc<EventTypeRegistry<A::Event>>,
}

impl<A: AggregateRoot> Clone for EventSourcedRepository<A> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<A: AggregateRoot> fmt::Debug for EventSourcedRepository<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSourcedRepository")
            .field("aggregate_type", &A::AGGREGATE_TYPE)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl<A> EventSourcedRepository<A>
where
    A: AggregateRoot + Serialize + DeserializeOwned,
{
    /// Creates a repository for `A` over a shared context.
    #[must_use]
    pub fn new(context: EventStoreContext, registry: Arc<EventTypeRegistry<A::Event>>) -> Self {
        Self { context, registry }
    }

    fn engine(&self) -> Reconstitutor<'_, A> {
        Reconstitutor::new(
            self.context.log.as_ref(),
            self.context.snapshots.as_ref(),
            &self.context.codec,
            &self.registry,
        )
    }

    /// Reconstitutes the aggregate, which may not exist (version `-1`).
    ///
    /// # Errors
    ///
    /// Propagates reconstitution errors unchanged.
    pub async fn load(
        &self,
        aggregate_id: Uuid,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<A, DomainError> {
        self.engine().reconstitute(aggregate_id, as_of).await
    }

    /// Reconstitutes an aggregate that must exist.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` if the stream is empty, or
    /// entirely after `as_of`, and propagates reconstitution errors.
    #[instrument(skip(self), fields(aggregate_type = A::AGGREGATE_TYPE))]
    pub async fn get(
        &self,
        aggregate_id: Uuid,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<A, DomainError> {
        let aggregate = self.load(aggregate_id, as_of).await?;
        if aggregate.version() <= EMPTY_STREAM_VERSION {
            return Err(DomainError::AggregateNotFound(aggregate_id));
        }
        Ok(aggregate)
    }

    /// Appends the aggregate's pending events and returns them in plaintext.
    ///
    /// The expected version is the version the aggregate had when loaded.
    /// The pending buffer is cleared only once the append committed; after
    /// that a snapshot may be written and the publisher is signalled. Neither
    /// of those can fail the save: projections read the log from their own
    /// checkpoints, so a missed signal only delays them.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` if another writer appended
    /// first, in which case nothing was written; propagates encoding and
    /// storage errors.
    #[instrument(skip(self, aggregate), fields(aggregate_type = A::AGGREGATE_TYPE, aggregate_id = %aggregate.aggregate_id()))]
    pub async fn save(&self, aggregate: &mut A) -> Result<Vec<StoredEvent>, DomainError> {
        if aggregate.pending_events().is_empty() {
            return Ok(Vec::new());
        }
        let aggregate_id = aggregate.aggregate_id();
        let expected_version = aggregate.persisted_version();

        let plain = aggregate
            .pending_events()
            .as_slice()
            .iter()
            .map(budget_core::event::DomainEvent::to_stored)
            .collect::<Result<Vec<_>, _>>()?;
        let encoded = plain
            .iter()
            .map(|event| self.encode(event))
            .collect::<Result<Vec<_>, _>>()?;

        self.context
            .log
            .append(aggregate_id, expected_version, &encoded)
            .await?;
        aggregate.drain_pending_events();
        debug!(
            expected_version,
            version = aggregate.version(),
            count = plain.len(),
            "aggregate saved"
        );

        if self
            .context
            .snapshot_policy
            .is_due(expected_version, aggregate.version())
        {
            if let Some(last) = plain.last() {
                self.write_snapshot(aggregate, last.occurred_at).await;
            }
        }

        if let Err(e) = self.context.publisher.publish(&plain).await {
            error!(error = %e, "publishing appended events failed, projections will catch up from the log");
        }
        Ok(plain)
    }

    /// Writes a snapshot of `aggregate` as it stands. Failures are logged.
    pub async fn write_snapshot(&self, aggregate: &A, last_event_at: DateTime<Utc>) {
        let snapshot = match self.build_snapshot(aggregate, last_event_at) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(aggregate_id = %aggregate.aggregate_id(), error = %e, "snapshot not taken");
                return;
            }
        };
        let version = snapshot.version;
        match self.context.snapshots.save(snapshot).await {
            Ok(()) => debug!(aggregate_id = %aggregate.aggregate_id(), version, "snapshot taken"),
            Err(e) => {
                warn!(aggregate_id = %aggregate.aggregate_id(), version, error = %e, "snapshot write failed");
            }
        }
    }

    /// Returns the decoded history of an aggregate, up to `until` if given.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownEventType` or `DomainError::CorruptedEvent`
    /// for undecodable events and propagates event log failures.
    pub async fn history(
        &self,
        aggregate_id: Uuid,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let engine = self.engine();
        let mut events = self
            .context
            .log
            .read_from(aggregate_id, EMPTY_STREAM_VERSION, until);
        let mut decoded = Vec::new();
        while let Some(stored) = events.try_next().await? {
            decoded.push(engine.decode(&stored)?);
        }
        Ok(decoded)
    }

    fn encode(&self, event: &StoredEvent) -> Result<StoredEvent, DomainError> {
        let fields = self
            .registry
            .encrypted_fields(&event.event_type)
            .ok_or_else(|| DomainError::UnknownEventType {
                aggregate_id: event.aggregate_id,
                event_type: event.event_type.clone(),
            })?;
        self.context.codec.encode(event, fields)
    }

    fn build_snapshot(
        &self,
        aggregate: &A,
        last_event_at: DateTime<Utc>,
    ) -> Result<Snapshot, DomainError> {
        let state = serde_json::to_value(aggregate).map_err(|e| {
            DomainError::Infrastructure(format!("snapshot serialization failed: {e}"))
        })?;
        let key_owner = aggregate.key_owner();
        Ok(Snapshot {
            aggregate_id: aggregate.aggregate_id(),
            aggregate_type: A::AGGREGATE_TYPE.to_owned(),
            version: aggregate.version(),
            last_event_at,
            key_owner,
            state: self.context.codec.seal_state(key_owner, &state)?,
            taken_at: self.context.clock.now(),
        })
    }
}
