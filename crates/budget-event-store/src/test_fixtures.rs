//! Small aggregate used to exercise the engine and repository in tests.

use std::sync::Arc;

use budget_core::aggregate::{AggregateRoot, PendingEvents};
use budget_core::clock::Clock;
use budget_core::error::DomainError;
use budget_core::event::{DomainEvent, EventKind};
use budget_core::registry::{EventSchema, EventTypeRegistry};
use budget_core::repository::{EMPTY_STREAM_VERSION, EventLog, StoredEvent};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cipher::{DataKey, DerivedKeyProvider};
use crate::codec::EventCodec;

pub(crate) fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
}

pub(crate) fn time_of(version: i64) -> DateTime<Utc> {
    base_time() + Duration::minutes(version)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TallyOpened {
    pub user_id: Uuid,
    pub label: String,
}

impl EventSchema for TallyOpened {
    const EVENT_TYPE: &'static str = "tally.opened";
    const ENCRYPTED_FIELDS: &'static [&'static str] = &["label"];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TallyAdded {
    pub user_id: Uuid,
    pub amount: i64,
}

impl EventSchema for TallyAdded {
    const EVENT_TYPE: &'static str = "tally.added";
    const ENCRYPTED_FIELDS: &'static [&'static str] = &["amount"];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TallyClosed {}

impl EventSchema for TallyClosed {
    const EVENT_TYPE: &'static str = "tally.closed";
}

#[derive(Debug, Clone)]
pub(crate) enum TallyKind {
    Opened(TallyOpened),
    Added(TallyAdded),
    Closed(TallyClosed),
}

impl TallyKind {
    pub(crate) fn added(user_id: Uuid, amount: i64) -> Self {
        Self::Added(TallyAdded { user_id, amount })
    }

    pub(crate) fn closed() -> Self {
        Self::Closed(TallyClosed {})
    }
}

impl EventKind for TallyKind {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Opened(_) => TallyOpened::EVENT_TYPE,
            Self::Added(_) => TallyAdded::EVENT_TYPE,
            Self::Closed(_) => TallyClosed::EVENT_TYPE,
        }
    }

    fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Self::Opened(p) => serde_json::to_value(p),
            Self::Added(p) => serde_json::to_value(p),
            Self::Closed(p) => serde_json::to_value(p),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Tally {
    pub id: Uuid,
    pub version: i64,
    pub owner: Uuid,
    pub label: String,
    pub total: i64,
    pub history: Vec<i64>,
    pub closed: bool,
    #[serde(skip)]
    pending: PendingEvents<TallyKind>,
}

impl Tally {
    pub(crate) fn open(&mut self, owner: Uuid, label: &str, clock: &dyn Clock) {
        self.raise(
            TallyKind::Opened(TallyOpened {
                user_id: owner,
                label: label.to_owned(),
            }),
            Uuid::new_v4(),
            clock,
        );
    }

    pub(crate) fn add(&mut self, user_id: Uuid, amount: i64, clock: &dyn Clock) -> Result<(), DomainError> {
        if self.closed {
            return Err(DomainError::AggregateDeleted(self.id));
        }
        if user_id != self.owner {
            return Err(DomainError::NotOwner {
                aggregate_id: self.id,
                user_id,
            });
        }
        self.raise(TallyKind::added(user_id, amount), Uuid::new_v4(), clock);
        Ok(())
    }
}

impl AggregateRoot for Tally {
    type Event = TallyKind;

    const AGGREGATE_TYPE: &'static str = "tally";

    fn empty(id: Uuid) -> Self {
        Self {
            id,
            version: EMPTY_STREAM_VERSION,
            owner: Uuid::nil(),
            label: String::new(),
            total: 0,
            history: Vec::new(),
            closed: false,
            pending: PendingEvents::default(),
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &DomainEvent<Self::Event>) {
        match &event.kind {
            TallyKind::Opened(p) => {
                self.owner = p.user_id;
                self.label.clone_from(&p.label);
            }
            TallyKind::Added(p) => {
                self.total += p.amount;
                self.history.push(p.amount);
            }
            TallyKind::Closed(_) => self.closed = true,
        }
        self.version = event.metadata.stream_version;
    }

    fn pending_events(&self) -> &PendingEvents<Self::Event> {
        &self.pending
    }

    fn pending_events_mut(&mut self) -> &mut PendingEvents<Self::Event> {
        &mut self.pending
    }

    fn key_owner(&self) -> Uuid {
        self.owner
    }
}

pub(crate) fn registry() -> EventTypeRegistry<TallyKind> {
    EventTypeRegistry::builder()
        .register(TallyKind::Opened)
        .register(TallyKind::Added)
        .register(TallyKind::Closed)
        .build()
        .unwrap()
}

pub(crate) fn codec() -> EventCodec {
    EventCodec::new(Arc::new(DerivedKeyProvider::new(DataKey::from_bytes([9; 32]))))
}

/// Clock that reports `time_of(n)` on its n-th call (0-based).
#[derive(Debug, Default)]
pub(crate) struct TickingClock {
    calls: std::sync::Mutex<i64>,
}

impl Clock for TickingClock {
    fn now(&self) -> DateTime<Utc> {
        let mut calls = self.calls.lock().unwrap();
        let now = time_of(*calls);
        *calls += 1;
        now
    }
}

/// Builds one encrypted stored event at `version`, timestamped `time_of(version)`.
pub(crate) fn stored_tally_event(
    codec: &EventCodec,
    aggregate_id: Uuid,
    owner: Uuid,
    version: i64,
    kind: TallyKind,
) -> StoredEvent {
    let plain = DomainEvent {
        metadata: budget_core::event::EventMetadata {
            event_id: Uuid::new_v4(),
            event_type: kind.event_type().to_owned(),
            aggregate_id,
            stream_version: version,
            correlation_id: Uuid::new_v4(),
            causation_id: Uuid::new_v4(),
            occurred_at: time_of(version),
        },
        kind,
    }
    .to_stored()
    .unwrap();
    let fields = registry().encrypted_fields(&plain.event_type).unwrap();
    codec.encode(&plain, fields).unwrap()
}

/// Writes an `Opened` event followed by `adds` events adding 1, 2, ... `adds`.
/// Returns `(aggregate_id, owner)`; the stream ends at version `adds`.
pub(crate) async fn seed_tally(log: &dyn EventLog, codec: &EventCodec, adds: i64) -> (Uuid, Uuid) {
    let id = Uuid::new_v4();
    let owner = Uuid::new_v4();
    let mut events = vec![stored_tally_event(
        codec,
        id,
        owner,
        0,
        TallyKind::Opened(TallyOpened {
            user_id: owner,
            label: "groceries".to_owned(),
        }),
    )];
    for n in 1..=adds {
        events.push(stored_tally_event(codec, id, owner, n, TallyKind::added(owner, n)));
    }
    log.append(id, -1, &events).await.unwrap();
    (id, owner)
}

/// Publisher that remembers every batch it was handed.
#[derive(Debug, Default)]
pub(crate) struct RecordingPublisher {
    pub batches: std::sync::Mutex<Vec<Vec<StoredEvent>>>,
}

#[async_trait::async_trait]
impl budget_core::publisher::EventPublisher for RecordingPublisher {
    async fn publish(&self, events: &[StoredEvent]) -> Result<(), DomainError> {
        self.batches.lock().unwrap().push(events.to_vec());
        Ok(())
    }
}

/// Publisher whose bus is always down.
#[derive(Debug, Default)]
pub(crate) struct FailingPublisher;

#[async_trait::async_trait]
impl budget_core::publisher::EventPublisher for FailingPublisher {
    async fn publish(&self, _events: &[StoredEvent]) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("bus unavailable".into()))
    }
}
