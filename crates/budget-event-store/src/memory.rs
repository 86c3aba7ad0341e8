//! In-memory event log and snapshot store.
//!
//! Same contracts as the PostgreSQL implementations; used by tests and
//! local development.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use budget_core::error::DomainError;
use budget_core::repository::{
    EMPTY_STREAM_VERSION, EventLog, EventStream, LOG_START, LoggedEvent, StoredEvent,
    check_contiguous,
};
use budget_core::snapshot::{Snapshot, SnapshotStore};
use chrono::{DateTime, Utc};
use futures::future;
use futures::stream::{self, StreamExt};
use uuid::Uuid;

fn poisoned() -> DomainError {
    DomainError::Infrastructure("event log lock poisoned".into())
}

/// Every event in commit order; the position of `events[i]` is `i + 1`.
/// Each stream maps its versions to indices into `events`.
#[derive(Debug, Default)]
struct LogState {
    events: Vec<StoredEvent>,
    streams: HashMap<Uuid, Vec<usize>>,
}

/// Event log holding every event in one append-only vector guarded by a
/// read/write lock.
#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    state: RwLock<LogState>,
}

impl InMemoryEventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the raw (still encrypted) stream.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the lock is poisoned.
    pub fn stream(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state
            .streams
            .get(&aggregate_id)
            .map(|indices| indices.iter().map(|&i| state.events[i].clone()).collect())
            .unwrap_or_default())
    }

    /// Indices of the stream's events past `from_version_exclusive`. Versions
    /// are contiguous from 0, so version `v` sits at `indices[v]`.
    fn tail_indices(
        &self,
        aggregate_id: Uuid,
        from_version_exclusive: i64,
    ) -> Result<Vec<usize>, DomainError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        let Some(indices) = state.streams.get(&aggregate_id) else {
            return Ok(Vec::new());
        };
        let first = usize::try_from(from_version_exclusive + 1).unwrap_or(0);
        Ok(indices.get(first..).map(<[usize]>::to_vec).unwrap_or_default())
    }

    fn event_at(&self, index: usize) -> Result<StoredEvent, DomainError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        state
            .events
            .get(index)
            .cloned()
            .ok_or_else(|| DomainError::Infrastructure(format!("no event at index {index}")))
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn append(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        if events.is_empty() {
            return Ok(());
        }
        check_contiguous(aggregate_id, expected_version, events)?;

        let mut state = self.state.write().map_err(|_| poisoned())?;
        let LogState {
            events: all,
            streams,
        } = &mut *state;
        let stream = streams.entry(aggregate_id).or_default();
        let actual = stream
            .last()
            .map_or(EMPTY_STREAM_VERSION, |&i| all[i].stream_version);
        if actual != expected_version {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual,
            });
        }
        for event in events {
            stream.push(all.len());
            all.push(event.clone());
        }
        Ok(())
    }

    fn read_from(
        &self,
        aggregate_id: Uuid,
        from_version_exclusive: i64,
        until: Option<DateTime<Utc>>,
    ) -> EventStream<'_> {
        // The log only grows, so the index list stays valid while events are
        // cloned one at a time as the consumer pulls them.
        match self.tail_indices(aggregate_id, from_version_exclusive) {
            Ok(indices) => stream::iter(indices)
                .map(move |i| self.event_at(i))
                .take_while(move |event| {
                    future::ready(match (event, until) {
                        (Ok(event), Some(until)) => event.occurred_at <= until,
                        _ => true,
                    })
                })
                .boxed(),
            Err(e) => stream::once(async move { Err(e) }).boxed(),
        }
    }

    async fn current_version(&self, aggregate_id: Uuid) -> Result<i64, DomainError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state
            .streams
            .get(&aggregate_id)
            .and_then(|s| s.last())
            .map_or(EMPTY_STREAM_VERSION, |&i| state.events[i].stream_version))
    }

    async fn read_all(
        &self,
        after_position: i64,
        limit: usize,
    ) -> Result<Vec<LoggedEvent>, DomainError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        let first = usize::try_from(after_position.max(LOG_START)).unwrap_or(0);
        Ok(state
            .events
            .iter()
            .enumerate()
            .skip(first)
            .take(limit)
            .map(|(i, event)| LoggedEvent {
                position: i64::try_from(i + 1).unwrap_or(i64::MAX),
                event: event.clone(),
            })
            .collect())
    }

    async fn head_position(&self) -> Result<i64, DomainError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(i64::try_from(state.events.len()).unwrap_or(i64::MAX))
    }
}

/// Snapshot store keeping the newest snapshot per aggregate.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: RwLock<HashMap<Uuid, Snapshot>>,
}

impl InMemorySnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the snapshot of an aggregate, if any.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the lock is poisoned.
    pub fn evict(&self, aggregate_id: Uuid) -> Result<(), DomainError> {
        self.snapshots
            .write()
            .map_err(|_| poisoned())?
            .remove(&aggregate_id);
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn latest(&self, aggregate_id: Uuid) -> Result<Option<Snapshot>, DomainError> {
        let snapshots = self.snapshots.read().map_err(|_| poisoned())?;
        Ok(snapshots.get(&aggregate_id).cloned())
    }

    async fn save(&self, snapshot: Snapshot) -> Result<(), DomainError> {
        let mut snapshots = self.snapshots.write().map_err(|_| poisoned())?;
        let newer = snapshots
            .get(&snapshot.aggregate_id)
            .is_none_or(|existing| existing.version < snapshot.version);
        if newer {
            snapshots.insert(snapshot.aggregate_id, snapshot);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use futures::TryStreamExt;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
    }

    fn make_stored_event(aggregate_id: Uuid, stream_version: i64) -> StoredEvent {
        StoredEvent {
            event_id: Uuid::new_v4(),
            aggregate_id,
            event_type: "test.happened".to_owned(),
            payload: serde_json::json!({ "n": stream_version }),
            stream_version,
            correlation_id: Uuid::new_v4(),
            causation_id: Uuid::new_v4(),
            occurred_at: base_time() + Duration::minutes(stream_version),
        }
    }

    fn batch(aggregate_id: Uuid, versions: std::ops::RangeInclusive<i64>) -> Vec<StoredEvent> {
        versions.map(|v| make_stored_event(aggregate_id, v)).collect()
    }

    // --- append / read ---

    #[tokio::test]
    async fn test_read_from_empty_stream_yields_nothing() {
        let log = InMemoryEventLog::new();
        let id = Uuid::new_v4();

        let events: Vec<StoredEvent> = log.read_from(id, -1, None).try_collect().await.unwrap();

        assert!(events.is_empty());
        assert_eq!(log.current_version(id).await.unwrap(), -1);
    }

    #[tokio::test]
    async fn test_sequential_appends_with_correct_expected_version() {
        // Arrange
        let log = InMemoryEventLog::new();
        let id = Uuid::new_v4();

        // Act
        log.append(id, -1, &batch(id, 0..=1)).await.unwrap();
        log.append(id, 1, &batch(id, 2..=3)).await.unwrap();

        // Assert
        let loaded: Vec<StoredEvent> = log.read_from(id, -1, None).try_collect().await.unwrap();
        let versions: Vec<i64> = loaded.iter().map(|e| e.stream_version).collect();
        assert_eq!(versions, vec![0, 1, 2, 3]);
        assert_eq!(log.current_version(id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_read_from_is_exclusive_of_start_version() {
        let log = InMemoryEventLog::new();
        let id = Uuid::new_v4();
        log.append(id, -1, &batch(id, 0..=4)).await.unwrap();

        let tail: Vec<StoredEvent> = log.read_from(id, 2, None).try_collect().await.unwrap();

        let versions: Vec<i64> = tail.iter().map(|e| e.stream_version).collect();
        assert_eq!(versions, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_read_until_excludes_later_events() {
        let log = InMemoryEventLog::new();
        let id = Uuid::new_v4();
        log.append(id, -1, &batch(id, 0..=9)).await.unwrap();

        let until = base_time() + Duration::minutes(4) + Duration::seconds(30);
        let events: Vec<StoredEvent> = log
            .read_from(id, -1, Some(until))
            .try_collect()
            .await
            .unwrap();

        assert_eq!(events.len(), 5);
        assert!(events.iter().all(|e| e.occurred_at <= until));
    }

    // --- concurrency ---

    #[tokio::test]
    async fn test_stale_expected_version_conflicts_and_writes_nothing() {
        // Arrange
        let log = InMemoryEventLog::new();
        let id = Uuid::new_v4();
        log.append(id, -1, &batch(id, 0..=1)).await.unwrap();

        // Act
        let result = log.append(id, -1, &batch(id, 0..=2)).await;

        // Assert
        match result {
            Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            }) => {
                assert_eq!(aggregate_id, id);
                assert_eq!(expected, -1);
                assert_eq!(actual, 1);
            }
            other => panic!("expected ConcurrencyConflict, got {other:?}"),
        }
        assert_eq!(log.stream(id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_racing_writers_exactly_one_wins() {
        let log = std::sync::Arc::new(InMemoryEventLog::new());
        let id = Uuid::new_v4();
        log.append(id, -1, &batch(id, 0..=4)).await.unwrap();

        let first = {
            let log = log.clone();
            let events = batch(id, 5..=5);
            tokio::spawn(async move { log.append(id, 4, &events).await })
        };
        let second = {
            let log = log.clone();
            let events = batch(id, 5..=5);
            tokio::spawn(async move { log.append(id, 4, &events).await })
        };
        let results = [first.await.unwrap(), second.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(
            r,
            Err(DomainError::ConcurrencyConflict { .. })
        )));
        assert_eq!(log.stream(id).unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_non_contiguous_batch_is_rejected_atomically() {
        let log = InMemoryEventLog::new();
        let id = Uuid::new_v4();
        let mut events = batch(id, 0..=2);
        events[2].stream_version = 5;

        let result = log.append(id, -1, &events).await;

        assert!(matches!(result, Err(DomainError::Infrastructure(_))));
        assert!(log.stream(id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_empty_events_is_noop() {
        let log = InMemoryEventLog::new();
        let id = Uuid::new_v4();

        log.append(id, -1, &[]).await.unwrap();

        assert_eq!(log.current_version(id).await.unwrap(), -1);
    }

    #[tokio::test]
    async fn test_aggregate_isolation() {
        let log = InMemoryEventLog::new();
        let agg_a = Uuid::new_v4();
        let agg_b = Uuid::new_v4();

        log.append(agg_a, -1, &batch(agg_a, 0..=0)).await.unwrap();
        log.append(agg_b, -1, &batch(agg_b, 0..=1)).await.unwrap();

        assert_eq!(log.stream(agg_a).unwrap().len(), 1);
        assert_eq!(log.stream(agg_b).unwrap().len(), 2);
    }

    // --- global order ---

    #[tokio::test]
    async fn test_read_all_interleaves_streams_in_commit_order() {
        // Arrange
        let log = InMemoryEventLog::new();
        let agg_a = Uuid::new_v4();
        let agg_b = Uuid::new_v4();
        log.append(agg_a, -1, &batch(agg_a, 0..=1)).await.unwrap();
        log.append(agg_b, -1, &batch(agg_b, 0..=0)).await.unwrap();
        log.append(agg_a, 1, &batch(agg_a, 2..=2)).await.unwrap();

        // Act
        let all = log.read_all(LOG_START, 10).await.unwrap();
        let page = log.read_all(2, 1).await.unwrap();

        // Assert
        let order: Vec<(i64, Uuid, i64)> = all
            .iter()
            .map(|l| (l.position, l.event.aggregate_id, l.event.stream_version))
            .collect();
        assert_eq!(
            order,
            vec![(1, agg_a, 0), (2, agg_a, 1), (3, agg_b, 0), (4, agg_a, 2)]
        );
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].position, 3);
        assert_eq!(log.head_position().await.unwrap(), 4);
        assert!(log.read_all(4, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_append_takes_no_position() {
        let log = InMemoryEventLog::new();
        let id = Uuid::new_v4();
        log.append(id, -1, &batch(id, 0..=0)).await.unwrap();

        let _ = log.append(id, -1, &batch(id, 0..=0)).await;

        assert_eq!(log.head_position().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_read_from_yields_events_appended_before_the_call_only() {
        let log = InMemoryEventLog::new();
        let id = Uuid::new_v4();
        log.append(id, -1, &batch(id, 0..=1)).await.unwrap();

        let mut events = log.read_from(id, -1, None);
        let first = events.try_next().await.unwrap().unwrap();
        log.append(id, 1, &batch(id, 2..=2)).await.unwrap();
        let rest: Vec<StoredEvent> = events.try_collect().await.unwrap();

        assert_eq!(first.stream_version, 0);
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].stream_version, 1);
    }

    // --- snapshots ---

    fn snapshot(aggregate_id: Uuid, version: i64) -> Snapshot {
        Snapshot {
            aggregate_id,
            aggregate_type: "test".to_owned(),
            version,
            last_event_at: base_time(),
            key_owner: aggregate_id,
            state: serde_json::json!({ "version": version }),
            taken_at: base_time(),
        }
    }

    #[tokio::test]
    async fn test_snapshot_store_keeps_newest() {
        let store = InMemorySnapshotStore::new();
        let id = Uuid::new_v4();

        store.save(snapshot(id, 40)).await.unwrap();
        store.save(snapshot(id, 20)).await.unwrap();

        assert_eq!(store.latest(id).await.unwrap().unwrap().version, 40);
        store.evict(id).unwrap();
        assert!(store.latest(id).await.unwrap().is_none());
    }
}
