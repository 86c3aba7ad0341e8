//! Integration tests for `PgEventLog`, `PgSnapshotStore` and `PgCheckpointStore`.
//!
//! Run with a database: `DATABASE_URL=... cargo test -- --ignored`.

use budget_core::error::DomainError;
use budget_core::projection::CheckpointStore;
use budget_core::repository::{EventLog, LOG_START, StoredEvent};
use budget_core::snapshot::{Snapshot, SnapshotStore};
use budget_event_store::pg_checkpoint_store::PgCheckpointStore;
use budget_event_store::pg_event_log::PgEventLog;
use budget_event_store::pg_snapshot_store::PgSnapshotStore;
use chrono::{DateTime, Duration, TimeZone, Utc};
use futures::TryStreamExt;
use sqlx::PgPool;
use uuid::Uuid;

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
}

/// Helper to build a `StoredEvent` with sensible defaults.
fn make_stored_event(aggregate_id: Uuid, stream_version: i64) -> StoredEvent {
    StoredEvent {
        event_id: Uuid::new_v4(),
        aggregate_id,
        event_type: "test.happened".to_string(),
        payload: serde_json::json!({"key": "value"}),
        stream_version,
        correlation_id: Uuid::new_v4(),
        causation_id: Uuid::new_v4(),
        occurred_at: base_time() + Duration::minutes(stream_version),
    }
}

fn batch(aggregate_id: Uuid, versions: std::ops::RangeInclusive<i64>) -> Vec<StoredEvent> {
    versions.map(|v| make_stored_event(aggregate_id, v)).collect()
}

async fn read_stream(
    log: &PgEventLog,
    aggregate_id: Uuid,
    from: i64,
    until: Option<DateTime<Utc>>,
) -> Vec<StoredEvent> {
    log.read_from(aggregate_id, from, until)
        .try_collect()
        .await
        .unwrap()
}

// --- read_from ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_read_from_returns_nothing_for_nonexistent_aggregate(pool: PgPool) {
    let log = PgEventLog::new(pool);
    let aggregate_id = Uuid::new_v4();

    let events = read_stream(&log, aggregate_id, -1, None).await;

    assert!(events.is_empty());
    assert_eq!(log.current_version(aggregate_id).await.unwrap(), -1);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_append_and_read_single_event(pool: PgPool) {
    // Arrange
    let log = PgEventLog::new(pool);
    let aggregate_id = Uuid::new_v4();
    let event = make_stored_event(aggregate_id, 0);
    let expected = event.clone();

    // Act
    log.append(aggregate_id, -1, &[event]).await.unwrap();

    // Assert
    let loaded = read_stream(&log, aggregate_id, -1, None).await;
    assert_eq!(loaded, vec![expected]);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_read_from_is_ordered_and_exclusive(pool: PgPool) {
    let log = PgEventLog::new(pool);
    let aggregate_id = Uuid::new_v4();
    log.append(aggregate_id, -1, &batch(aggregate_id, 0..=5))
        .await
        .unwrap();

    let tail = read_stream(&log, aggregate_id, 2, None).await;

    let versions: Vec<i64> = tail.iter().map(|e| e.stream_version).collect();
    assert_eq!(versions, vec![3, 4, 5]);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_read_until_stops_at_first_later_event(pool: PgPool) {
    // Arrange
    let log = PgEventLog::new(pool);
    let aggregate_id = Uuid::new_v4();
    let mut events = batch(aggregate_id, 0..=4);
    // A clock step backwards must not let version 4 slip past the cutoff
    // while version 3 is excluded.
    events[4].occurred_at = base_time();
    log.append(aggregate_id, -1, &events).await.unwrap();

    // Act
    let until = base_time() + Duration::minutes(2) + Duration::seconds(30);
    let loaded = read_stream(&log, aggregate_id, -1, Some(until)).await;

    // Assert
    let versions: Vec<i64> = loaded.iter().map(|e| e.stream_version).collect();
    assert_eq!(versions, vec![0, 1, 2]);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_aggregate_isolation(pool: PgPool) {
    let log = PgEventLog::new(pool);
    let agg_a = Uuid::new_v4();
    let agg_b = Uuid::new_v4();

    log.append(agg_a, -1, &batch(agg_a, 0..=0)).await.unwrap();
    log.append(agg_b, -1, &batch(agg_b, 0..=1)).await.unwrap();

    assert_eq!(read_stream(&log, agg_a, -1, None).await.len(), 1);
    assert_eq!(read_stream(&log, agg_b, -1, None).await.len(), 2);
}

// --- concurrency ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_stale_expected_version_conflicts_and_writes_nothing(pool: PgPool) {
    // Arrange
    let log = PgEventLog::new(pool);
    let aggregate_id = Uuid::new_v4();
    log.append(aggregate_id, -1, &batch(aggregate_id, 0..=1))
        .await
        .unwrap();

    // Act
    let result = log.append(aggregate_id, -1, &batch(aggregate_id, 0..=3)).await;

    // Assert
    match result {
        Err(DomainError::ConcurrencyConflict {
            aggregate_id: conflict_agg_id,
            expected,
            actual,
        }) => {
            assert_eq!(conflict_agg_id, aggregate_id);
            assert_eq!(expected, -1);
            assert_eq!(actual, 1);
        }
        other => panic!("expected ConcurrencyConflict, got {other:?}"),
    }
    assert_eq!(read_stream(&log, aggregate_id, -1, None).await.len(), 2);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_racing_writers_exactly_one_wins(pool: PgPool) {
    let log = PgEventLog::new(pool);
    let aggregate_id = Uuid::new_v4();
    log.append(aggregate_id, -1, &batch(aggregate_id, 0..=4))
        .await
        .unwrap();

    let first = batch(aggregate_id, 5..=5);
    let second = batch(aggregate_id, 5..=6);
    let (a, b) = tokio::join!(
        log.append(aggregate_id, 4, &first),
        log.append(aggregate_id, 4, &second)
    );

    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(loser, Err(DomainError::ConcurrencyConflict { .. })));
    let version = log.current_version(aggregate_id).await.unwrap();
    assert!(version == 5 || version == 6);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_sequential_appends_with_correct_expected_version(pool: PgPool) {
    let log = PgEventLog::new(pool);
    let aggregate_id = Uuid::new_v4();

    log.append(aggregate_id, -1, &batch(aggregate_id, 0..=1))
        .await
        .unwrap();
    log.append(aggregate_id, 1, &batch(aggregate_id, 2..=3))
        .await
        .unwrap();

    let loaded = read_stream(&log, aggregate_id, -1, None).await;
    assert_eq!(loaded.len(), 4);
    for (i, event) in loaded.iter().enumerate() {
        assert_eq!(event.stream_version, i64::try_from(i).unwrap());
    }
}

// --- global order ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_read_all_pages_across_streams_in_commit_order(pool: PgPool) {
    // Arrange
    let log = PgEventLog::new(pool);
    let agg_a = Uuid::new_v4();
    let agg_b = Uuid::new_v4();
    log.append(agg_a, -1, &batch(agg_a, 0..=1)).await.unwrap();
    log.append(agg_b, -1, &batch(agg_b, 0..=0)).await.unwrap();
    log.append(agg_a, 1, &batch(agg_a, 2..=2)).await.unwrap();

    // Act
    let first_page = log.read_all(LOG_START, 2).await.unwrap();
    let second_page = log
        .read_all(first_page[1].position, 10)
        .await
        .unwrap();

    // Assert
    let order: Vec<(Uuid, i64)> = first_page
        .iter()
        .chain(second_page.iter())
        .map(|l| (l.event.aggregate_id, l.event.stream_version))
        .collect();
    assert_eq!(order, vec![(agg_a, 0), (agg_a, 1), (agg_b, 0), (agg_a, 2)]);
    let positions: Vec<i64> = first_page
        .iter()
        .chain(second_page.iter())
        .map(|l| l.position)
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(
        log.head_position().await.unwrap(),
        second_page.last().unwrap().position
    );
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_head_position_of_empty_log_is_start(pool: PgPool) {
    let log = PgEventLog::new(pool);

    assert_eq!(log.head_position().await.unwrap(), LOG_START);
    assert!(log.read_all(LOG_START, 10).await.unwrap().is_empty());
}

// --- checkpoints ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_checkpoint_store_upserts_per_projection(pool: PgPool) {
    let store = PgCheckpointStore::new(pool);

    assert_eq!(store.load("user_summary").await.unwrap(), None);
    store.save("user_summary", 3).await.unwrap();
    store.save("user_summary", 7).await.unwrap();
    store.save("budget_plan_summary", 1).await.unwrap();

    assert_eq!(store.load("user_summary").await.unwrap(), Some(7));
    assert_eq!(store.load("budget_plan_summary").await.unwrap(), Some(1));
}

// --- edge cases ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_append_empty_events_is_noop(pool: PgPool) {
    let log = PgEventLog::new(pool);
    let aggregate_id = Uuid::new_v4();

    log.append(aggregate_id, -1, &[]).await.unwrap();

    assert_eq!(log.current_version(aggregate_id).await.unwrap(), -1);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_timestamp_precision(pool: PgPool) {
    let log = PgEventLog::new(pool);
    let aggregate_id = Uuid::new_v4();
    let mut event = make_stored_event(aggregate_id, 0);
    event.occurred_at = Utc::now();
    let original_timestamp = event.occurred_at;

    log.append(aggregate_id, -1, &[event]).await.unwrap();

    // PostgreSQL TIMESTAMPTZ has microsecond precision.
    let loaded = read_stream(&log, aggregate_id, -1, None).await;
    assert_eq!(
        original_timestamp.timestamp_micros(),
        loaded[0].occurred_at.timestamp_micros()
    );
}

// --- snapshots ---

fn snapshot(aggregate_id: Uuid, version: i64) -> Snapshot {
    Snapshot {
        aggregate_id,
        aggregate_type: "test".to_owned(),
        version,
        last_event_at: base_time(),
        key_owner: aggregate_id,
        state: serde_json::json!("enc:00"),
        taken_at: base_time(),
    }
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_snapshot_store_keeps_newest(pool: PgPool) {
    let store = PgSnapshotStore::new(pool);
    let aggregate_id = Uuid::new_v4();

    store.save(snapshot(aggregate_id, 40)).await.unwrap();
    store.save(snapshot(aggregate_id, 20)).await.unwrap();

    let latest = store.latest(aggregate_id).await.unwrap().unwrap();
    assert_eq!(latest.version, 40);
    assert_eq!(latest.state, serde_json::json!("enc:00"));
    assert!(store.latest(Uuid::new_v4()).await.unwrap().is_none());
}
