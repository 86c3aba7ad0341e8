//! Test event logs — `EventLog` implementations that fail on purpose.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use budget_core::error::DomainError;
use budget_core::repository::{EventLog, EventStream, LoggedEvent, StoredEvent};
use budget_event_store::memory::InMemoryEventLog;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use uuid::Uuid;

fn refused() -> DomainError {
    DomainError::Infrastructure("connection refused".into())
}

/// An event log that always returns an infrastructure error. Useful for
/// testing error-handling paths.
#[derive(Debug)]
pub struct FailingEventLog;

#[async_trait]
impl EventLog for FailingEventLog {
    async fn append(
        &self,
        _aggregate_id: Uuid,
        _expected_version: i64,
        _events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        Err(refused())
    }

    fn read_from(
        &self,
        _aggregate_id: Uuid,
        _from_version_exclusive: i64,
        _until: Option<DateTime<Utc>>,
    ) -> EventStream<'_> {
        stream::once(async { Err(refused()) }).boxed()
    }

    async fn current_version(&self, _aggregate_id: Uuid) -> Result<i64, DomainError> {
        Err(refused())
    }

    async fn read_all(
        &self,
        _after_position: i64,
        _limit: usize,
    ) -> Result<Vec<LoggedEvent>, DomainError> {
        Err(refused())
    }

    async fn head_position(&self) -> Result<i64, DomainError> {
        Err(refused())
    }
}

/// An in-memory event log whose appends fail for selected aggregates.
/// Everything else behaves like `InMemoryEventLog`.
#[derive(Debug, Default)]
pub struct FaultyEventLog {
    inner: InMemoryEventLog,
    failing: Mutex<HashSet<Uuid>>,
}

impl FaultyEventLog {
    /// Creates a log that does not fail yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later append to `aggregate_id` fail.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_appends_for(&self, aggregate_id: Uuid) {
        self.failing.lock().unwrap().insert(aggregate_id);
    }

    /// The wrapped log, for inspecting raw streams.
    #[must_use]
    pub fn inner(&self) -> &InMemoryEventLog {
        &self.inner
    }
}

#[async_trait]
impl EventLog for FaultyEventLog {
    async fn append(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        if self.failing.lock().unwrap().contains(&aggregate_id) {
            return Err(refused());
        }
        self.inner.append(aggregate_id, expected_version, events).await
    }

    fn read_from(
        &self,
        aggregate_id: Uuid,
        from_version_exclusive: i64,
        until: Option<DateTime<Utc>>,
    ) -> EventStream<'_> {
        self.inner.read_from(aggregate_id, from_version_exclusive, until)
    }

    async fn current_version(&self, aggregate_id: Uuid) -> Result<i64, DomainError> {
        self.inner.current_version(aggregate_id).await
    }

    async fn read_all(
        &self,
        after_position: i64,
        limit: usize,
    ) -> Result<Vec<LoggedEvent>, DomainError> {
        self.inner.read_all(after_position, limit).await
    }

    async fn head_position(&self) -> Result<i64, DomainError> {
        self.inner.head_position().await
    }
}
