//! In-process event bus driving projection catch-up.
//!
//! Each handler gets its own worker that catches up from the log whenever
//! it is woken, and on a poll interval otherwise. Publishing only wakes the
//! workers, so a slow or stuck handler never holds up the write path or
//! the other handlers. A worker whose handler fails backs off and retries
//! from its checkpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use budget_core::error::DomainError;
use budget_core::publisher::EventPublisher;
use budget_core::repository::StoredEvent;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::dispatcher::ProjectionDispatcher;

/// Timing of the projection workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    /// How often an idle worker checks the log without being woken.
    pub poll_interval: Duration,
    /// Delay before the first retry of a failed handler; doubles per failure.
    pub retry_backoff: Duration,
    /// Upper bound on the retry delay.
    pub max_backoff: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            retry_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl BusConfig {
    fn backoff(&self, failures: u32) -> Duration {
        let doublings = failures.saturating_sub(1).min(16);
        self.retry_backoff
            .saturating_mul(1 << doublings)
            .min(self.max_backoff)
    }
}

/// Publisher that wakes the projection workers.
#[derive(Debug, Clone)]
pub struct BusPublisher {
    wakeups: Vec<Arc<Notify>>,
}

impl BusPublisher {
    /// Spawns one worker per registered handler and returns the publisher
    /// plus the handle that stops them.
    #[must_use]
    pub fn spawn(dispatcher: Arc<ProjectionDispatcher>, config: BusConfig) -> (Self, BusHandle) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut wakeups = Vec::with_capacity(dispatcher.len());
        let mut workers = Vec::with_capacity(dispatcher.len());
        for index in 0..dispatcher.len() {
            let wakeup = Arc::new(Notify::new());
            let worker = ProjectionWorker {
                index,
                dispatcher: Arc::clone(&dispatcher),
                wakeup: Arc::clone(&wakeup),
                shutdown: shutdown_rx.clone(),
                config,
            };
            wakeups.push(wakeup);
            workers.push(tokio::spawn(worker.run()));
        }
        info!(
            workers = workers.len(),
            poll_interval_ms = u64::try_from(config.poll_interval.as_millis()).unwrap_or(u64::MAX),
            "projection bus started"
        );
        (
            Self { wakeups },
            BusHandle {
                shutdown: shutdown_tx,
                workers,
            },
        )
    }
}

#[async_trait]
impl EventPublisher for BusPublisher {
    async fn publish(&self, events: &[StoredEvent]) -> Result<(), DomainError> {
        if events.is_empty() {
            return Ok(());
        }
        // A permit is stored if the worker is busy, so no wakeup is lost.
        for wakeup in &self.wakeups {
            wakeup.notify_one();
        }
        Ok(())
    }
}

/// Stops the projection workers.
#[derive(Debug)]
pub struct BusHandle {
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl BusHandle {
    /// Number of running workers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Returns `true` if no worker was spawned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Signals every worker to stop and waits for them. A worker in the
    /// middle of a catch-up finishes it first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(error = %e, "projection worker panicked");
            }
        }
        info!("projection bus stopped");
    }
}

/// Catch-up loop for one handler.
struct ProjectionWorker {
    index: usize,
    dispatcher: Arc<ProjectionDispatcher>,
    wakeup: Arc<Notify>,
    shutdown: watch::Receiver<bool>,
    config: BusConfig,
}

impl ProjectionWorker {
    async fn run(mut self) {
        let handler = self.dispatcher.handler_name(self.index).unwrap_or("unknown");
        let mut failures = 0u32;
        let mut applied = 0usize;
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            let progress = self.dispatcher.catch_up_handler(self.index).await;
            applied += progress.applied;
            let delay = if progress.is_clean() {
                failures = 0;
                self.config.poll_interval
            } else {
                failures = failures.saturating_add(1);
                let delay = self.config.backoff(failures);
                warn!(
                    handler,
                    failures,
                    position = progress.position,
                    retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "projection behind, retrying"
                );
                delay
            };

            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                () = self.wakeup.notified(), if failures == 0 => {}
                () = tokio::time::sleep(delay) => {}
            }
        }
        debug!(handler, applied, "projection worker stopped");
    }
}

/// Publisher that catches every handler up before returning.
#[derive(Debug, Clone)]
pub struct InlinePublisher {
    dispatcher: Arc<ProjectionDispatcher>,
}

impl InlinePublisher {
    /// Creates a publisher over a dispatcher.
    #[must_use]
    pub fn new(dispatcher: Arc<ProjectionDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl EventPublisher for InlinePublisher {
    async fn publish(&self, _events: &[StoredEvent]) -> Result<(), DomainError> {
        // Handler failures are logged by the dispatcher and retried on the
        // next publish.
        self.dispatcher.catch_up().await;
        Ok(())
    }
}
