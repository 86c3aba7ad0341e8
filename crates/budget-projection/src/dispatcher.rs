//! Checkpointed delivery of the event log to projection handlers.
//!
//! Every handler is a subscription with its own position in the global
//! log. Catching up reads the log after that position, applies what the
//! handler is interested in and saves the new position. A handler that
//! fails stops where it is and sees the same event again on its next run;
//! the other handlers are not held back.

use std::fmt;
use std::sync::Arc;

use budget_core::error::DomainError;
use budget_core::projection::{CheckpointStore, EventDecoder, ProjectionHandler};
use budget_core::repository::{EventLog, LOG_START, LoggedEvent};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Events read from the log per round trip.
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// Where a subscription without a checkpoint begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Start {
    /// Replays the whole log.
    Beginning,
    /// Sees only events appended after it first ran.
    Head,
}

struct Subscription {
    handler: Arc<dyn ProjectionHandler>,
    start: Start,
    /// Last applied position; `None` until loaded from the checkpoint store.
    /// Held for the whole of a catch-up so runs of one handler never overlap.
    position: Mutex<Option<i64>>,
}

/// How far one handler got during a catch-up.
#[derive(Debug)]
pub struct HandlerProgress {
    /// Handler name.
    pub handler: &'static str,
    /// Position of the last event the handler is done with.
    pub position: i64,
    /// Events the handler applied.
    pub applied: usize,
    /// Events skipped because they could not be decoded.
    pub dead_lettered: usize,
    /// Why the handler stopped early, if it did.
    pub error: Option<DomainError>,
}

impl HandlerProgress {
    fn new(handler: &'static str, position: i64) -> Self {
        Self {
            handler,
            position,
            applied: 0,
            dead_lettered: 0,
            error: None,
        }
    }

    /// Returns `true` if the handler reached the head of the log.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of catching every handler up.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// One entry per handler, in registration order.
    pub progress: Vec<HandlerProgress>,
}

impl DispatchOutcome {
    /// Returns `true` if no handler failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.progress.iter().all(HandlerProgress::is_clean)
    }

    /// Total events applied across handlers.
    #[must_use]
    pub fn applied(&self) -> usize {
        self.progress.iter().map(|p| p.applied).sum()
    }

    /// Handlers that stopped on an error, with the error.
    pub fn failed(&self) -> impl Iterator<Item = (&'static str, &DomainError)> {
        self.progress
            .iter()
            .filter_map(|p| p.error.as_ref().map(|e| (p.handler, e)))
    }
}

enum Delivery {
    Applied,
    Skipped,
    DeadLettered,
}

/// Feeds the event log to registered handlers from their checkpoints.
pub struct ProjectionDispatcher {
    log: Arc<dyn EventLog>,
    decoder: Arc<dyn EventDecoder>,
    checkpoints: Arc<dyn CheckpointStore>,
    subscriptions: Vec<Subscription>,
    batch_size: usize,
}

impl fmt::Debug for ProjectionDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.subscriptions.iter().map(|s| s.handler.name()).collect();
        f.debug_struct("ProjectionDispatcher")
            .field("handlers", &names)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl ProjectionDispatcher {
    /// Creates a dispatcher with no handlers.
    #[must_use]
    pub fn new(
        log: Arc<dyn EventLog>,
        decoder: Arc<dyn EventDecoder>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            log,
            decoder,
            checkpoints,
            subscriptions: Vec::new(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Sets how many events are read per round trip (at least one).
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Adds a handler that starts from the beginning of the log.
    #[must_use]
    pub fn register(self, handler: Arc<dyn ProjectionHandler>) -> Self {
        self.subscribe(handler, Start::Beginning)
    }

    /// Adds a handler that starts from the head of the log the first time
    /// it runs, for side effects that must not be repeated for history.
    #[must_use]
    pub fn register_live(self, handler: Arc<dyn ProjectionHandler>) -> Self {
        self.subscribe(handler, Start::Head)
    }

    fn subscribe(mut self, handler: Arc<dyn ProjectionHandler>, start: Start) -> Self {
        self.subscriptions.push(Subscription {
            handler,
            start,
            position: Mutex::new(None),
        });
        self
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Returns `true` if no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Name of the handler at `index`.
    #[must_use]
    pub fn handler_name(&self, index: usize) -> Option<&'static str> {
        self.subscriptions.get(index).map(|s| s.handler.name())
    }

    /// Loads or creates every handler's checkpoint.
    ///
    /// Run this before serving writes so that live handlers pin their
    /// starting position ahead of the first new event.
    ///
    /// # Errors
    ///
    /// Returns the first error from the log or the checkpoint store.
    pub async fn initialize(&self) -> Result<(), DomainError> {
        for subscription in &self.subscriptions {
            let mut position = subscription.position.lock().await;
            if position.is_none() {
                *position = Some(self.starting_position(subscription).await?);
            }
        }
        info!(handlers = self.subscriptions.len(), "projection checkpoints loaded");
        Ok(())
    }

    async fn starting_position(&self, subscription: &Subscription) -> Result<i64, DomainError> {
        let name = subscription.handler.name();
        if let Some(saved) = self.checkpoints.load(name).await? {
            return Ok(saved);
        }
        let start = match subscription.start {
            Start::Beginning => LOG_START,
            Start::Head => self.log.head_position().await?,
        };
        self.checkpoints.save(name, start).await?;
        debug!(handler = name, position = start, "checkpoint created");
        Ok(start)
    }

    /// Catches every handler up to the head of the log, one after another.
    pub async fn catch_up(&self) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        for index in 0..self.subscriptions.len() {
            outcome.progress.push(self.catch_up_handler(index).await);
        }
        outcome
    }

    /// Catches the handler at `index` up to the head of the log.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub async fn catch_up_handler(&self, index: usize) -> HandlerProgress {
        let subscription = &self.subscriptions[index];
        let name = subscription.handler.name();
        let mut position = subscription.position.lock().await;

        let mut current = match *position {
            Some(current) => current,
            None => match self.starting_position(subscription).await {
                Ok(start) => start,
                Err(e) => {
                    error!(handler = name, error = %e, "loading projection checkpoint failed");
                    let mut progress = HandlerProgress::new(name, LOG_START);
                    progress.error = Some(e);
                    return progress;
                }
            },
        };
        *position = Some(current);
        let mut progress = HandlerProgress::new(name, current);

        loop {
            let batch = match self.log.read_all(current, self.batch_size).await {
                Ok(batch) => batch,
                Err(e) => {
                    error!(handler = name, position = current, error = %e, "reading the event log failed");
                    progress.error = Some(e);
                    break;
                }
            };
            let exhausted = batch.len() < self.batch_size;
            let saved = current;

            for logged in &batch {
                match self.deliver(subscription.handler.as_ref(), logged).await {
                    Ok(Delivery::Applied) => progress.applied += 1,
                    Ok(Delivery::Skipped) => {}
                    Ok(Delivery::DeadLettered) => progress.dead_lettered += 1,
                    Err(e) => {
                        progress.error = Some(e);
                        break;
                    }
                }
                current = logged.position;
            }

            *position = Some(current);
            progress.position = current;
            if current != saved
                && let Err(e) = self.checkpoints.save(name, current).await
            {
                error!(handler = name, position = current, error = %e, "saving projection checkpoint failed");
                progress.error.get_or_insert(e);
            }
            if exhausted || progress.error.is_some() {
                break;
            }
        }

        if progress.applied > 0 || progress.dead_lettered > 0 {
            debug!(
                handler = name,
                position = progress.position,
                applied = progress.applied,
                dead_lettered = progress.dead_lettered,
                "projection caught up"
            );
        }
        progress
    }

    async fn deliver(
        &self,
        handler: &dyn ProjectionHandler,
        logged: &LoggedEvent,
    ) -> Result<Delivery, DomainError> {
        let stored = &logged.event;
        if !handler.handles(&stored.event_type) {
            return Ok(Delivery::Skipped);
        }
        let event = match self.decoder.decode(stored) {
            Ok(event) => event,
            Err(e) if e.is_corruption() => {
                // Shredded or damaged payloads will never decode.
                error!(
                    handler = handler.name(),
                    position = logged.position,
                    event_id = %stored.event_id,
                    event_type = %stored.event_type,
                    aggregate_id = %stored.aggregate_id,
                    error = %e,
                    "undecodable event skipped by projection"
                );
                return Ok(Delivery::DeadLettered);
            }
            Err(e) => return Err(e),
        };
        handler.handle(&event).await.map_err(|e| {
            error!(
                handler = handler.name(),
                position = logged.position,
                event_id = %event.event_id,
                event_type = %event.event_type,
                aggregate_id = %event.aggregate_id,
                stream_version = event.stream_version,
                error = %e,
                "projection handler failed"
            );
            e
        })?;
        Ok(Delivery::Applied)
    }
}
