//! Shared application state.

use std::sync::Arc;

use budget_core::clock::Clock;
use budget_core::error::DomainError;
use budget_envelope::application::command_handlers::{
    BudgetEnvelopeRepository, budget_envelope_repository,
};
use budget_envelope::application::projections::{
    BudgetEnvelopeLedgerEntry, BudgetEnvelopeLedgerProjection, BudgetEnvelopeSummary,
    BudgetEnvelopeSummaryProjection,
};
use budget_envelope::domain::events::budget_envelope_event_registry;
use budget_core::repository::EventLog;
use budget_event_store::codec::{EventCodec, PayloadDecoder};
use budget_event_store::event_sourced_repository::EventStoreContext;
use budget_plan::application::command_handlers::BudgetPlanRepositories;
use budget_plan::application::projections::{BudgetPlanSummary, BudgetPlanSummaryProjection};
use budget_plan::domain::events::budget_plan_event_registry;
use budget_projection::checkpoint::InMemoryCheckpointStore;
use budget_projection::dispatcher::ProjectionDispatcher;
use budget_projection::read_model::InMemoryReadModelRepository;
use budget_user::application::command_handlers::{UserRepository, user_repository};
use budget_user::application::projections::{
    BroadcastNotificationChannel, UserNotificationProjection, UserSummary, UserSummaryProjection,
};
use budget_user::domain::events::user_event_registry;

const NOTIFICATION_CAPACITY: usize = 256;

/// Read-model storage for every projection the server runs.
#[derive(Debug, Clone)]
pub struct ReadModels {
    /// One row per budget plan.
    pub plan_summaries: Arc<InMemoryReadModelRepository<BudgetPlanSummary>>,
    /// One row per envelope.
    pub envelope_summaries: Arc<InMemoryReadModelRepository<BudgetEnvelopeSummary>>,
    /// One row per envelope balance movement.
    pub envelope_ledger: Arc<InMemoryReadModelRepository<BudgetEnvelopeLedgerEntry>>,
    /// One row per user.
    pub user_summaries: Arc<InMemoryReadModelRepository<UserSummary>>,
    /// Account notifications.
    pub notifications: BroadcastNotificationChannel,
    /// How far each projection has read the log; lives and dies with the
    /// rows above.
    pub checkpoints: Arc<InMemoryCheckpointStore>,
}

impl Default for ReadModels {
    fn default() -> Self {
        Self {
            plan_summaries: Arc::new(InMemoryReadModelRepository::new()),
            envelope_summaries: Arc::new(InMemoryReadModelRepository::new()),
            envelope_ledger: Arc::new(InMemoryReadModelRepository::new()),
            user_summaries: Arc::new(InMemoryReadModelRepository::new()),
            notifications: BroadcastNotificationChannel::new(NOTIFICATION_CAPACITY),
            checkpoints: Arc::new(InMemoryCheckpointStore::new()),
        }
    }
}

impl ReadModels {
    /// Creates empty read models.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a dispatcher feeding every projection from `log`.
    ///
    /// Notifications are delivered live only: a fresh set of read models
    /// rebuilds from history without notifying users again.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if an event type registry
    /// cannot be built.
    pub fn dispatcher(
        &self,
        log: Arc<dyn EventLog>,
        codec: EventCodec,
    ) -> Result<ProjectionDispatcher, DomainError> {
        let plan_events = Arc::new(budget_plan_event_registry()?);
        let envelope_events = Arc::new(budget_envelope_event_registry()?);
        let user_events = Arc::new(user_event_registry()?);
        let decoder = PayloadDecoder::new(codec)
            .with_registry(&plan_events)
            .with_registry(&envelope_events)
            .with_registry(&user_events);
        Ok(
            ProjectionDispatcher::new(log, Arc::new(decoder), self.checkpoints.clone())
                .register(Arc::new(BudgetPlanSummaryProjection::new(
                    plan_events,
                    self.plan_summaries.clone(),
                )))
                .register(Arc::new(BudgetEnvelopeSummaryProjection::new(
                    envelope_events.clone(),
                    self.envelope_summaries.clone(),
                )))
                .register(Arc::new(BudgetEnvelopeLedgerProjection::new(
                    envelope_events,
                    self.envelope_ledger.clone(),
                )))
                .register(Arc::new(UserSummaryProjection::new(
                    user_events,
                    self.user_summaries.clone(),
                )))
                .register_live(Arc::new(UserNotificationProjection::new(Arc::new(
                    self.notifications.clone(),
                )))),
        )
    }
}

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Timestamps raised events.
    pub clock: Arc<dyn Clock>,
    /// Plan and month-registry repositories.
    pub plans: Arc<BudgetPlanRepositories>,
    /// Envelope repository.
    pub envelopes: Arc<BudgetEnvelopeRepository>,
    /// User repository.
    pub users: Arc<UserRepository>,
    /// Projection output.
    pub read_models: ReadModels,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("read_models", &self.read_models)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create new application state over a store context.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if an event type registry
    /// cannot be built.
    pub fn new(
        context: EventStoreContext,
        clock: Arc<dyn Clock>,
        read_models: ReadModels,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            clock,
            plans: Arc::new(BudgetPlanRepositories::new(context.clone())?),
            envelopes: Arc::new(budget_envelope_repository(context.clone())?),
            users: Arc::new(user_repository(context)?),
            read_models,
        })
    }
}
