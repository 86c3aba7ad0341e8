//! Read-side projection of budget plans.
//!
//! Rows are keyed by plan id and remember the last stream version folded
//! in, so redelivered events are skipped. A removed plan keeps its row,
//! flagged, so that a late redelivery of an earlier event cannot bring it
//! back.

use std::sync::Arc;

use async_trait::async_trait;
use budget_core::error::DomainError;
use budget_core::money::{Amount, Currency};
use budget_core::projection::{ProjectionHandler, ReadModel, ReadModelRepository};
use budget_core::registry::EventTypeRegistry;
use budget_core::repository::StoredEvent;
use budget_projection::is_stale;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::events::{BudgetPlanEventKind, EntryGroup, PlanEntry};

/// Denormalized view of one plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetPlanSummary {
    /// The plan identifier.
    pub budget_plan_id: Uuid,
    /// The owner.
    pub user_id: Uuid,
    /// First day of the planned month.
    pub date: NaiveDate,
    /// Plan currency.
    pub currency: Currency,
    /// Incomes.
    pub incomes: Vec<PlanEntry>,
    /// Needs.
    pub needs: Vec<PlanEntry>,
    /// Wants.
    pub wants: Vec<PlanEntry>,
    /// Savings.
    pub savings: Vec<PlanEntry>,
    /// Set once the plan is removed.
    pub removed: bool,
    /// Stream version of the last event folded in.
    pub last_version: i64,
}

impl BudgetPlanSummary {
    fn created(
        budget_plan_id: Uuid,
        user_id: Uuid,
        date: NaiveDate,
        currency: Currency,
        [incomes, needs, wants, savings]: [Vec<PlanEntry>; 4],
    ) -> Self {
        Self {
            budget_plan_id,
            user_id,
            date,
            currency,
            incomes,
            needs,
            wants,
            savings,
            removed: false,
            last_version: -1,
        }
    }

    fn entries_mut(&mut self, group: EntryGroup) -> &mut Vec<PlanEntry> {
        match group {
            EntryGroup::Income => &mut self.incomes,
            EntryGroup::Need => &mut self.needs,
            EntryGroup::Want => &mut self.wants,
            EntryGroup::Saving => &mut self.savings,
        }
    }

    /// Sum of one group.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` on overflow.
    pub fn total(&self, group: EntryGroup) -> Result<Amount, DomainError> {
        let entries = match group {
            EntryGroup::Income => &self.incomes,
            EntryGroup::Need => &self.needs,
            EntryGroup::Want => &self.wants,
            EntryGroup::Saving => &self.savings,
        };
        Amount::sum(entries.iter().map(|e| &e.amount))
    }
}

impl ReadModel for BudgetPlanSummary {
    type Key = Uuid;

    fn key(&self) -> Uuid {
        self.budget_plan_id
    }
}

/// Maintains [`BudgetPlanSummary`] rows.
pub struct BudgetPlanSummaryProjection {
    registry: Arc<EventTypeRegistry<BudgetPlanEventKind>>,
    views: Arc<dyn ReadModelRepository<BudgetPlanSummary>>,
}

impl std::fmt::Debug for BudgetPlanSummaryProjection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetPlanSummaryProjection").finish_non_exhaustive()
    }
}

impl BudgetPlanSummaryProjection {
    /// Creates the projection over a read-model repository.
    #[must_use]
    pub fn new(
        registry: Arc<EventTypeRegistry<BudgetPlanEventKind>>,
        views: Arc<dyn ReadModelRepository<BudgetPlanSummary>>,
    ) -> Self {
        Self { registry, views }
    }

    fn fold(
        existing: Option<BudgetPlanSummary>,
        kind: BudgetPlanEventKind,
        stream_version: i64,
    ) -> Option<BudgetPlanSummary> {
        let mut summary = match kind {
            BudgetPlanEventKind::Generated(p) => BudgetPlanSummary::created(
                p.budget_plan_id,
                p.user_id,
                p.date,
                p.currency,
                [p.incomes, p.needs, p.wants, p.savings],
            ),
            BudgetPlanEventKind::GeneratedFromExisting(p) => BudgetPlanSummary::created(
                p.budget_plan_id,
                p.user_id,
                p.date,
                p.currency,
                [p.incomes, p.needs, p.wants, p.savings],
            ),
            BudgetPlanEventKind::EntryAdded(p) => {
                let mut summary = existing?;
                summary.entries_mut(p.group).push(PlanEntry {
                    id: p.entry_id,
                    name: p.name,
                    amount: p.amount,
                    category: p.category,
                });
                summary
            }
            BudgetPlanEventKind::EntryAdjusted(p) => {
                let mut summary = existing?;
                if let Some(entry) = summary
                    .entries_mut(p.group)
                    .iter_mut()
                    .find(|e| e.id == p.entry_id)
                {
                    entry.name = p.name;
                    entry.amount = p.amount;
                }
                summary
            }
            BudgetPlanEventKind::EntryRemoved(p) => {
                let mut summary = existing?;
                summary.entries_mut(p.group).retain(|e| e.id != p.entry_id);
                summary
            }
            BudgetPlanEventKind::CurrencyChanged(p) => {
                let mut summary = existing?;
                summary.currency = p.currency;
                summary
            }
            BudgetPlanEventKind::Removed(_) => {
                let mut summary = existing?;
                summary.removed = true;
                summary
            }
        };
        summary.last_version = stream_version;
        Some(summary)
    }
}

#[async_trait]
impl ProjectionHandler for BudgetPlanSummaryProjection {
    fn name(&self) -> &'static str {
        "budget_plan_summary"
    }

    fn handles(&self, event_type: &str) -> bool {
        self.registry.contains(event_type)
    }

    async fn handle(&self, event: &StoredEvent) -> Result<(), DomainError> {
        let existing = self.views.find_one(&event.aggregate_id).await?;
        if is_stale(existing.as_ref().map(|s| s.last_version), event.stream_version) {
            debug!(
                budget_plan_id = %event.aggregate_id,
                stream_version = event.stream_version,
                "stale event skipped"
            );
            return Ok(());
        }
        let kind = self.registry.decode(event)?;
        match Self::fold(existing, kind, event.stream_version) {
            Some(summary) => self.views.save(summary).await,
            None => {
                warn!(
                    budget_plan_id = %event.aggregate_id,
                    event_type = %event.event_type,
                    "event for a plan with no summary row"
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use budget_core::clock::SystemClock;
    use budget_core::projection::ReadModelRepository;
    use budget_event_store::codec::PayloadDecoder;
    use budget_projection::bus::InlinePublisher;
    use budget_projection::checkpoint::InMemoryCheckpointStore;
    use budget_projection::dispatcher::ProjectionDispatcher;
    use budget_projection::read_model::InMemoryReadModelRepository;
    use budget_test_support::TestStore;

    use super::*;
    use crate::application::command_handlers::{
        BudgetPlanRepositories, handle_add_entry, handle_generate, handle_remove,
    };
    use crate::domain::commands::{AddEntry, GenerateBudgetPlan, IncomeLine, RemoveBudgetPlan};
    use crate::domain::events::budget_plan_event_registry;
    use crate::domain::split::CategoryLabels;

    struct Fixture {
        store: TestStore,
        repos: BudgetPlanRepositories,
        views: Arc<InMemoryReadModelRepository<BudgetPlanSummary>>,
        projection: Arc<BudgetPlanSummaryProjection>,
    }

    fn fixture() -> Fixture {
        let store = TestStore::new();
        let views = Arc::new(InMemoryReadModelRepository::<BudgetPlanSummary>::new());
        let registry = Arc::new(budget_plan_event_registry().unwrap());
        let projection = Arc::new(BudgetPlanSummaryProjection::new(registry.clone(), views.clone()));
        let decoder = PayloadDecoder::new(store.context.codec.clone()).with_registry(&registry);
        let dispatcher = Arc::new(
            ProjectionDispatcher::new(
                store.log.clone(),
                Arc::new(decoder),
                Arc::new(InMemoryCheckpointStore::new()),
            )
            .register(projection.clone()),
        );
        let context = store.context_with_publisher(Arc::new(InlinePublisher::new(dispatcher)));
        let repos = BudgetPlanRepositories::new(context).unwrap();
        Fixture {
            store,
            repos,
            views,
            projection,
        }
    }

    fn generate(plan_id: Uuid, user_id: Uuid) -> GenerateBudgetPlan {
        GenerateBudgetPlan {
            correlation_id: Uuid::new_v4(),
            budget_plan_id: plan_id,
            user_id,
            date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            currency: Currency::new("EUR").unwrap(),
            incomes: vec![IncomeLine {
                name: "Salary".to_owned(),
                amount: "1000".parse().unwrap(),
            }],
            labels: CategoryLabels::default(),
        }
    }

    #[tokio::test]
    async fn test_summary_follows_saved_events() {
        // Arrange
        let fx = fixture();
        let plan_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        // Act
        handle_generate(&generate(plan_id, user_id), &SystemClock, &fx.repos)
            .await
            .unwrap();
        handle_add_entry(
            &AddEntry {
                correlation_id: Uuid::new_v4(),
                budget_plan_id: plan_id,
                user_id,
                group: EntryGroup::Income,
                entry_id: Uuid::new_v4(),
                name: "Bonus".to_owned(),
                amount: "250".parse().unwrap(),
                category: "income".to_owned(),
            },
            &SystemClock,
            &fx.repos,
        )
        .await
        .unwrap();

        // Assert
        let summary = fx.views.find_one(&plan_id).await.unwrap().unwrap();
        assert_eq!(summary.last_version, 1);
        assert_eq!(summary.total(EntryGroup::Income).unwrap().cents(), 125_000);
        assert_eq!(summary.total(EntryGroup::Need).unwrap().cents(), 50_000);
        assert!(!summary.removed);
    }

    #[tokio::test]
    async fn test_redelivered_events_leave_the_row_unchanged() {
        // Arrange
        let fx = fixture();
        let plan_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        handle_generate(&generate(plan_id, user_id), &SystemClock, &fx.repos)
            .await
            .unwrap();
        handle_remove(
            &RemoveBudgetPlan {
                correlation_id: Uuid::new_v4(),
                budget_plan_id: plan_id,
                user_id,
            },
            &SystemClock,
            &fx.repos,
        )
        .await
        .unwrap();
        let before = fx.views.find_one(&plan_id).await.unwrap().unwrap();

        // Act
        for event in fx.repos.plans.history(plan_id, None).await.unwrap() {
            fx.projection.handle(&event).await.unwrap();
        }

        // Assert
        let after = fx.views.find_one(&plan_id).await.unwrap().unwrap();
        assert_eq!(before, after);
        assert!(after.removed);
        assert_eq!(after.last_version, 1);
        assert_eq!(fx.store.raw_stream(plan_id).len(), 2);
    }

    #[tokio::test]
    async fn test_registry_events_are_not_handled() {
        let fx = fixture();

        assert!(fx.projection.handles("budget_plan.entry_added"));
        assert!(!fx.projection.handles("budget_plan_date_registry.registered"));
    }
}
