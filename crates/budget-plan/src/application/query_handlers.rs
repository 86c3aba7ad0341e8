//! Query handlers for the BudgetPlan context.
//!
//! Single plans are reconstituted from the event log, optionally as they
//! stood at a past instant. Listings come from the summary projection.

use budget_core::aggregate::AggregateRoot;
use budget_core::error::DomainError;
use budget_core::money::{Amount, Currency};
use budget_core::projection::ReadModelRepository;
use budget_event_store::event_sourced_repository::EventSourcedRepository;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::application::projections::BudgetPlanSummary;
use crate::domain::aggregates::BudgetPlan;
use crate::domain::events::{EntryGroup, PlanEntry};

/// Read-only view of a budget plan.
#[derive(Debug, Serialize)]
pub struct BudgetPlanView {
    /// The plan identifier.
    pub budget_plan_id: Uuid,
    /// The owner.
    pub user_id: Uuid,
    /// First day of the planned month.
    pub date: Option<NaiveDate>,
    /// Plan currency.
    pub currency: Option<Currency>,
    /// Incomes.
    pub incomes: Vec<PlanEntry>,
    /// Needs.
    pub needs: Vec<PlanEntry>,
    /// Wants.
    pub wants: Vec<PlanEntry>,
    /// Savings.
    pub savings: Vec<PlanEntry>,
    /// Sum of the incomes.
    pub total_incomes: Amount,
    /// Sum of needs, wants and savings.
    pub total_allocated: Amount,
    /// Whether the plan was removed.
    pub removed: bool,
    /// Version the view reflects.
    pub version: i64,
}

impl BudgetPlanView {
    fn from_plan(plan: &BudgetPlan) -> Result<Self, DomainError> {
        let allocated = [EntryGroup::Need, EntryGroup::Want, EntryGroup::Saving]
            .into_iter()
            .map(|group| plan.total(group))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            budget_plan_id: plan.id,
            user_id: plan.user_id(),
            date: plan.date(),
            currency: plan.currency().cloned(),
            incomes: plan.entries(EntryGroup::Income).to_vec(),
            needs: plan.entries(EntryGroup::Need).to_vec(),
            wants: plan.entries(EntryGroup::Want).to_vec(),
            savings: plan.entries(EntryGroup::Saving).to_vec(),
            total_incomes: plan.total(EntryGroup::Income)?,
            total_allocated: Amount::sum(&allocated)?,
            removed: plan.is_deleted(),
            version: plan.version(),
        })
    }
}

/// Retrieves a plan, as of `as_of` when given.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the plan did not exist at
/// that time, `DomainError::NotOwner` if it belongs to someone other than
/// `user_id`, and propagates reconstitution errors.
pub async fn get_budget_plan(
    budget_plan_id: Uuid,
    user_id: Uuid,
    as_of: Option<DateTime<Utc>>,
    repo: &EventSourcedRepository<BudgetPlan>,
) -> Result<BudgetPlanView, DomainError> {
    let plan = repo.get(budget_plan_id, as_of).await?;
    if plan.user_id() != user_id {
        return Err(DomainError::NotOwner {
            aggregate_id: budget_plan_id,
            user_id,
        });
    }
    BudgetPlanView::from_plan(&plan)
}

/// Lists a user's plans that are not removed, by month.
///
/// # Errors
///
/// Propagates read-model errors.
pub async fn list_budget_plans(
    user_id: Uuid,
    views: &dyn ReadModelRepository<BudgetPlanSummary>,
) -> Result<Vec<BudgetPlanSummary>, DomainError> {
    let mut plans: Vec<_> = views
        .find_all()
        .await?
        .into_iter()
        .filter(|s| s.user_id == user_id && !s.removed)
        .collect();
    plans.sort_by_key(|s| s.date);
    Ok(plans)
}
