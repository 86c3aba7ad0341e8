//! Command handlers for the BudgetPlan context.
//!
//! Each handler loads the aggregate through its repository, runs the
//! command against it and saves the resulting events. Generating a plan
//! also claims the user's month in the date registry.

use std::sync::Arc;

use budget_core::clock::Clock;
use budget_core::error::DomainError;
use budget_core::repository::StoredEvent;
use budget_event_store::event_sourced_repository::{EventSourcedRepository, EventStoreContext};
use chrono::{Datelike, NaiveDate};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::domain::aggregates::BudgetPlan;
use crate::domain::commands::{
    AddEntry, AdjustEntry, ChangeCurrency, GenerateBudgetPlan, GenerateBudgetPlanFromExisting,
    RemoveBudgetPlan, RemoveEntry,
};
use crate::domain::date_registry::{
    BudgetPlanDateRegistry, date_registry_event_registry, registry_id,
};
use crate::domain::events::{PlanEntry, budget_plan_event_registry};

/// Category given to every income entry.
pub const INCOME_CATEGORY: &str = "income";

/// Result of a successfully handled command.
#[derive(Debug)]
pub struct BudgetPlanCommandResult {
    /// The aggregate ID affected by the command.
    pub aggregate_id: Uuid,
    /// The stored events produced and persisted.
    pub stored_events: Vec<StoredEvent>,
}

/// Repositories the BudgetPlan handlers need.
#[derive(Debug, Clone)]
pub struct BudgetPlanRepositories {
    /// Plans.
    pub plans: EventSourcedRepository<BudgetPlan>,
    /// Month registries.
    pub registries: EventSourcedRepository<BudgetPlanDateRegistry>,
}

impl BudgetPlanRepositories {
    /// Builds both repositories over one store context.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if an event type registry
    /// cannot be built.
    pub fn new(context: EventStoreContext) -> Result<Self, DomainError> {
        Ok(Self {
            plans: EventSourcedRepository::new(
                context.clone(),
                Arc::new(budget_plan_event_registry()?),
            ),
            registries: EventSourcedRepository::new(
                context,
                Arc::new(date_registry_event_registry()?),
            ),
        })
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Handles the `GenerateBudgetPlan` command.
///
/// # Errors
///
/// Returns `DomainError::AlreadyExists` if the plan exists or the month
/// already has a plan, `DomainError::Validation` for bad incomes, and
/// propagates store errors. If the plan cannot be saved after the month
/// was claimed, the claim is released before the error is returned.
pub async fn handle_generate(
    command: &GenerateBudgetPlan,
    clock: &dyn Clock,
    repos: &BudgetPlanRepositories,
) -> Result<BudgetPlanCommandResult, DomainError> {
    let date = first_of_month(command.date);
    let mut plan = repos.plans.load(command.budget_plan_id, None).await?;
    let incomes = command
        .incomes
        .iter()
        .map(|line| PlanEntry {
            id: Uuid::new_v4(),
            name: line.name.clone(),
            amount: line.amount,
            category: INCOME_CATEGORY.to_owned(),
        })
        .collect();
    plan.generate(
        command.user_id,
        date,
        command.currency.clone(),
        incomes,
        &command.labels,
        command.correlation_id,
        clock,
    )?;
    let stored_events =
        claim_month_and_save(repos, &mut plan, command.user_id, date, command.correlation_id, clock)
            .await?;
    Ok(BudgetPlanCommandResult {
        aggregate_id: command.budget_plan_id,
        stored_events,
    })
}

/// Handles the `GenerateBudgetPlanFromExisting` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the source plan does not
/// exist, `DomainError::NotOwner` if it belongs to someone else,
/// `DomainError::AggregateDeleted` if it was removed, and otherwise the
/// same errors as [`handle_generate`].
pub async fn handle_generate_from_existing(
    command: &GenerateBudgetPlanFromExisting,
    clock: &dyn Clock,
    repos: &BudgetPlanRepositories,
) -> Result<BudgetPlanCommandResult, DomainError> {
    let source = repos.plans.get(command.source_budget_plan_id, None).await?;
    if source.user_id() != command.user_id {
        return Err(DomainError::NotOwner {
            aggregate_id: source.id,
            user_id: command.user_id,
        });
    }
    if source.is_deleted() {
        return Err(DomainError::AggregateDeleted(source.id));
    }
    let template = source
        .to_template()
        .ok_or(DomainError::AggregateNotFound(source.id))?;

    let date = first_of_month(command.date);
    let mut plan = repos.plans.load(command.budget_plan_id, None).await?;
    plan.generate_from_existing(command.user_id, date, template, command.correlation_id, clock)?;
    let stored_events =
        claim_month_and_save(repos, &mut plan, command.user_id, date, command.correlation_id, clock)
            .await?;
    Ok(BudgetPlanCommandResult {
        aggregate_id: command.budget_plan_id,
        stored_events,
    })
}

async fn claim_month_and_save(
    repos: &BudgetPlanRepositories,
    plan: &mut BudgetPlan,
    user_id: Uuid,
    date: NaiveDate,
    correlation_id: Uuid,
    clock: &dyn Clock,
) -> Result<Vec<StoredEvent>, DomainError> {
    let mut registry = repos.registries.load(registry_id(user_id, date), None).await?;
    registry.register(plan.id, user_id, date, correlation_id, clock)?;
    repos.registries.save(&mut registry).await?;

    match repos.plans.save(plan).await {
        Ok(events) => Ok(events),
        Err(e) => {
            warn!(budget_plan_id = %plan.id, error = %e, "plan save failed, releasing month");
            registry.release(plan.id, correlation_id, clock);
            if let Err(release_error) = repos.registries.save(&mut registry).await {
                error!(
                    budget_plan_id = %plan.id,
                    registry_id = %registry.id,
                    error = %release_error,
                    "releasing month failed"
                );
            }
            Err(e)
        }
    }
}

async fn update_plan<F>(
    repos: &BudgetPlanRepositories,
    budget_plan_id: Uuid,
    operation: F,
) -> Result<BudgetPlanCommandResult, DomainError>
where
    F: FnOnce(&mut BudgetPlan) -> Result<(), DomainError>,
{
    let mut plan = repos.plans.get(budget_plan_id, None).await?;
    operation(&mut plan)?;
    let stored_events = repos.plans.save(&mut plan).await?;
    Ok(BudgetPlanCommandResult {
        aggregate_id: budget_plan_id,
        stored_events,
    })
}

/// Handles the `AddEntry` command.
///
/// # Errors
///
/// Returns the aggregate's guard errors and propagates store errors,
/// including `DomainError::ConcurrencyConflict`.
pub async fn handle_add_entry(
    command: &AddEntry,
    clock: &dyn Clock,
    repos: &BudgetPlanRepositories,
) -> Result<BudgetPlanCommandResult, DomainError> {
    update_plan(repos, command.budget_plan_id, |plan| {
        plan.add_entry(
            command.group,
            command.user_id,
            PlanEntry {
                id: command.entry_id,
                name: command.name.clone(),
                amount: command.amount,
                category: command.category.clone(),
            },
            command.correlation_id,
            clock,
        )
    })
    .await
}

/// Handles the `AdjustEntry` command.
///
/// # Errors
///
/// Same as [`handle_add_entry`].
pub async fn handle_adjust_entry(
    command: &AdjustEntry,
    clock: &dyn Clock,
    repos: &BudgetPlanRepositories,
) -> Result<BudgetPlanCommandResult, DomainError> {
    update_plan(repos, command.budget_plan_id, |plan| {
        plan.adjust_entry(
            command.group,
            command.user_id,
            command.entry_id,
            command.name.clone(),
            command.amount,
            command.correlation_id,
            clock,
        )
    })
    .await
}

/// Handles the `RemoveEntry` command.
///
/// # Errors
///
/// Same as [`handle_add_entry`].
pub async fn handle_remove_entry(
    command: &RemoveEntry,
    clock: &dyn Clock,
    repos: &BudgetPlanRepositories,
) -> Result<BudgetPlanCommandResult, DomainError> {
    update_plan(repos, command.budget_plan_id, |plan| {
        plan.remove_entry(
            command.group,
            command.user_id,
            command.entry_id,
            command.correlation_id,
            clock,
        )
    })
    .await
}

/// Handles the `ChangeCurrency` command.
///
/// # Errors
///
/// Same as [`handle_add_entry`].
pub async fn handle_change_currency(
    command: &ChangeCurrency,
    clock: &dyn Clock,
    repos: &BudgetPlanRepositories,
) -> Result<BudgetPlanCommandResult, DomainError> {
    update_plan(repos, command.budget_plan_id, |plan| {
        plan.change_currency(
            command.user_id,
            command.currency.clone(),
            command.correlation_id,
            clock,
        )
    })
    .await
}

/// Handles the `RemoveBudgetPlan` command, then frees the plan's month.
/// Failing to free the month is logged and does not fail the command.
///
/// # Errors
///
/// Same as [`handle_add_entry`].
pub async fn handle_remove(
    command: &RemoveBudgetPlan,
    clock: &dyn Clock,
    repos: &BudgetPlanRepositories,
) -> Result<BudgetPlanCommandResult, DomainError> {
    let mut plan = repos.plans.get(command.budget_plan_id, None).await?;
    plan.remove(command.user_id, command.correlation_id, clock)?;
    let stored_events = repos.plans.save(&mut plan).await?;

    if let Some(date) = plan.date() {
        if let Err(e) = release_month(repos, &plan, date, command.correlation_id, clock).await {
            error!(budget_plan_id = %plan.id, error = %e, "releasing month failed");
        }
    }
    Ok(BudgetPlanCommandResult {
        aggregate_id: command.budget_plan_id,
        stored_events,
    })
}

async fn release_month(
    repos: &BudgetPlanRepositories,
    plan: &BudgetPlan,
    date: NaiveDate,
    correlation_id: Uuid,
    clock: &dyn Clock,
) -> Result<(), DomainError> {
    let mut registry = repos
        .registries
        .load(registry_id(plan.user_id(), date), None)
        .await?;
    registry.release(plan.id, correlation_id, clock);
    let released = repos.registries.save(&mut registry).await?;
    debug!(budget_plan_id = %plan.id, released = !released.is_empty(), "month released");
    Ok(())
}
