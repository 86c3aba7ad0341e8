//! Routes for the BudgetPlan bounded context.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use budget_core::money::{Amount, Currency};
use budget_plan::application::command_handlers::{self, INCOME_CATEGORY};
use budget_plan::application::query_handlers::{self, BudgetPlanView};
use budget_plan::domain::commands;
use budget_plan::domain::events::EntryGroup;
use budget_plan::domain::split::CategoryLabels;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{AsOfQuery, CommandResponse};
use crate::auth::ActingUser;
use crate::error::ApiError;
use crate::state::AppState;

/// One income line of a generate request.
#[derive(Debug, Deserialize)]
pub struct IncomeLineRequest {
    /// Display name.
    pub name: String,
    /// Monthly amount, e.g. `"2500.00"`.
    pub amount: Amount,
}

/// Request body for POST /generate.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    /// The new plan identifier.
    pub budget_plan_id: Uuid,
    /// Any day of the planned month.
    pub date: NaiveDate,
    /// Plan currency.
    pub currency: Currency,
    /// Incomes to split.
    pub incomes: Vec<IncomeLineRequest>,
}

/// Request body for POST /add-income.
#[derive(Debug, Deserialize)]
pub struct AddIncomeRequest {
    /// The plan identifier.
    pub budget_plan_id: Uuid,
    /// Entry identifier; generated when omitted.
    pub entry_id: Option<Uuid>,
    /// Display name.
    pub name: String,
    /// Monthly amount.
    pub amount: Amount,
}

/// Request body for POST /remove.
#[derive(Debug, Deserialize)]
pub struct RemoveRequest {
    /// The plan identifier.
    pub budget_plan_id: Uuid,
}

/// POST /generate
#[instrument(skip(state, request), fields(budget_plan_id = %request.budget_plan_id))]
async fn generate(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::GenerateBudgetPlan {
        correlation_id: Uuid::new_v4(),
        budget_plan_id: request.budget_plan_id,
        user_id,
        date: request.date,
        currency: request.currency,
        incomes: request
            .incomes
            .into_iter()
            .map(|line| commands::IncomeLine {
                name: line.name,
                amount: line.amount,
            })
            .collect(),
        labels: CategoryLabels::default(),
    };

    info!(correlation_id = %command.correlation_id, "handling generate_budget_plan command");

    let result =
        command_handlers::handle_generate(&command, state.clock.as_ref(), &state.plans).await?;

    Ok(Json(CommandResponse::new(result.aggregate_id, &result.stored_events)))
}

/// POST /add-income
#[instrument(skip(state, request), fields(budget_plan_id = %request.budget_plan_id))]
async fn add_income(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Json(request): Json<AddIncomeRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::AddEntry {
        correlation_id: Uuid::new_v4(),
        budget_plan_id: request.budget_plan_id,
        user_id,
        group: EntryGroup::Income,
        entry_id: request.entry_id.unwrap_or_else(Uuid::new_v4),
        name: request.name,
        amount: request.amount,
        category: INCOME_CATEGORY.to_owned(),
    };

    info!(correlation_id = %command.correlation_id, "handling add_income command");

    let result =
        command_handlers::handle_add_entry(&command, state.clock.as_ref(), &state.plans).await?;

    Ok(Json(CommandResponse::new(result.aggregate_id, &result.stored_events)))
}

/// POST /remove
#[instrument(skip(state, request), fields(budget_plan_id = %request.budget_plan_id))]
async fn remove(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Json(request): Json<RemoveRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::RemoveBudgetPlan {
        correlation_id: Uuid::new_v4(),
        budget_plan_id: request.budget_plan_id,
        user_id,
    };

    info!(correlation_id = %command.correlation_id, "handling remove_budget_plan command");

    let result =
        command_handlers::handle_remove(&command, state.clock.as_ref(), &state.plans).await?;

    Ok(Json(CommandResponse::new(result.aggregate_id, &result.stored_events)))
}

/// GET /{budget_plan_id}?as_of=
#[instrument(skip(state))]
async fn get_budget_plan(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Path(budget_plan_id): Path<Uuid>,
    Query(query): Query<AsOfQuery>,
) -> Result<Json<BudgetPlanView>, ApiError> {
    let view =
        query_handlers::get_budget_plan(budget_plan_id, user_id, query.as_of, &state.plans.plans)
            .await?;
    Ok(Json(view))
}

/// Returns the router for the budget plan context.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/generate", post(generate))
        .route("/add-income", post(add_income))
        .route("/remove", post(remove))
        .route("/{budget_plan_id}", get(get_budget_plan))
}
