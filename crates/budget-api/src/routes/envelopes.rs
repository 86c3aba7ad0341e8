//! Routes for the BudgetEnvelope bounded context.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use budget_core::money::{Amount, Currency};
use budget_envelope::application::command_handlers;
use budget_envelope::application::query_handlers::{self, BudgetEnvelopeView};
use budget_envelope::domain::commands;
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{AsOfQuery, CommandResponse};
use crate::auth::ActingUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /create.
#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    /// The new envelope identifier.
    pub budget_envelope_id: Uuid,
    /// Display name.
    pub name: String,
    /// The most the envelope may hold.
    pub targeted_amount: Amount,
    /// Envelope currency.
    pub currency: Currency,
}

/// Request body for POST /credit and POST /debit.
#[derive(Debug, Deserialize)]
pub struct MovementRequest {
    /// The envelope identifier.
    pub budget_envelope_id: Uuid,
    /// Amount moved.
    pub amount: Amount,
    /// Free-form note.
    #[serde(default)]
    pub description: String,
}

/// POST /create
#[instrument(skip(state, request), fields(budget_envelope_id = %request.budget_envelope_id))]
async fn create(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Json(request): Json<CreateRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::CreateBudgetEnvelope {
        correlation_id: Uuid::new_v4(),
        budget_envelope_id: request.budget_envelope_id,
        user_id,
        name: request.name,
        targeted_amount: request.targeted_amount,
        currency: request.currency,
    };

    info!(correlation_id = %command.correlation_id, "handling create_budget_envelope command");

    let result =
        command_handlers::handle_create(&command, state.clock.as_ref(), &state.envelopes).await?;

    Ok(Json(CommandResponse::new(result.aggregate_id, &result.stored_events)))
}

/// POST /credit
#[instrument(skip(state, request), fields(budget_envelope_id = %request.budget_envelope_id))]
async fn credit(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Json(request): Json<MovementRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::CreditBudgetEnvelope {
        correlation_id: Uuid::new_v4(),
        budget_envelope_id: request.budget_envelope_id,
        user_id,
        amount: request.amount,
        description: request.description,
    };

    info!(correlation_id = %command.correlation_id, "handling credit_budget_envelope command");

    let result =
        command_handlers::handle_credit(&command, state.clock.as_ref(), &state.envelopes).await?;

    Ok(Json(CommandResponse::new(result.aggregate_id, &result.stored_events)))
}

/// POST /debit
#[instrument(skip(state, request), fields(budget_envelope_id = %request.budget_envelope_id))]
async fn debit(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Json(request): Json<MovementRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::DebitBudgetEnvelope {
        correlation_id: Uuid::new_v4(),
        budget_envelope_id: request.budget_envelope_id,
        user_id,
        amount: request.amount,
        description: request.description,
    };

    info!(correlation_id = %command.correlation_id, "handling debit_budget_envelope command");

    let result =
        command_handlers::handle_debit(&command, state.clock.as_ref(), &state.envelopes).await?;

    Ok(Json(CommandResponse::new(result.aggregate_id, &result.stored_events)))
}

/// GET /{budget_envelope_id}?as_of=
#[instrument(skip(state))]
async fn get_budget_envelope(
    State(state): State<AppState>,
    ActingUser(user_id): ActingUser,
    Path(budget_envelope_id): Path<Uuid>,
    Query(query): Query<AsOfQuery>,
) -> Result<Json<BudgetEnvelopeView>, ApiError> {
    let view = query_handlers::get_budget_envelope(
        budget_envelope_id,
        user_id,
        query.as_of,
        &state.envelopes,
    )
    .await?;
    Ok(Json(view))
}

/// Returns the router for the envelope context.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create", post(create))
        .route("/credit", post(credit))
        .route("/debit", post(debit))
        .route("/{budget_envelope_id}", get(get_budget_envelope))
}
