//! Routes for the User bounded context.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use budget_user::application::command_handlers;
use budget_user::application::query_handlers::{self, UserView};
use budget_user::domain::commands;
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{AsOfQuery, CommandResponse};
use crate::auth::ActingUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /sign-up. The password arrives already hashed.
#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    /// The new user identifier.
    pub user_id: Uuid,
    /// Login email.
    pub email: String,
    /// First name.
    pub firstname: String,
    /// Last name.
    pub lastname: String,
    /// Password hash.
    pub password_hash: String,
    /// Whether the terms were accepted.
    pub consent_accepted: bool,
    /// Preferred language tag.
    pub language_preference: String,
}

/// POST /sign-up
#[instrument(skip(state, request), fields(user_id = %request.user_id))]
async fn sign_up(
    State(state): State<AppState>,
    Json(request): Json<SignUpRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::SignUpUser {
        correlation_id: Uuid::new_v4(),
        user_id: request.user_id,
        email: request.email,
        firstname: request.firstname,
        lastname: request.lastname,
        password_hash: request.password_hash,
        consent_accepted: request.consent_accepted,
        language_preference: request.language_preference,
    };

    info!(correlation_id = %command.correlation_id, "handling sign_up command");

    let result = command_handlers::handle_sign_up(
        &command,
        state.clock.as_ref(),
        &state.users,
        state.read_models.user_summaries.as_ref(),
    )
    .await?;

    Ok(Json(CommandResponse::new(result.aggregate_id, &result.stored_events)))
}

/// GET /{user_id}?as_of=
#[instrument(skip(state))]
async fn get_user(
    State(state): State<AppState>,
    ActingUser(acting_user_id): ActingUser,
    Path(user_id): Path<Uuid>,
    Query(query): Query<AsOfQuery>,
) -> Result<Json<UserView>, ApiError> {
    let view = query_handlers::get_user(user_id, acting_user_id, query.as_of, &state.users).await?;
    Ok(Json(view))
}

/// Returns the router for the user context.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sign-up", post(sign_up))
        .route("/{user_id}", get(get_user))
}
