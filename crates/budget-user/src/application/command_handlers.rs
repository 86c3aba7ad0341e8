//! Command handlers for the User context.

use std::sync::Arc;

use budget_core::clock::Clock;
use budget_core::error::DomainError;
use budget_core::projection::ReadModelRepository;
use budget_core::repository::StoredEvent;
use budget_event_store::event_sourced_repository::{EventSourcedRepository, EventStoreContext};
use tracing::info;
use uuid::Uuid;

use crate::application::projections::UserSummary;
use crate::domain::aggregates::{SignUpDetails, User};
use crate::domain::commands::{
    ChangeUserFirstname, ChangeUserLastname, ChangeUserPassword, DeleteUser,
    RequestUserPasswordReset, ResetUserPassword, SignUpUser, UpdateUserLanguagePreference,
};
use crate::domain::events::user_event_registry;

/// Repository type the user handlers use.
pub type UserRepository = EventSourcedRepository<User>;

/// Builds the user repository over a store context.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if the event type registry cannot
/// be built.
pub fn user_repository(context: EventStoreContext) -> Result<UserRepository, DomainError> {
    Ok(EventSourcedRepository::new(
        context,
        Arc::new(user_event_registry()?),
    ))
}

/// Result of a successfully handled command.
#[derive(Debug)]
pub struct UserCommandResult {
    /// The aggregate ID affected by the command.
    pub aggregate_id: Uuid,
    /// The stored events produced and persisted.
    pub stored_events: Vec<StoredEvent>,
}

async fn update_user<F>(
    repo: &UserRepository,
    user_id: Uuid,
    operation: F,
) -> Result<UserCommandResult, DomainError>
where
    F: FnOnce(&mut User) -> Result<(), DomainError>,
{
    let mut user = repo.get(user_id, None).await?;
    operation(&mut user)?;
    let stored_events = repo.save(&mut user).await?;
    Ok(UserCommandResult {
        aggregate_id: user_id,
        stored_events,
    })
}

/// Handles the `SignUpUser` command.
///
/// Email uniqueness is checked against the user summaries, so two sign-ups
/// racing for the same address before the projection catches up can both
/// succeed.
///
/// # Errors
///
/// Returns `DomainError::AlreadyExists` if the id or the email is taken,
/// `DomainError::Validation` for bad input, and propagates store errors.
pub async fn handle_sign_up(
    command: &SignUpUser,
    clock: &dyn Clock,
    repo: &UserRepository,
    users: &dyn ReadModelRepository<UserSummary>,
) -> Result<UserCommandResult, DomainError> {
    let taken = users
        .find_all()
        .await?
        .iter()
        .any(|u| !u.deleted && u.email.eq_ignore_ascii_case(&command.email));
    if taken {
        return Err(DomainError::AlreadyExists(format!(
            "email {}",
            command.email
        )));
    }
    let mut user = repo.load(command.user_id, None).await?;
    user.sign_up(
        SignUpDetails {
            email: command.email.clone(),
            firstname: command.firstname.clone(),
            lastname: command.lastname.clone(),
            password_hash: command.password_hash.clone(),
            consent_accepted: command.consent_accepted,
            language_preference: command.language_preference.clone(),
        },
        command.correlation_id,
        clock,
    )?;
    let stored_events = repo.save(&mut user).await?;
    info!(user_id = %command.user_id, "user signed up");
    Ok(UserCommandResult {
        aggregate_id: command.user_id,
        stored_events,
    })
}

/// Handles the `ChangeUserFirstname` command.
///
/// # Errors
///
/// Returns the aggregate's guard and validation errors and propagates
/// store errors, including `DomainError::ConcurrencyConflict`.
pub async fn handle_change_firstname(
    command: &ChangeUserFirstname,
    clock: &dyn Clock,
    repo: &UserRepository,
) -> Result<UserCommandResult, DomainError> {
    update_user(repo, command.user_id, |user| {
        user.change_firstname(
            command.acting_user_id,
            command.firstname.clone(),
            command.correlation_id,
            clock,
        )
    })
    .await
}

/// Handles the `ChangeUserLastname` command.
///
/// # Errors
///
/// Same as [`handle_change_firstname`].
pub async fn handle_change_lastname(
    command: &ChangeUserLastname,
    clock: &dyn Clock,
    repo: &UserRepository,
) -> Result<UserCommandResult, DomainError> {
    update_user(repo, command.user_id, |user| {
        user.change_lastname(
            command.acting_user_id,
            command.lastname.clone(),
            command.correlation_id,
            clock,
        )
    })
    .await
}

/// Handles the `ChangeUserPassword` command.
///
/// # Errors
///
/// Same as [`handle_change_firstname`].
pub async fn handle_change_password(
    command: &ChangeUserPassword,
    clock: &dyn Clock,
    repo: &UserRepository,
) -> Result<UserCommandResult, DomainError> {
    update_user(repo, command.user_id, |user| {
        user.change_password(
            command.acting_user_id,
            command.password_hash.clone(),
            command.correlation_id,
            clock,
        )
    })
    .await
}

/// Handles the `UpdateUserLanguagePreference` command.
///
/// # Errors
///
/// Same as [`handle_change_firstname`].
pub async fn handle_update_language_preference(
    command: &UpdateUserLanguagePreference,
    clock: &dyn Clock,
    repo: &UserRepository,
) -> Result<UserCommandResult, DomainError> {
    update_user(repo, command.user_id, |user| {
        user.update_language_preference(
            command.acting_user_id,
            command.language_preference.clone(),
            command.correlation_id,
            clock,
        )
    })
    .await
}

/// Handles the `RequestUserPasswordReset` command.
///
/// # Errors
///
/// Same as [`handle_change_firstname`].
pub async fn handle_request_password_reset(
    command: &RequestUserPasswordReset,
    clock: &dyn Clock,
    repo: &UserRepository,
) -> Result<UserCommandResult, DomainError> {
    update_user(repo, command.user_id, |user| {
        user.request_password_reset(
            command.password_reset_token.clone(),
            command.expires_at,
            command.correlation_id,
            clock,
        )
    })
    .await
}

/// Handles the `ResetUserPassword` command. The token is checked against
/// the clock's current time.
///
/// # Errors
///
/// Same as [`handle_change_firstname`].
pub async fn handle_reset_password(
    command: &ResetUserPassword,
    clock: &dyn Clock,
    repo: &UserRepository,
) -> Result<UserCommandResult, DomainError> {
    let now = clock.now();
    update_user(repo, command.user_id, |user| {
        user.reset_password(
            &command.password_reset_token,
            command.password_hash.clone(),
            now,
            command.correlation_id,
            clock,
        )
    })
    .await
}

/// Handles the `DeleteUser` command.
///
/// # Errors
///
/// Same as [`handle_change_firstname`].
pub async fn handle_delete(
    command: &DeleteUser,
    clock: &dyn Clock,
    repo: &UserRepository,
) -> Result<UserCommandResult, DomainError> {
    let result = update_user(repo, command.user_id, |user| {
        user.delete(command.acting_user_id, command.correlation_id, clock)
    })
    .await?;
    info!(user_id = %command.user_id, "user deleted");
    Ok(result)
}
