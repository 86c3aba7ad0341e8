//! Domain events for the User context.
//!
//! Every payload carries `user_id`, which is also the aggregate id, so a
//! user's events are sealed with that user's own key.

use budget_core::error::DomainError;
use budget_core::event::EventKind;
use budget_core::registry::{EventSchema, EventTypeRegistry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Emitted when a user signs up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSignedUp {
    /// The user identifier.
    pub user_id: Uuid,
    /// Login email.
    pub email: String,
    /// First name.
    pub firstname: String,
    /// Last name.
    pub lastname: String,
    /// Password hash, computed outside the domain.
    pub password_hash: String,
    /// Whether the terms were accepted.
    pub consent_accepted: bool,
    /// Preferred language tag, e.g. `en`.
    pub language_preference: String,
}

impl EventSchema for UserSignedUp {
    const EVENT_TYPE: &'static str = "user.signed_up";
    const ENCRYPTED_FIELDS: &'static [&'static str] = &["email", "firstname", "lastname"];
}

/// Emitted when a user changes their first name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserFirstnameChanged {
    /// The user identifier.
    pub user_id: Uuid,
    /// New first name.
    pub firstname: String,
}

impl EventSchema for UserFirstnameChanged {
    const EVENT_TYPE: &'static str = "user.firstname_changed";
    const ENCRYPTED_FIELDS: &'static [&'static str] = &["firstname"];
}

/// Emitted when a user changes their last name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserLastnameChanged {
    /// The user identifier.
    pub user_id: Uuid,
    /// New last name.
    pub lastname: String,
}

impl EventSchema for UserLastnameChanged {
    const EVENT_TYPE: &'static str = "user.lastname_changed";
    const ENCRYPTED_FIELDS: &'static [&'static str] = &["lastname"];
}

/// Emitted when a signed-in user changes their password.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPasswordChanged {
    /// The user identifier.
    pub user_id: Uuid,
    /// New password hash.
    pub password_hash: String,
}

impl EventSchema for UserPasswordChanged {
    const EVENT_TYPE: &'static str = "user.password_changed";
}

/// Emitted when a user picks another language.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserLanguagePreferenceUpdated {
    /// The user identifier.
    pub user_id: Uuid,
    /// New language tag.
    pub language_preference: String,
}

impl EventSchema for UserLanguagePreferenceUpdated {
    const EVENT_TYPE: &'static str = "user.language_preference_updated";
}

/// Emitted when a password reset is requested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPasswordResetRequested {
    /// The user identifier.
    pub user_id: Uuid,
    /// Token that must be presented to reset the password.
    pub password_reset_token: String,
    /// When the token stops being accepted.
    pub expires_at: DateTime<Utc>,
}

impl EventSchema for UserPasswordResetRequested {
    const EVENT_TYPE: &'static str = "user.password_reset_requested";
    const ENCRYPTED_FIELDS: &'static [&'static str] = &["password_reset_token"];
}

/// Emitted when a password is reset with a valid token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPasswordReset {
    /// The user identifier.
    pub user_id: Uuid,
    /// New password hash.
    pub password_hash: String,
}

impl EventSchema for UserPasswordReset {
    const EVENT_TYPE: &'static str = "user.password_reset";
}

/// Emitted when a user deletes their account. Terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDeleted {
    /// The user identifier.
    pub user_id: Uuid,
}

impl EventSchema for UserDeleted {
    const EVENT_TYPE: &'static str = "user.deleted";
}

/// Event payload variants for the User aggregate.
#[derive(Debug, Clone)]
pub enum UserEventKind {
    /// The user signed up.
    SignedUp(UserSignedUp),
    /// The first name changed.
    FirstnameChanged(UserFirstnameChanged),
    /// The last name changed.
    LastnameChanged(UserLastnameChanged),
    /// The password changed.
    PasswordChanged(UserPasswordChanged),
    /// The language preference changed.
    LanguagePreferenceUpdated(UserLanguagePreferenceUpdated),
    /// A password reset was requested.
    PasswordResetRequested(UserPasswordResetRequested),
    /// The password was reset.
    PasswordReset(UserPasswordReset),
    /// The account was deleted.
    Deleted(UserDeleted),
}

impl EventKind for UserEventKind {
    fn event_type(&self) -> &'static str {
        match self {
            Self::SignedUp(_) => UserSignedUp::EVENT_TYPE,
            Self::FirstnameChanged(_) => UserFirstnameChanged::EVENT_TYPE,
            Self::LastnameChanged(_) => UserLastnameChanged::EVENT_TYPE,
            Self::PasswordChanged(_) => UserPasswordChanged::EVENT_TYPE,
            Self::LanguagePreferenceUpdated(_) => UserLanguagePreferenceUpdated::EVENT_TYPE,
            Self::PasswordResetRequested(_) => UserPasswordResetRequested::EVENT_TYPE,
            Self::PasswordReset(_) => UserPasswordReset::EVENT_TYPE,
            Self::Deleted(_) => UserDeleted::EVENT_TYPE,
        }
    }

    fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Self::SignedUp(p) => serde_json::to_value(p),
            Self::FirstnameChanged(p) => serde_json::to_value(p),
            Self::LastnameChanged(p) => serde_json::to_value(p),
            Self::PasswordChanged(p) => serde_json::to_value(p),
            Self::LanguagePreferenceUpdated(p) => serde_json::to_value(p),
            Self::PasswordResetRequested(p) => serde_json::to_value(p),
            Self::PasswordReset(p) => serde_json::to_value(p),
            Self::Deleted(p) => serde_json::to_value(p),
        }
    }
}

/// Builds the registry of User event types.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if two payloads share an event type.
pub fn user_event_registry() -> Result<EventTypeRegistry<UserEventKind>, DomainError> {
    EventTypeRegistry::builder()
        .register(UserEventKind::SignedUp)
        .register(UserEventKind::FirstnameChanged)
        .register(UserEventKind::LastnameChanged)
        .register(UserEventKind::PasswordChanged)
        .register(UserEventKind::LanguagePreferenceUpdated)
        .register(UserEventKind::PasswordResetRequested)
        .register(UserEventKind::PasswordReset)
        .register(UserEventKind::Deleted)
        .build()
}
