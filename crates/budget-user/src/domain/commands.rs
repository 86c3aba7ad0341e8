//! Commands for the User context.

use budget_core::command::Command;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Command to register a new user.
#[derive(Debug, Clone)]
pub struct SignUpUser {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The new user identifier.
    pub user_id: Uuid,
    /// Login email.
    pub email: String,
    /// First name.
    pub firstname: String,
    /// Last name.
    pub lastname: String,
    /// Password hash, computed by the caller.
    pub password_hash: String,
    /// Whether the terms were accepted.
    pub consent_accepted: bool,
    /// Preferred language tag.
    pub language_preference: String,
}

impl Command for SignUpUser {
    fn command_type(&self) -> &'static str {
        "user.sign_up"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn acting_user_id(&self) -> Uuid {
        self.user_id
    }
}

/// Command to change a user's first name.
#[derive(Debug, Clone)]
pub struct ChangeUserFirstname {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The user being changed.
    pub user_id: Uuid,
    /// Who issued the command.
    pub acting_user_id: Uuid,
    /// New first name.
    pub firstname: String,
}

impl Command for ChangeUserFirstname {
    fn command_type(&self) -> &'static str {
        "user.change_firstname"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn acting_user_id(&self) -> Uuid {
        self.acting_user_id
    }
}

/// Command to change a user's last name.
#[derive(Debug, Clone)]
pub struct ChangeUserLastname {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The user being changed.
    pub user_id: Uuid,
    /// Who issued the command.
    pub acting_user_id: Uuid,
    /// New last name.
    pub lastname: String,
}

impl Command for ChangeUserLastname {
    fn command_type(&self) -> &'static str {
        "user.change_lastname"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn acting_user_id(&self) -> Uuid {
        self.acting_user_id
    }
}

/// Command to change a user's password.
#[derive(Debug, Clone)]
pub struct ChangeUserPassword {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The user being changed.
    pub user_id: Uuid,
    /// Who issued the command.
    pub acting_user_id: Uuid,
    /// New password hash.
    pub password_hash: String,
}

impl Command for ChangeUserPassword {
    fn command_type(&self) -> &'static str {
        "user.change_password"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn acting_user_id(&self) -> Uuid {
        self.acting_user_id
    }
}

/// Command to change a user's preferred language.
#[derive(Debug, Clone)]
pub struct UpdateUserLanguagePreference {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The user being changed.
    pub user_id: Uuid,
    /// Who issued the command.
    pub acting_user_id: Uuid,
    /// New language tag.
    pub language_preference: String,
}

impl Command for UpdateUserLanguagePreference {
    fn command_type(&self) -> &'static str {
        "user.update_language_preference"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn acting_user_id(&self) -> Uuid {
        self.acting_user_id
    }
}

/// Command to issue a password reset token.
///
/// Sent without a signed-in user; the acting user is the target.
#[derive(Debug, Clone)]
pub struct RequestUserPasswordReset {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The user who forgot their password.
    pub user_id: Uuid,
    /// Token to hand out of band.
    pub password_reset_token: String,
    /// When the token expires.
    pub expires_at: DateTime<Utc>,
}

impl Command for RequestUserPasswordReset {
    fn command_type(&self) -> &'static str {
        "user.request_password_reset"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn acting_user_id(&self) -> Uuid {
        self.user_id
    }
}

/// Command to set a new password with a reset token.
#[derive(Debug, Clone)]
pub struct ResetUserPassword {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The user resetting their password.
    pub user_id: Uuid,
    /// Token from the reset request.
    pub password_reset_token: String,
    /// New password hash.
    pub password_hash: String,
}

impl Command for ResetUserPassword {
    fn command_type(&self) -> &'static str {
        "user.reset_password"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn acting_user_id(&self) -> Uuid {
        self.user_id
    }
}

/// Command to delete a user account.
#[derive(Debug, Clone)]
pub struct DeleteUser {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The user being deleted.
    pub user_id: Uuid,
    /// Who issued the command.
    pub acting_user_id: Uuid,
}

impl Command for DeleteUser {
    fn command_type(&self) -> &'static str {
        "user.delete"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn acting_user_id(&self) -> Uuid {
        self.acting_user_id
    }
}
