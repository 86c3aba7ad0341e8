//! The User aggregate.
//!
//! Users act only on themselves: every operation that takes an acting
//! user id fails with `NotOwner` for anyone else. Password resets are the
//! exception, since the requester is not signed in; the reset token is the
//! proof of identity there.

use budget_core::aggregate::{AggregateRoot, PendingEvents};
use budget_core::clock::Clock;
use budget_core::error::DomainError;
use budget_core::event::DomainEvent;
use budget_core::repository::EMPTY_STREAM_VERSION;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{
    UserDeleted, UserEventKind, UserFirstnameChanged, UserLanguagePreferenceUpdated,
    UserLastnameChanged, UserPasswordChanged, UserPasswordReset, UserPasswordResetRequested,
    UserSignedUp,
};

const MAX_NAME_LEN: usize = 255;

/// Profile data given at sign-up.
#[derive(Debug, Clone)]
pub struct SignUpDetails {
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

/// A registered person.
#[derive(Debug, Serialize, Deserialize)]
pub struct User {
    /// Aggregate identifier, also the user id.
    pub id: Uuid,
    version: i64,
    email: String,
    firstname: String,
    lastname: String,
    password_hash: String,
    consent_accepted: bool,
    language_preference: String,
    password_reset_token: Option<String>,
    password_reset_expires_at: Option<DateTime<Utc>>,
    is_deleted: bool,
    #[serde(skip)]
    pending: PendingEvents<UserEventKind>,
}

fn validate_name(field: &str, value: &str) -> Result<(), DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_NAME_LEN {
        return Err(DomainError::Validation(format!(
            "{field} must be 1 to {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), DomainError> {
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'));
    if valid && !email.contains(char::is_whitespace) {
        Ok(())
    } else {
        Err(DomainError::Validation(format!("invalid email: {email:?}")))
    }
}

fn validate_language(tag: &str) -> Result<(), DomainError> {
    if (2..=5).contains(&tag.len()) && tag.chars().all(|c| c.is_ascii_alphabetic() || c == '-') {
        Ok(())
    } else {
        Err(DomainError::Validation(format!("invalid language: {tag:?}")))
    }
}

fn validate_hash(hash: &str) -> Result<(), DomainError> {
    if hash.is_empty() {
        return Err(DomainError::Validation("password hash is empty".into()));
    }
    Ok(())
}

impl User {
    /// Login email.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// First name.
    #[must_use]
    pub fn firstname(&self) -> &str {
        &self.firstname
    }

    /// Last name.
    #[must_use]
    pub fn lastname(&self) -> &str {
        &self.lastname
    }

    /// Current password hash.
    #[must_use]
    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    /// Preferred language tag.
    #[must_use]
    pub fn language_preference(&self) -> &str {
        &self.language_preference
    }

    /// Whether the terms were accepted.
    #[must_use]
    pub fn consent_accepted(&self) -> bool {
        self.consent_accepted
    }

    /// Returns `true` once the account has been deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    /// Registers the user.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AlreadyExists` if the user signed up before and
    /// `DomainError::Validation` for malformed details or missing consent.
    pub fn sign_up(
        &mut self,
        details: SignUpDetails,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if self.exists() {
            return Err(DomainError::AlreadyExists(format!("user {}", self.id)));
        }
        validate_email(&details.email)?;
        validate_name("firstname", &details.firstname)?;
        validate_name("lastname", &details.lastname)?;
        validate_hash(&details.password_hash)?;
        validate_language(&details.language_preference)?;
        if !details.consent_accepted {
            return Err(DomainError::Validation("consent is required".into()));
        }
        self.raise(
            UserEventKind::SignedUp(UserSignedUp {
                user_id: self.id,
                email: details.email,
                firstname: details.firstname,
                lastname: details.lastname,
                password_hash: details.password_hash,
                consent_accepted: details.consent_accepted,
                language_preference: details.language_preference,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Changes the first name.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound`, `DomainError::AggregateDeleted`
    /// or `DomainError::NotOwner` from the guards, and
    /// `DomainError::Validation` for a blank name.
    pub fn change_firstname(
        &mut self,
        acting_user_id: Uuid,
        firstname: String,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_self(acting_user_id)?;
        validate_name("firstname", &firstname)?;
        self.raise(
            UserEventKind::FirstnameChanged(UserFirstnameChanged {
                user_id: self.id,
                firstname,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Changes the last name.
    ///
    /// # Errors
    ///
    /// Same as [`User::change_firstname`].
    pub fn change_lastname(
        &mut self,
        acting_user_id: Uuid,
        lastname: String,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_self(acting_user_id)?;
        validate_name("lastname", &lastname)?;
        self.raise(
            UserEventKind::LastnameChanged(UserLastnameChanged {
                user_id: self.id,
                lastname,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Replaces the password hash.
    ///
    /// # Errors
    ///
    /// Guard errors, and `DomainError::Validation` for an empty hash.
    pub fn change_password(
        &mut self,
        acting_user_id: Uuid,
        password_hash: String,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_self(acting_user_id)?;
        validate_hash(&password_hash)?;
        self.raise(
            UserEventKind::PasswordChanged(UserPasswordChanged {
                user_id: self.id,
                password_hash,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Changes the preferred language.
    ///
    /// # Errors
    ///
    /// Guard errors, and `DomainError::Validation` for a malformed tag.
    pub fn update_language_preference(
        &mut self,
        acting_user_id: Uuid,
        language_preference: String,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_self(acting_user_id)?;
        validate_language(&language_preference)?;
        self.raise(
            UserEventKind::LanguagePreferenceUpdated(UserLanguagePreferenceUpdated {
                user_id: self.id,
                language_preference,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Records a reset token. A later request replaces an earlier token.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` or
    /// `DomainError::AggregateDeleted`, and `DomainError::Validation` for an
    /// empty token.
    pub fn request_password_reset(
        &mut self,
        password_reset_token: String,
        expires_at: DateTime<Utc>,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_active()?;
        if password_reset_token.is_empty() {
            return Err(DomainError::Validation("reset token is empty".into()));
        }
        self.raise(
            UserEventKind::PasswordResetRequested(UserPasswordResetRequested {
                user_id: self.id,
                password_reset_token,
                expires_at,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Sets a new password hash if `token` is the pending reset token and
    /// has not expired at `now`. The token can be used once.
    ///
    /// # Errors
    ///
    /// Same guards as [`User::request_password_reset`], and
    /// `DomainError::Validation` for a wrong, used or expired token.
    pub fn reset_password(
        &mut self,
        token: &str,
        password_hash: String,
        now: DateTime<Utc>,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_active()?;
        let valid = match (&self.password_reset_token, self.password_reset_expires_at) {
            (Some(expected), Some(expires_at)) => expected == token && now <= expires_at,
            _ => false,
        };
        if !valid {
            return Err(DomainError::Validation(
                "invalid or expired reset token".into(),
            ));
        }
        validate_hash(&password_hash)?;
        self.raise(
            UserEventKind::PasswordReset(UserPasswordReset {
                user_id: self.id,
                password_hash,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Deletes the account. Every later mutation fails.
    ///
    /// # Errors
    ///
    /// Guard errors.
    pub fn delete(
        &mut self,
        acting_user_id: Uuid,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_self(acting_user_id)?;
        self.raise(
            UserEventKind::Deleted(UserDeleted { user_id: self.id }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), DomainError> {
        if !self.exists() {
            return Err(DomainError::AggregateNotFound(self.id));
        }
        if self.is_deleted {
            return Err(DomainError::AggregateDeleted(self.id));
        }
        Ok(())
    }

    fn ensure_self(&self, acting_user_id: Uuid) -> Result<(), DomainError> {
        self.ensure_active()?;
        if acting_user_id != self.id {
            return Err(DomainError::NotOwner {
                aggregate_id: self.id,
                user_id: acting_user_id,
            });
        }
        Ok(())
    }
}

impl AggregateRoot for User {
    type Event = UserEventKind;

    const AGGREGATE_TYPE: &'static str = "user";

    fn empty(id: Uuid) -> Self {
        Self {
            id,
            version: EMPTY_STREAM_VERSION,
            email: String::new(),
            firstname: String::new(),
            lastname: String::new(),
            password_hash: String::new(),
            consent_accepted: false,
            language_preference: String::new(),
            password_reset_token: None,
            password_reset_expires_at: None,
            is_deleted: false,
            pending: PendingEvents::default(),
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &DomainEvent<Self::Event>) {
        match &event.kind {
            UserEventKind::SignedUp(p) => {
                self.email.clone_from(&p.email);
                self.firstname.clone_from(&p.firstname);
                self.lastname.clone_from(&p.lastname);
                self.password_hash.clone_from(&p.password_hash);
                self.consent_accepted = p.consent_accepted;
                self.language_preference.clone_from(&p.language_preference);
            }
            UserEventKind::FirstnameChanged(p) => self.firstname.clone_from(&p.firstname),
            UserEventKind::LastnameChanged(p) => self.lastname.clone_from(&p.lastname),
            UserEventKind::PasswordChanged(p) => self.password_hash.clone_from(&p.password_hash),
            UserEventKind::LanguagePreferenceUpdated(p) => {
                self.language_preference.clone_from(&p.language_preference);
            }
            UserEventKind::PasswordResetRequested(p) => {
                self.password_reset_token = Some(p.password_reset_token.clone());
                self.password_reset_expires_at = Some(p.expires_at);
            }
            UserEventKind::PasswordReset(p) => {
                self.password_hash.clone_from(&p.password_hash);
                self.password_reset_token = None;
                self.password_reset_expires_at = None;
            }
            UserEventKind::Deleted(_) => self.is_deleted = true,
        }
        self.version = event.metadata.stream_version;
    }

    fn pending_events(&self) -> &PendingEvents<Self::Event> {
        &self.pending
    }

    fn pending_events_mut(&mut self) -> &mut PendingEvents<Self::Event> {
        &mut self.pending
    }

    fn key_owner(&self) -> Uuid {
        self.id
    }
}
