//! Read-side projections of users: a profile summary row per user, and
//! notifications pushed to a channel for account-level events.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use budget_core::error::DomainError;
use budget_core::projection::{ProjectionHandler, ReadModel, ReadModelRepository};
use budget_core::registry::EventTypeRegistry;
use budget_core::repository::StoredEvent;
use budget_projection::is_stale;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::events::UserEventKind;

/// Denormalized view of one user. Carries no password material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    /// The user identifier.
    pub user_id: Uuid,
    /// Login email.
    pub email: String,
    /// First name.
    pub firstname: String,
    /// Last name.
    pub lastname: String,
    /// Preferred language tag.
    pub language_preference: String,
    /// Whether the terms were accepted.
    pub consent_accepted: bool,
    /// Set once the account is deleted.
    pub deleted: bool,
    /// Stream version of the last event folded in.
    pub last_version: i64,
}

impl ReadModel for UserSummary {
    type Key = Uuid;

    fn key(&self) -> Uuid {
        self.user_id
    }
}

/// Maintains [`UserSummary`] rows.
pub struct UserSummaryProjection {
    registry: Arc<EventTypeRegistry<UserEventKind>>,
    views: Arc<dyn ReadModelRepository<UserSummary>>,
}

impl std::fmt::Debug for UserSummaryProjection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserSummaryProjection").finish_non_exhaustive()
    }
}

impl UserSummaryProjection {
    /// Creates the projection over a read-model repository.
    #[must_use]
    pub fn new(
        registry: Arc<EventTypeRegistry<UserEventKind>>,
        views: Arc<dyn ReadModelRepository<UserSummary>>,
    ) -> Self {
        Self { registry, views }
    }

    fn fold(
        existing: Option<UserSummary>,
        kind: UserEventKind,
        stream_version: i64,
    ) -> Option<UserSummary> {
        let mut summary = match (existing, kind) {
            (_, UserEventKind::SignedUp(p)) => UserSummary {
                user_id: p.user_id,
                email: p.email,
                firstname: p.firstname,
                lastname: p.lastname,
                language_preference: p.language_preference,
                consent_accepted: p.consent_accepted,
                deleted: false,
                last_version: stream_version,
            },
            (None, _) => return None,
            (Some(mut summary), UserEventKind::FirstnameChanged(p)) => {
                summary.firstname = p.firstname;
                summary
            }
            (Some(mut summary), UserEventKind::LastnameChanged(p)) => {
                summary.lastname = p.lastname;
                summary
            }
            (Some(mut summary), UserEventKind::LanguagePreferenceUpdated(p)) => {
                summary.language_preference = p.language_preference;
                summary
            }
            (Some(mut summary), UserEventKind::Deleted(_)) => {
                summary.deleted = true;
                summary
            }
            (
                Some(summary),
                UserEventKind::PasswordChanged(_)
                | UserEventKind::PasswordResetRequested(_)
                | UserEventKind::PasswordReset(_),
            ) => summary,
        };
        summary.last_version = stream_version;
        Some(summary)
    }
}

#[async_trait]
impl ProjectionHandler for UserSummaryProjection {
    fn name(&self) -> &'static str {
        "user_summary"
    }

    fn handles(&self, event_type: &str) -> bool {
        self.registry.contains(event_type)
    }

    async fn handle(&self, event: &StoredEvent) -> Result<(), DomainError> {
        let existing = self.views.find_one(&event.aggregate_id).await?;
        if is_stale(existing.as_ref().map(|s| s.last_version), event.stream_version) {
            debug!(
                user_id = %event.aggregate_id,
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
                    user_id = %event.aggregate_id,
                    event_type = %event.event_type,
                    "event for a user with no summary row"
                );
                Ok(())
            }
        }
    }
}

/// Something the user should be told about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Recipient.
    pub user_id: Uuid,
    /// Event that triggered the notification.
    pub event_type: String,
    /// When that event happened.
    pub occurred_at: DateTime<Utc>,
}

/// Delivery of notifications to the outside world (mail, push, ...).
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Delivers one notification.
    async fn notify(&self, notification: Notification) -> Result<(), DomainError>;
}

/// Fans notifications out to in-process subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastNotificationChannel {
    sender: broadcast::Sender<Notification>,
}

impl BroadcastNotificationChannel {
    /// Creates a channel that buffers up to `capacity` notifications per
    /// subscriber.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribes to notifications sent from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl NotificationChannel for BroadcastNotificationChannel {
    async fn notify(&self, notification: Notification) -> Result<(), DomainError> {
        if let Err(broadcast::error::SendError(dropped)) = self.sender.send(notification) {
            debug!(
                user_id = %dropped.user_id,
                event_type = %dropped.event_type,
                "no notification subscribers"
            );
        }
        Ok(())
    }
}

const NOTIFIED_EVENT_TYPES: &[&str] = &[
    "user.signed_up",
    "user.password_changed",
    "user.password_reset_requested",
    "user.password_reset",
    "user.deleted",
];

/// Sends a [`Notification`] for account-level user events. Each event is
/// sent at most once per process, even if it is delivered again.
pub struct UserNotificationProjection {
    channel: Arc<dyn NotificationChannel>,
    notified: Mutex<BTreeMap<Uuid, i64>>,
}

impl std::fmt::Debug for UserNotificationProjection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserNotificationProjection")
            .finish_non_exhaustive()
    }
}

fn poisoned() -> DomainError {
    DomainError::Infrastructure("notification lock poisoned".into())
}

impl UserNotificationProjection {
    /// Creates the projection over a channel.
    #[must_use]
    pub fn new(channel: Arc<dyn NotificationChannel>) -> Self {
        Self {
            channel,
            notified: Mutex::new(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl ProjectionHandler for UserNotificationProjection {
    fn name(&self) -> &'static str {
        "user_notification"
    }

    fn handles(&self, event_type: &str) -> bool {
        NOTIFIED_EVENT_TYPES.contains(&event_type)
    }

    async fn handle(&self, event: &StoredEvent) -> Result<(), DomainError> {
        let last = self
            .notified
            .lock()
            .map_err(|_| poisoned())?
            .get(&event.aggregate_id)
            .copied();
        if is_stale(last, event.stream_version) {
            return Ok(());
        }
        self.channel
            .notify(Notification {
                user_id: event.aggregate_id,
                event_type: event.event_type.clone(),
                occurred_at: event.occurred_at,
            })
            .await?;
        self.notified
            .lock()
            .map_err(|_| poisoned())?
            .insert(event.aggregate_id, event.stream_version);
        Ok(())
    }
}
