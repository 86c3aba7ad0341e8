//! Query handlers for the User context.

use budget_core::aggregate::AggregateRoot;
use budget_core::error::DomainError;
use budget_core::projection::ReadModelRepository;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::application::command_handlers::UserRepository;
use crate::application::projections::UserSummary;

/// Read-only view of a user's profile.
#[derive(Debug, Serialize)]
pub struct UserView {
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
    /// Whether the account was deleted.
    pub deleted: bool,
    /// Version the view reflects.
    pub version: i64,
}

/// Retrieves a user's own profile, as of `as_of` when given.
///
/// # Errors
///
/// Returns `DomainError::NotOwner` if `acting_user_id` is someone else,
/// `DomainError::AggregateNotFound` if the user did not exist at that time,
/// and propagates reconstitution errors.
pub async fn get_user(
    user_id: Uuid,
    acting_user_id: Uuid,
    as_of: Option<DateTime<Utc>>,
    repo: &UserRepository,
) -> Result<UserView, DomainError> {
    if acting_user_id != user_id {
        return Err(DomainError::NotOwner {
            aggregate_id: user_id,
            user_id: acting_user_id,
        });
    }
    let user = repo.get(user_id, as_of).await?;
    Ok(UserView {
        user_id,
        email: user.email().to_owned(),
        firstname: user.firstname().to_owned(),
        lastname: user.lastname().to_owned(),
        language_preference: user.language_preference().to_owned(),
        consent_accepted: user.consent_accepted(),
        deleted: user.is_deleted(),
        version: user.version(),
    })
}

/// Finds the live account registered under `email`, ignoring case.
///
/// # Errors
///
/// Propagates read-model errors.
pub async fn find_user_by_email(
    email: &str,
    users: &dyn ReadModelRepository<UserSummary>,
) -> Result<Option<UserSummary>, DomainError> {
    Ok(users
        .find_all()
        .await?
        .into_iter()
        .find(|u| !u.deleted && u.email.eq_ignore_ascii_case(email)))
}

#[cfg(test)]
mod tests {
    use budget_projection::read_model::InMemoryReadModelRepository;
    use budget_test_support::{SteppingClock, TestStore};
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::application::command_handlers::{
        handle_change_firstname, handle_sign_up, user_repository,
    };
    use crate::domain::commands::{ChangeUserFirstname, SignUpUser};

    fn summary(email: &str, deleted: bool) -> UserSummary {
        UserSummary {
            user_id: Uuid::new_v4(),
            email: email.to_owned(),
            firstname: "Edsger".to_owned(),
            lastname: "Dijkstra".to_owned(),
            language_preference: "nl".to_owned(),
            consent_accepted: true,
            deleted,
            last_version: 0,
        }
    }

    #[tokio::test]
    async fn test_get_user_as_of_returns_past_profile() {
        // Arrange
        let clock = SteppingClock::new(
            Utc.with_ymd_and_hms(2026, 6, 1, 10, 0, 0).unwrap(),
            Duration::minutes(5),
        );
        let store = TestStore::new();
        let repo = user_repository(store.context.clone()).unwrap();
        let users = InMemoryReadModelRepository::<UserSummary>::new();
        let user_id = Uuid::new_v4();
        handle_sign_up(
            &SignUpUser {
                correlation_id: Uuid::new_v4(),
                user_id,
                email: "barbara@example.com".to_owned(),
                firstname: "Barbara".to_owned(),
                lastname: "Liskov".to_owned(),
                password_hash: "h".to_owned(),
                consent_accepted: true,
                language_preference: "en".to_owned(),
            },
            &clock,
            &repo,
            &users,
        )
        .await
        .unwrap();
        let as_of = clock.peek() - Duration::minutes(1);
        handle_change_firstname(
            &ChangeUserFirstname {
                correlation_id: Uuid::new_v4(),
                user_id,
                acting_user_id: user_id,
                firstname: "Babs".to_owned(),
            },
            &clock,
            &repo,
        )
        .await
        .unwrap();

        // Act
        let past = get_user(user_id, user_id, Some(as_of), &repo).await.unwrap();
        let now = get_user(user_id, user_id, None, &repo).await.unwrap();

        // Assert
        assert_eq!(past.firstname, "Barbara");
        assert_eq!(past.version, 0);
        assert_eq!(now.firstname, "Babs");
        assert_eq!(now.version, 1);
    }

    #[tokio::test]
    async fn test_get_user_for_someone_else_is_rejected() {
        let store = TestStore::new();
        let repo = user_repository(store.context.clone()).unwrap();

        let result = get_user(Uuid::new_v4(), Uuid::new_v4(), None, &repo).await;

        assert!(matches!(result, Err(DomainError::NotOwner { .. })));
    }

    #[tokio::test]
    async fn test_find_by_email_skips_deleted_accounts() {
        let users = InMemoryReadModelRepository::<UserSummary>::new();
        users.save(summary("old@example.com", true)).await.unwrap();
        let live = summary("live@example.com", false);
        users.save(live.clone()).await.unwrap();

        assert_eq!(
            find_user_by_email("LIVE@example.com", &users).await.unwrap(),
            Some(live)
        );
        assert_eq!(find_user_by_email("old@example.com", &users).await.unwrap(), None);
    }
}
