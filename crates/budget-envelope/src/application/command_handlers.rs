//! Command handlers for the BudgetEnvelope context.

use std::sync::Arc;

use budget_core::aggregate::AggregateRoot;
use budget_core::clock::Clock;
use budget_core::error::DomainError;
use budget_core::repository::StoredEvent;
use budget_event_store::event_sourced_repository::{EventSourcedRepository, EventStoreContext};
use tracing::debug;
use uuid::Uuid;

use crate::domain::aggregates::BudgetEnvelope;
use crate::domain::commands::{
    ChangeBudgetEnvelopeTargetedAmount, CreateBudgetEnvelope, CreditBudgetEnvelope,
    DebitBudgetEnvelope, DeleteBudgetEnvelope, RenameBudgetEnvelope, RewindBudgetEnvelope,
};
use crate::domain::events::budget_envelope_event_registry;

/// Repository type the envelope handlers use.
pub type BudgetEnvelopeRepository = EventSourcedRepository<BudgetEnvelope>;

/// Builds the envelope repository over a store context.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if the event type registry cannot
/// be built.
pub fn budget_envelope_repository(
    context: EventStoreContext,
) -> Result<BudgetEnvelopeRepository, DomainError> {
    Ok(EventSourcedRepository::new(
        context,
        Arc::new(budget_envelope_event_registry()?),
    ))
}

/// Result of a successfully handled command.
#[derive(Debug)]
pub struct BudgetEnvelopeCommandResult {
    /// The aggregate ID affected by the command.
    pub aggregate_id: Uuid,
    /// The stored events produced and persisted.
    pub stored_events: Vec<StoredEvent>,
}

async fn update_envelope<F>(
    repo: &BudgetEnvelopeRepository,
    budget_envelope_id: Uuid,
    operation: F,
) -> Result<BudgetEnvelopeCommandResult, DomainError>
where
    F: FnOnce(&mut BudgetEnvelope) -> Result<(), DomainError>,
{
    let mut envelope = repo.get(budget_envelope_id, None).await?;
    operation(&mut envelope)?;
    let stored_events = repo.save(&mut envelope).await?;
    Ok(BudgetEnvelopeCommandResult {
        aggregate_id: budget_envelope_id,
        stored_events,
    })
}

/// Handles the `CreateBudgetEnvelope` command.
///
/// # Errors
///
/// Returns `DomainError::AlreadyExists` if the id is taken,
/// `DomainError::Validation` for bad input, and propagates store errors.
pub async fn handle_create(
    command: &CreateBudgetEnvelope,
    clock: &dyn Clock,
    repo: &BudgetEnvelopeRepository,
) -> Result<BudgetEnvelopeCommandResult, DomainError> {
    let mut envelope = repo.load(command.budget_envelope_id, None).await?;
    envelope.create(
        command.user_id,
        command.name.clone(),
        command.targeted_amount,
        command.currency.clone(),
        command.correlation_id,
        clock,
    )?;
    let stored_events = repo.save(&mut envelope).await?;
    Ok(BudgetEnvelopeCommandResult {
        aggregate_id: command.budget_envelope_id,
        stored_events,
    })
}

/// Handles the `CreditBudgetEnvelope` command.
///
/// # Errors
///
/// Returns the aggregate's guard and validation errors and propagates
/// store errors, including `DomainError::ConcurrencyConflict`.
pub async fn handle_credit(
    command: &CreditBudgetEnvelope,
    clock: &dyn Clock,
    repo: &BudgetEnvelopeRepository,
) -> Result<BudgetEnvelopeCommandResult, DomainError> {
    update_envelope(repo, command.budget_envelope_id, |envelope| {
        envelope.credit(
            command.user_id,
            command.amount,
            command.description.clone(),
            command.correlation_id,
            clock,
        )
    })
    .await
}

/// Handles the `DebitBudgetEnvelope` command.
///
/// # Errors
///
/// Same as [`handle_credit`].
pub async fn handle_debit(
    command: &DebitBudgetEnvelope,
    clock: &dyn Clock,
    repo: &BudgetEnvelopeRepository,
) -> Result<BudgetEnvelopeCommandResult, DomainError> {
    update_envelope(repo, command.budget_envelope_id, |envelope| {
        envelope.debit(
            command.user_id,
            command.amount,
            command.description.clone(),
            command.correlation_id,
            clock,
        )
    })
    .await
}

/// Handles the `RenameBudgetEnvelope` command.
///
/// # Errors
///
/// Same as [`handle_credit`].
pub async fn handle_rename(
    command: &RenameBudgetEnvelope,
    clock: &dyn Clock,
    repo: &BudgetEnvelopeRepository,
) -> Result<BudgetEnvelopeCommandResult, DomainError> {
    update_envelope(repo, command.budget_envelope_id, |envelope| {
        envelope.rename(
            command.user_id,
            command.name.clone(),
            command.correlation_id,
            clock,
        )
    })
    .await
}

/// Handles the `ChangeBudgetEnvelopeTargetedAmount` command.
///
/// # Errors
///
/// Same as [`handle_credit`].
pub async fn handle_change_targeted_amount(
    command: &ChangeBudgetEnvelopeTargetedAmount,
    clock: &dyn Clock,
    repo: &BudgetEnvelopeRepository,
) -> Result<BudgetEnvelopeCommandResult, DomainError> {
    update_envelope(repo, command.budget_envelope_id, |envelope| {
        envelope.change_targeted_amount(
            command.user_id,
            command.targeted_amount,
            command.correlation_id,
            clock,
        )
    })
    .await
}

/// Handles the `DeleteBudgetEnvelope` command.
///
/// # Errors
///
/// Same as [`handle_credit`].
pub async fn handle_delete(
    command: &DeleteBudgetEnvelope,
    clock: &dyn Clock,
    repo: &BudgetEnvelopeRepository,
) -> Result<BudgetEnvelopeCommandResult, DomainError> {
    update_envelope(repo, command.budget_envelope_id, |envelope| {
        envelope.delete(command.user_id, command.correlation_id, clock)
    })
    .await
}

/// Handles the `RewindBudgetEnvelope` command: reconstitutes the envelope
/// as it stood at `as_of` and records that state as the current one.
///
/// # Errors
///
/// Same as [`handle_credit`]; `DomainError::Validation` if the envelope did
/// not exist at `as_of`.
pub async fn handle_rewind(
    command: &RewindBudgetEnvelope,
    clock: &dyn Clock,
    repo: &BudgetEnvelopeRepository,
) -> Result<BudgetEnvelopeCommandResult, DomainError> {
    let past = repo
        .load(command.budget_envelope_id, Some(command.as_of))
        .await?;
    debug!(
        budget_envelope_id = %command.budget_envelope_id,
        as_of = %command.as_of,
        past_version = past.version(),
        "rewinding envelope"
    );
    update_envelope(repo, command.budget_envelope_id, |envelope| {
        envelope.rewind(
            command.user_id,
            &past,
            command.as_of,
            command.correlation_id,
            clock,
        )
    })
    .await
}

#[cfg(test)]
mod tests {
    use budget_core::clock::SystemClock;
    use budget_core::money::{Amount, Currency};
    use budget_event_store::event_sourced_repository::SnapshotPolicy;
    use budget_test_support::{SteppingClock, TestStore};
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    fn amount(raw: &str) -> Amount {
        raw.parse().unwrap()
    }

    fn create(envelope_id: Uuid, user_id: Uuid) -> CreateBudgetEnvelope {
        CreateBudgetEnvelope {
            correlation_id: Uuid::new_v4(),
            budget_envelope_id: envelope_id,
            user_id,
            name: "Holidays".to_owned(),
            targeted_amount: amount("500"),
            currency: Currency::new("EUR").unwrap(),
        }
    }

    fn credit(envelope_id: Uuid, user_id: Uuid, raw: &str) -> CreditBudgetEnvelope {
        CreditBudgetEnvelope {
            correlation_id: Uuid::new_v4(),
            budget_envelope_id: envelope_id,
            user_id,
            amount: amount(raw),
            description: format!("saving {raw}"),
        }
    }

    #[tokio::test]
    async fn test_create_then_credit_persists_encrypted_events() {
        // Arrange
        let store = TestStore::new();
        let repo = budget_envelope_repository(store.context.clone()).unwrap();
        let envelope_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        // Act
        handle_create(&create(envelope_id, user_id), &SystemClock, &repo)
            .await
            .unwrap();
        let result = handle_credit(&credit(envelope_id, user_id, "120"), &SystemClock, &repo)
            .await
            .unwrap();

        // Assert
        assert_eq!(result.stored_events.len(), 1);
        assert_eq!(result.stored_events[0].payload["amount"], "120.00");
        let raw = store.raw_stream(envelope_id);
        assert_eq!(raw.len(), 2);
        assert_ne!(raw[1].payload["amount"], "120.00");
        assert_ne!(raw[0].payload["name"], "Holidays");
        let envelope = repo.get(envelope_id, None).await.unwrap();
        assert_eq!(envelope.current_amount(), amount("120"));
        assert_eq!(store.publisher.published_types(), vec![
            "budget_envelope.created",
            "budget_envelope.credited",
        ]);
    }

    #[tokio::test]
    async fn test_creating_twice_is_rejected() {
        let store = TestStore::new();
        let repo = budget_envelope_repository(store.context.clone()).unwrap();
        let envelope_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        handle_create(&create(envelope_id, user_id), &SystemClock, &repo)
            .await
            .unwrap();

        let again = handle_create(&create(envelope_id, user_id), &SystemClock, &repo).await;

        assert!(matches!(again, Err(DomainError::AlreadyExists(_))));
        assert_eq!(store.raw_stream(envelope_id).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_debit_appends_nothing() {
        let store = TestStore::new();
        let repo = budget_envelope_repository(store.context.clone()).unwrap();
        let envelope_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        handle_create(&create(envelope_id, user_id), &SystemClock, &repo)
            .await
            .unwrap();

        let result = handle_debit(
            &DebitBudgetEnvelope {
                correlation_id: Uuid::new_v4(),
                budget_envelope_id: envelope_id,
                user_id,
                amount: amount("1"),
                description: String::new(),
            },
            &SystemClock,
            &repo,
        )
        .await;

        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert_eq!(store.raw_stream(envelope_id).len(), 1);
    }

    #[tokio::test]
    async fn test_rewind_restores_balance_from_the_past() {
        // Arrange
        let start = Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap();
        let clock = SteppingClock::new(start, Duration::minutes(10));
        let store = TestStore::with(SnapshotPolicy::Every(2), std::sync::Arc::new(SystemClock));
        let repo = budget_envelope_repository(store.context.clone()).unwrap();
        let envelope_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        handle_create(&create(envelope_id, user_id), &clock, &repo)
            .await
            .unwrap();
        handle_credit(&credit(envelope_id, user_id, "100"), &clock, &repo)
            .await
            .unwrap();
        let as_of = clock.peek() - Duration::minutes(1);
        handle_credit(&credit(envelope_id, user_id, "200"), &clock, &repo)
            .await
            .unwrap();
        handle_rename(
            &RenameBudgetEnvelope {
                correlation_id: Uuid::new_v4(),
                budget_envelope_id: envelope_id,
                user_id,
                name: "Trip".to_owned(),
            },
            &clock,
            &repo,
        )
        .await
        .unwrap();

        // Act
        let result = handle_rewind(
            &RewindBudgetEnvelope {
                correlation_id: Uuid::new_v4(),
                budget_envelope_id: envelope_id,
                user_id,
                as_of,
            },
            &clock,
            &repo,
        )
        .await
        .unwrap();

        // Assert
        assert_eq!(result.stored_events[0].event_type, "budget_envelope.rewound");
        assert_eq!(result.stored_events[0].stream_version, 4);
        let envelope = repo.get(envelope_id, None).await.unwrap();
        assert_eq!(envelope.current_amount(), amount("100"));
        assert_eq!(envelope.name(), "Holidays");
        assert_eq!(envelope.version(), 4);
    }

    #[tokio::test]
    async fn test_rewind_before_creation_is_rejected() {
        let store = TestStore::new();
        let repo = budget_envelope_repository(store.context.clone()).unwrap();
        let envelope_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let before = Utc::now() - Duration::days(1);
        handle_create(&create(envelope_id, user_id), &SystemClock, &repo)
            .await
            .unwrap();

        let result = handle_rewind(
            &RewindBudgetEnvelope {
                correlation_id: Uuid::new_v4(),
                budget_envelope_id: envelope_id,
                user_id,
                as_of: before,
            },
            &SystemClock,
            &repo,
        )
        .await;

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_delete_then_credit_fails_with_deleted() {
        let store = TestStore::new();
        let repo = budget_envelope_repository(store.context.clone()).unwrap();
        let envelope_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        handle_create(&create(envelope_id, user_id), &SystemClock, &repo)
            .await
            .unwrap();
        handle_delete(
            &DeleteBudgetEnvelope {
                correlation_id: Uuid::new_v4(),
                budget_envelope_id: envelope_id,
                user_id,
            },
            &SystemClock,
            &repo,
        )
        .await
        .unwrap();

        let result = handle_credit(&credit(envelope_id, user_id, "1"), &SystemClock, &repo).await;

        assert!(matches!(result, Err(DomainError::AggregateDeleted(_))));
        assert_eq!(store.raw_stream(envelope_id).len(), 2);
    }

    #[tokio::test]
    async fn test_change_targeted_amount_through_handler() {
        let store = TestStore::new();
        let repo = budget_envelope_repository(store.context.clone()).unwrap();
        let envelope_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        handle_create(&create(envelope_id, user_id), &SystemClock, &repo)
            .await
            .unwrap();

        handle_change_targeted_amount(
            &ChangeBudgetEnvelopeTargetedAmount {
                correlation_id: Uuid::new_v4(),
                budget_envelope_id: envelope_id,
                user_id,
                targeted_amount: amount("750"),
            },
            &SystemClock,
            &repo,
        )
        .await
        .unwrap();

        let envelope = repo.get(envelope_id, None).await.unwrap();
        assert_eq!(envelope.targeted_amount(), amount("750"));
    }
}
