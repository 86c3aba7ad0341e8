//! Query handlers for the BudgetEnvelope context.

use budget_core::aggregate::AggregateRoot;
use budget_core::error::DomainError;
use budget_core::money::{Amount, Currency};
use budget_core::projection::ReadModelRepository;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::application::command_handlers::BudgetEnvelopeRepository;
use crate::application::projections::{BudgetEnvelopeLedgerEntry, BudgetEnvelopeSummary};

/// Read-only view of an envelope.
#[derive(Debug, Serialize)]
pub struct BudgetEnvelopeView {
    /// The envelope identifier.
    pub budget_envelope_id: Uuid,
    /// Display name.
    pub name: String,
    /// The most the envelope may hold.
    pub targeted_amount: Amount,
    /// What the envelope holds.
    pub current_amount: Amount,
    /// Envelope currency.
    pub currency: Option<Currency>,
    /// Whether the envelope was deleted.
    pub deleted: bool,
    /// Version the view reflects.
    pub version: i64,
}

/// Retrieves an envelope, as of `as_of` when given.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the envelope did not exist
/// at that time, `DomainError::NotOwner` if it belongs to someone other
/// than `user_id`, and propagates reconstitution errors.
pub async fn get_budget_envelope(
    budget_envelope_id: Uuid,
    user_id: Uuid,
    as_of: Option<DateTime<Utc>>,
    repo: &BudgetEnvelopeRepository,
) -> Result<BudgetEnvelopeView, DomainError> {
    let envelope = repo.get(budget_envelope_id, as_of).await?;
    if envelope.user_id() != user_id {
        return Err(DomainError::NotOwner {
            aggregate_id: budget_envelope_id,
            user_id,
        });
    }
    Ok(BudgetEnvelopeView {
        budget_envelope_id,
        name: envelope.name().to_owned(),
        targeted_amount: envelope.targeted_amount(),
        current_amount: envelope.current_amount(),
        currency: envelope.currency().cloned(),
        deleted: envelope.is_deleted(),
        version: envelope.version(),
    })
}

/// Lists a user's envelopes that are not deleted, by name.
///
/// # Errors
///
/// Propagates read-model errors.
pub async fn list_budget_envelopes(
    user_id: Uuid,
    views: &dyn ReadModelRepository<BudgetEnvelopeSummary>,
) -> Result<Vec<BudgetEnvelopeSummary>, DomainError> {
    let mut envelopes: Vec<_> = views
        .find_all()
        .await?
        .into_iter()
        .filter(|s| s.user_id == user_id && !s.deleted)
        .collect();
    envelopes.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(envelopes)
}

/// Returns the balance movements of one envelope, oldest first.
///
/// # Errors
///
/// Propagates read-model errors.
pub async fn get_budget_envelope_ledger(
    budget_envelope_id: Uuid,
    user_id: Uuid,
    entries: &dyn ReadModelRepository<BudgetEnvelopeLedgerEntry>,
) -> Result<Vec<BudgetEnvelopeLedgerEntry>, DomainError> {
    Ok(entries
        .find_all()
        .await?
        .into_iter()
        .filter(|e| e.budget_envelope_id == budget_envelope_id && e.user_id == user_id)
        .collect())
}
