//! The BudgetEnvelope aggregate.
//!
//! An envelope holds between zero and its target. Credits may not push it
//! past the target, debits may not take it below zero, and the target may
//! not drop below what the envelope currently holds.

use budget_core::aggregate::{AggregateRoot, PendingEvents};
use budget_core::clock::Clock;
use budget_core::error::DomainError;
use budget_core::event::DomainEvent;
use budget_core::money::{Amount, Currency};
use budget_core::repository::EMPTY_STREAM_VERSION;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{
    BudgetEnvelopeCreated, BudgetEnvelopeCredited, BudgetEnvelopeDebited, BudgetEnvelopeDeleted,
    BudgetEnvelopeEventKind, BudgetEnvelopeRenamed, BudgetEnvelopeRewound,
    BudgetEnvelopeTargetedAmountChanged,
};

const MAX_NAME_LEN: usize = 50;

/// A pot of money set aside for one purpose.
#[derive(Debug, Serialize, Deserialize)]
pub struct BudgetEnvelope {
    /// Aggregate identifier.
    pub id: Uuid,
    version: i64,
    user_id: Uuid,
    name: String,
    targeted_amount: Amount,
    current_amount: Amount,
    currency: Option<Currency>,
    is_deleted: bool,
    #[serde(skip)]
    pending: PendingEvents<BudgetEnvelopeEventKind>,
}

fn validate_name(name: &str) -> Result<(), DomainError> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_NAME_LEN {
        return Err(DomainError::Validation(format!(
            "envelope name must be 1 to {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_positive(what: &str, amount: Amount) -> Result<(), DomainError> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(DomainError::Validation(format!(
            "{what} must be positive, got {amount}"
        )))
    }
}

impl BudgetEnvelope {
    /// The owner.
    #[must_use]
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The most the envelope may hold.
    #[must_use]
    pub fn targeted_amount(&self) -> Amount {
        self.targeted_amount
    }

    /// What the envelope holds.
    #[must_use]
    pub fn current_amount(&self) -> Amount {
        self.current_amount
    }

    /// Envelope currency, once created.
    #[must_use]
    pub fn currency(&self) -> Option<&Currency> {
        self.currency.as_ref()
    }

    /// Returns `true` once the envelope has been deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    /// Creates the envelope, empty.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AlreadyExists` if it was created before and
    /// `DomainError::Validation` for a bad name or a non-positive target.
    pub fn create(
        &mut self,
        user_id: Uuid,
        name: String,
        targeted_amount: Amount,
        currency: Currency,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if self.exists() {
            return Err(DomainError::AlreadyExists(format!(
                "budget envelope {}",
                self.id
            )));
        }
        validate_name(&name)?;
        validate_positive("targeted amount", targeted_amount)?;
        self.raise(
            BudgetEnvelopeEventKind::Created(BudgetEnvelopeCreated {
                budget_envelope_id: self.id,
                user_id,
                name,
                targeted_amount,
                currency,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Puts money into the envelope.
    ///
    /// # Errors
    ///
    /// Returns the guard errors (`AggregateNotFound`, `AggregateDeleted`,
    /// `NotOwner`) and `DomainError::Validation` for a non-positive amount
    /// or one that would exceed the target.
    pub fn credit(
        &mut self,
        user_id: Uuid,
        amount: Amount,
        description: String,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_writable(user_id)?;
        validate_positive("credit", amount)?;
        let balance = self.current_amount.checked_add(amount)?;
        if balance > self.targeted_amount {
            return Err(DomainError::Validation(format!(
                "crediting {amount} would exceed the target of {}",
                self.targeted_amount
            )));
        }
        self.raise(
            BudgetEnvelopeEventKind::Credited(BudgetEnvelopeCredited {
                budget_envelope_id: self.id,
                user_id,
                amount,
                description,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Takes money out of the envelope.
    ///
    /// # Errors
    ///
    /// Same guards as [`BudgetEnvelope::credit`]; `DomainError::Validation`
    /// if the balance would go below zero.
    pub fn debit(
        &mut self,
        user_id: Uuid,
        amount: Amount,
        description: String,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_writable(user_id)?;
        validate_positive("debit", amount)?;
        if self.current_amount.checked_sub(amount)? < Amount::ZERO {
            return Err(DomainError::Validation(format!(
                "debiting {amount} would overdraw a balance of {}",
                self.current_amount
            )));
        }
        self.raise(
            BudgetEnvelopeEventKind::Debited(BudgetEnvelopeDebited {
                budget_envelope_id: self.id,
                user_id,
                amount,
                description,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Renames the envelope.
    ///
    /// # Errors
    ///
    /// Same guards as [`BudgetEnvelope::credit`]; `DomainError::Validation`
    /// for a bad name.
    pub fn rename(
        &mut self,
        user_id: Uuid,
        name: String,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_writable(user_id)?;
        validate_name(&name)?;
        self.raise(
            BudgetEnvelopeEventKind::Renamed(BudgetEnvelopeRenamed {
                budget_envelope_id: self.id,
                user_id,
                name,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Changes the target.
    ///
    /// # Errors
    ///
    /// Same guards as [`BudgetEnvelope::credit`]; `DomainError::Validation`
    /// for a non-positive target or one below the current balance.
    pub fn change_targeted_amount(
        &mut self,
        user_id: Uuid,
        targeted_amount: Amount,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_writable(user_id)?;
        validate_positive("targeted amount", targeted_amount)?;
        if targeted_amount < self.current_amount {
            return Err(DomainError::Validation(format!(
                "target {targeted_amount} is below the balance of {}",
                self.current_amount
            )));
        }
        self.raise(
            BudgetEnvelopeEventKind::TargetedAmountChanged(BudgetEnvelopeTargetedAmountChanged {
                budget_envelope_id: self.id,
                user_id,
                targeted_amount,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Deletes the envelope. Every later mutation fails.
    ///
    /// # Errors
    ///
    /// Same guards as [`BudgetEnvelope::credit`].
    pub fn delete(
        &mut self,
        user_id: Uuid,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_writable(user_id)?;
        self.raise(
            BudgetEnvelopeEventKind::Deleted(BudgetEnvelopeDeleted {
                budget_envelope_id: self.id,
                user_id,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Puts the envelope back into `past`, the state it had at
    /// `desired_date_time`.
    ///
    /// # Errors
    ///
    /// Same guards as [`BudgetEnvelope::credit`]; `DomainError::Validation`
    /// if `past` is another envelope, or a state in which the envelope did
    /// not exist or was already deleted.
    pub fn rewind(
        &mut self,
        user_id: Uuid,
        past: &BudgetEnvelope,
        desired_date_time: DateTime<Utc>,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_writable(user_id)?;
        if past.id != self.id || past.version > self.version {
            return Err(DomainError::Validation(format!(
                "not a past state of envelope {}",
                self.id
            )));
        }
        let currency = match (&past.currency, past.is_deleted) {
            (Some(currency), false) => currency.clone(),
            _ => {
                return Err(DomainError::Validation(format!(
                    "envelope {} did not exist at {desired_date_time}",
                    self.id
                )));
            }
        };
        self.raise(
            BudgetEnvelopeEventKind::Rewound(BudgetEnvelopeRewound {
                budget_envelope_id: self.id,
                user_id,
                name: past.name.clone(),
                targeted_amount: past.targeted_amount,
                current_amount: past.current_amount,
                currency,
                desired_date_time,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    fn ensure_writable(&self, user_id: Uuid) -> Result<(), DomainError> {
        if !self.exists() {
            return Err(DomainError::AggregateNotFound(self.id));
        }
        if self.is_deleted {
            return Err(DomainError::AggregateDeleted(self.id));
        }
        if user_id != self.user_id {
            return Err(DomainError::NotOwner {
                aggregate_id: self.id,
                user_id,
            });
        }
        Ok(())
    }
}

impl AggregateRoot for BudgetEnvelope {
    type Event = BudgetEnvelopeEventKind;

    const AGGREGATE_TYPE: &'static str = "budget_envelope";

    fn empty(id: Uuid) -> Self {
        Self {
            id,
            version: EMPTY_STREAM_VERSION,
            user_id: Uuid::nil(),
            name: String::new(),
            targeted_amount: Amount::ZERO,
            current_amount: Amount::ZERO,
            currency: None,
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
            BudgetEnvelopeEventKind::Created(p) => {
                self.user_id = p.user_id;
                self.name.clone_from(&p.name);
                self.targeted_amount = p.targeted_amount;
                self.current_amount = Amount::ZERO;
                self.currency = Some(p.currency.clone());
            }
            BudgetEnvelopeEventKind::Credited(p) => {
                self.current_amount =
                    Amount::from_cents(self.current_amount.cents() + p.amount.cents());
            }
            BudgetEnvelopeEventKind::Debited(p) => {
                self.current_amount =
                    Amount::from_cents(self.current_amount.cents() - p.amount.cents());
            }
            BudgetEnvelopeEventKind::Renamed(p) => {
                self.name.clone_from(&p.name);
            }
            BudgetEnvelopeEventKind::TargetedAmountChanged(p) => {
                self.targeted_amount = p.targeted_amount;
            }
            BudgetEnvelopeEventKind::Deleted(_) => {
                self.is_deleted = true;
            }
            BudgetEnvelopeEventKind::Rewound(p) => {
                self.name.clone_from(&p.name);
                self.targeted_amount = p.targeted_amount;
                self.current_amount = p.current_amount;
                self.currency = Some(p.currency.clone());
            }
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
        self.user_id
    }
}
