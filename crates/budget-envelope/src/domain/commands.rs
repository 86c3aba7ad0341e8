//! Commands for the BudgetEnvelope context.

use budget_core::command::Command;
use budget_core::money::{Amount, Currency};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Command to create an envelope.
#[derive(Debug, Clone)]
pub struct CreateBudgetEnvelope {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The new envelope identifier.
    pub budget_envelope_id: Uuid,
    /// The acting user, who owns the envelope.
    pub user_id: Uuid,
    /// Display name.
    pub name: String,
    /// The most the envelope may hold.
    pub targeted_amount: Amount,
    /// Envelope currency.
    pub currency: Currency,
}

impl Command for CreateBudgetEnvelope {
    fn command_type(&self) -> &'static str {
        "budget_envelope.create"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn acting_user_id(&self) -> Uuid {
        self.user_id
    }
}

/// Command to put money into an envelope.
#[derive(Debug, Clone)]
pub struct CreditBudgetEnvelope {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The envelope identifier.
    pub budget_envelope_id: Uuid,
    /// The acting user.
    pub user_id: Uuid,
    /// Amount to add.
    pub amount: Amount,
    /// Free-form note.
    pub description: String,
}

impl Command for CreditBudgetEnvelope {
    fn command_type(&self) -> &'static str {
        "budget_envelope.credit"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn acting_user_id(&self) -> Uuid {
        self.user_id
    }
}

/// Command to take money out of an envelope.
#[derive(Debug, Clone)]
pub struct DebitBudgetEnvelope {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The envelope identifier.
    pub budget_envelope_id: Uuid,
    /// The acting user.
    pub user_id: Uuid,
    /// Amount to take.
    pub amount: Amount,
    /// Free-form note.
    pub description: String,
}

impl Command for DebitBudgetEnvelope {
    fn command_type(&self) -> &'static str {
        "budget_envelope.debit"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn acting_user_id(&self) -> Uuid {
        self.user_id
    }
}

/// Command to rename an envelope.
#[derive(Debug, Clone)]
pub struct RenameBudgetEnvelope {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The envelope identifier.
    pub budget_envelope_id: Uuid,
    /// The acting user.
    pub user_id: Uuid,
    /// New name.
    pub name: String,
}

impl Command for RenameBudgetEnvelope {
    fn command_type(&self) -> &'static str {
        "budget_envelope.rename"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn acting_user_id(&self) -> Uuid {
        self.user_id
    }
}

/// Command to change an envelope's target.
#[derive(Debug, Clone)]
pub struct ChangeBudgetEnvelopeTargetedAmount {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The envelope identifier.
    pub budget_envelope_id: Uuid,
    /// The acting user.
    pub user_id: Uuid,
    /// New target.
    pub targeted_amount: Amount,
}

impl Command for ChangeBudgetEnvelopeTargetedAmount {
    fn command_type(&self) -> &'static str {
        "budget_envelope.change_targeted_amount"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn acting_user_id(&self) -> Uuid {
        self.user_id
    }
}

/// Command to delete an envelope.
#[derive(Debug, Clone)]
pub struct DeleteBudgetEnvelope {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The envelope identifier.
    pub budget_envelope_id: Uuid,
    /// The acting user.
    pub user_id: Uuid,
}

impl Command for DeleteBudgetEnvelope {
    fn command_type(&self) -> &'static str {
        "budget_envelope.delete"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn acting_user_id(&self) -> Uuid {
        self.user_id
    }
}

/// Command to put an envelope back into the state it had at `as_of`.
#[derive(Debug, Clone)]
pub struct RewindBudgetEnvelope {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The envelope identifier.
    pub budget_envelope_id: Uuid,
    /// The acting user.
    pub user_id: Uuid,
    /// The instant to rewind to.
    pub as_of: DateTime<Utc>,
}

impl Command for RewindBudgetEnvelope {
    fn command_type(&self) -> &'static str {
        "budget_envelope.rewind"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn acting_user_id(&self) -> Uuid {
        self.user_id
    }
}
