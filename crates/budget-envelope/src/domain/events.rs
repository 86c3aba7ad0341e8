//! Domain events for the BudgetEnvelope context.

use budget_core::error::DomainError;
use budget_core::event::EventKind;
use budget_core::money::{Amount, Currency};
use budget_core::registry::{EventSchema, EventTypeRegistry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Emitted when an envelope is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetEnvelopeCreated {
    /// The envelope identifier.
    pub budget_envelope_id: Uuid,
    /// The owner.
    pub user_id: Uuid,
    /// Display name.
    pub name: String,
    /// The most the envelope may hold.
    pub targeted_amount: Amount,
    /// Envelope currency.
    pub currency: Currency,
}

impl EventSchema for BudgetEnvelopeCreated {
    const EVENT_TYPE: &'static str = "budget_envelope.created";
    const ENCRYPTED_FIELDS: &'static [&'static str] = &["name", "targeted_amount"];
}

/// Emitted when money is put into an envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetEnvelopeCredited {
    /// The envelope identifier.
    pub budget_envelope_id: Uuid,
    /// The owner.
    pub user_id: Uuid,
    /// Amount added.
    pub amount: Amount,
    /// Free-form note.
    pub description: String,
}

impl EventSchema for BudgetEnvelopeCredited {
    const EVENT_TYPE: &'static str = "budget_envelope.credited";
    const ENCRYPTED_FIELDS: &'static [&'static str] = &["amount", "description"];
}

/// Emitted when money is taken out of an envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetEnvelopeDebited {
    /// The envelope identifier.
    pub budget_envelope_id: Uuid,
    /// The owner.
    pub user_id: Uuid,
    /// Amount taken.
    pub amount: Amount,
    /// Free-form note.
    pub description: String,
}

impl EventSchema for BudgetEnvelopeDebited {
    const EVENT_TYPE: &'static str = "budget_envelope.debited";
    const ENCRYPTED_FIELDS: &'static [&'static str] = &["amount", "description"];
}

/// Emitted when an envelope is renamed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetEnvelopeRenamed {
    /// The envelope identifier.
    pub budget_envelope_id: Uuid,
    /// The owner.
    pub user_id: Uuid,
    /// New name.
    pub name: String,
}

impl EventSchema for BudgetEnvelopeRenamed {
    const EVENT_TYPE: &'static str = "budget_envelope.renamed";
    const ENCRYPTED_FIELDS: &'static [&'static str] = &["name"];
}

/// Emitted when the target changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetEnvelopeTargetedAmountChanged {
    /// The envelope identifier.
    pub budget_envelope_id: Uuid,
    /// The owner.
    pub user_id: Uuid,
    /// New target.
    pub targeted_amount: Amount,
}

impl EventSchema for BudgetEnvelopeTargetedAmountChanged {
    const EVENT_TYPE: &'static str = "budget_envelope.targeted_amount_changed";
    const ENCRYPTED_FIELDS: &'static [&'static str] = &["targeted_amount"];
}

/// Emitted when an envelope is deleted. Terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetEnvelopeDeleted {
    /// The envelope identifier.
    pub budget_envelope_id: Uuid,
    /// The owner.
    pub user_id: Uuid,
}

impl EventSchema for BudgetEnvelopeDeleted {
    const EVENT_TYPE: &'static str = "budget_envelope.deleted";
}

/// Emitted when an envelope is put back into the state it had at
/// `desired_date_time`. Carries that whole state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetEnvelopeRewound {
    /// The envelope identifier.
    pub budget_envelope_id: Uuid,
    /// The owner.
    pub user_id: Uuid,
    /// Name at that time.
    pub name: String,
    /// Target at that time.
    pub targeted_amount: Amount,
    /// Balance at that time.
    pub current_amount: Amount,
    /// Currency at that time.
    pub currency: Currency,
    /// The instant rewound to.
    pub desired_date_time: DateTime<Utc>,
}

impl EventSchema for BudgetEnvelopeRewound {
    const EVENT_TYPE: &'static str = "budget_envelope.rewound";
    const ENCRYPTED_FIELDS: &'static [&'static str] =
        &["name", "targeted_amount", "current_amount"];
}

/// Event payload variants for the BudgetEnvelope aggregate.
#[derive(Debug, Clone)]
pub enum BudgetEnvelopeEventKind {
    /// The envelope was created.
    Created(BudgetEnvelopeCreated),
    /// Money was added.
    Credited(BudgetEnvelopeCredited),
    /// Money was taken.
    Debited(BudgetEnvelopeDebited),
    /// The envelope was renamed.
    Renamed(BudgetEnvelopeRenamed),
    /// The target changed.
    TargetedAmountChanged(BudgetEnvelopeTargetedAmountChanged),
    /// The envelope was deleted.
    Deleted(BudgetEnvelopeDeleted),
    /// The envelope was rewound to an earlier state.
    Rewound(BudgetEnvelopeRewound),
}

impl EventKind for BudgetEnvelopeEventKind {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Created(_) => BudgetEnvelopeCreated::EVENT_TYPE,
            Self::Credited(_) => BudgetEnvelopeCredited::EVENT_TYPE,
            Self::Debited(_) => BudgetEnvelopeDebited::EVENT_TYPE,
            Self::Renamed(_) => BudgetEnvelopeRenamed::EVENT_TYPE,
            Self::TargetedAmountChanged(_) => BudgetEnvelopeTargetedAmountChanged::EVENT_TYPE,
            Self::Deleted(_) => BudgetEnvelopeDeleted::EVENT_TYPE,
            Self::Rewound(_) => BudgetEnvelopeRewound::EVENT_TYPE,
        }
    }

    fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Self::Created(p) => serde_json::to_value(p),
            Self::Credited(p) => serde_json::to_value(p),
            Self::Debited(p) => serde_json::to_value(p),
            Self::Renamed(p) => serde_json::to_value(p),
            Self::TargetedAmountChanged(p) => serde_json::to_value(p),
            Self::Deleted(p) => serde_json::to_value(p),
            Self::Rewound(p) => serde_json::to_value(p),
        }
    }
}

/// Builds the registry of BudgetEnvelope event types.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if two payloads share an event type.
pub fn budget_envelope_event_registry()
-> Result<EventTypeRegistry<BudgetEnvelopeEventKind>, DomainError> {
    EventTypeRegistry::builder()
        .register(BudgetEnvelopeEventKind::Created)
        .register(BudgetEnvelopeEventKind::Credited)
        .register(BudgetEnvelopeEventKind::Debited)
        .register(BudgetEnvelopeEventKind::Renamed)
        .register(BudgetEnvelopeEventKind::TargetedAmountChanged)
        .register(BudgetEnvelopeEventKind::Deleted)
        .register(BudgetEnvelopeEventKind::Rewound)
        .build()
}
