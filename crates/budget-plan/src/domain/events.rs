//! Domain events for the BudgetPlan context.
//!
//! Every payload carries `user_id`, so it is sealed with the owning user's
//! key.

use budget_core::error::DomainError;
use budget_core::event::EventKind;
use budget_core::money::{Amount, Currency};
use budget_core::registry::{EventSchema, EventTypeRegistry};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The four groups of entries a plan is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryGroup {
    /// Money coming in.
    Income,
    /// Essential spending.
    Need,
    /// Discretionary spending.
    Want,
    /// Money put aside.
    Saving,
}

impl EntryGroup {
    /// Lowercase name used in messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Need => "need",
            Self::Want => "want",
            Self::Saving => "saving",
        }
    }
}

/// One line of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    /// Entry identifier, unique within its group.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Planned amount.
    pub amount: Amount,
    /// Category key.
    pub category: String,
}

/// Emitted when a plan is generated from incomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetPlanGenerated {
    /// The plan identifier.
    pub budget_plan_id: Uuid,
    /// The owner.
    pub user_id: Uuid,
    /// First day of the planned month.
    pub date: NaiveDate,
    /// Plan currency.
    pub currency: Currency,
    /// Incomes as entered.
    pub incomes: Vec<PlanEntry>,
    /// Derived needs.
    pub needs: Vec<PlanEntry>,
    /// Derived wants.
    pub wants: Vec<PlanEntry>,
    /// Derived savings.
    pub savings: Vec<PlanEntry>,
}

impl EventSchema for BudgetPlanGenerated {
    const EVENT_TYPE: &'static str = "budget_plan.generated";
    const ENCRYPTED_FIELDS: &'static [&'static str] = &["incomes", "needs", "wants", "savings"];
}

/// Emitted when a plan is generated by copying another plan's entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetPlanGeneratedFromExisting {
    /// The plan identifier.
    pub budget_plan_id: Uuid,
    /// The plan the entries were copied from.
    pub source_budget_plan_id: Uuid,
    /// The owner.
    pub user_id: Uuid,
    /// First day of the planned month.
    pub date: NaiveDate,
    /// Plan currency.
    pub currency: Currency,
    /// Copied incomes.
    pub incomes: Vec<PlanEntry>,
    /// Copied needs.
    pub needs: Vec<PlanEntry>,
    /// Copied wants.
    pub wants: Vec<PlanEntry>,
    /// Copied savings.
    pub savings: Vec<PlanEntry>,
}

impl EventSchema for BudgetPlanGeneratedFromExisting {
    const EVENT_TYPE: &'static str = "budget_plan.generated_from_existing";
    const ENCRYPTED_FIELDS: &'static [&'static str] = &["incomes", "needs", "wants", "savings"];
}

/// Emitted when an entry is added to a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetPlanEntryAdded {
    /// The plan identifier.
    pub budget_plan_id: Uuid,
    /// The owner.
    pub user_id: Uuid,
    /// Target group.
    pub group: EntryGroup,
    /// The new entry's identifier.
    pub entry_id: Uuid,
    /// Display name.
    pub name: String,
    /// Planned amount.
    pub amount: Amount,
    /// Category key.
    pub category: String,
}

impl EventSchema for BudgetPlanEntryAdded {
    const EVENT_TYPE: &'static str = "budget_plan.entry_added";
    const ENCRYPTED_FIELDS: &'static [&'static str] = &["name", "amount"];
}

/// Emitted when an entry's name or amount changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetPlanEntryAdjusted {
    /// The plan identifier.
    pub budget_plan_id: Uuid,
    /// The owner.
    pub user_id: Uuid,
    /// Group of the entry.
    pub group: EntryGroup,
    /// The entry identifier.
    pub entry_id: Uuid,
    /// New display name.
    pub name: String,
    /// New amount.
    pub amount: Amount,
}

impl EventSchema for BudgetPlanEntryAdjusted {
    const EVENT_TYPE: &'static str = "budget_plan.entry_adjusted";
    const ENCRYPTED_FIELDS: &'static [&'static str] = &["name", "amount"];
}

/// Emitted when an entry is removed from a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetPlanEntryRemoved {
    /// The plan identifier.
    pub budget_plan_id: Uuid,
    /// The owner.
    pub user_id: Uuid,
    /// Group of the entry.
    pub group: EntryGroup,
    /// The entry identifier.
    pub entry_id: Uuid,
}

impl EventSchema for BudgetPlanEntryRemoved {
    const EVENT_TYPE: &'static str = "budget_plan.entry_removed";
}

/// Emitted when the plan currency changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetPlanCurrencyChanged {
    /// The plan identifier.
    pub budget_plan_id: Uuid,
    /// The owner.
    pub user_id: Uuid,
    /// New currency.
    pub currency: Currency,
}

impl EventSchema for BudgetPlanCurrencyChanged {
    const EVENT_TYPE: &'static str = "budget_plan.currency_changed";
}

/// Emitted when a plan is removed. Terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetPlanRemoved {
    /// The plan identifier.
    pub budget_plan_id: Uuid,
    /// The owner.
    pub user_id: Uuid,
}

impl EventSchema for BudgetPlanRemoved {
    const EVENT_TYPE: &'static str = "budget_plan.removed";
}

/// Event payload variants for the BudgetPlan aggregate.
#[derive(Debug, Clone)]
pub enum BudgetPlanEventKind {
    /// The plan was generated from incomes.
    Generated(BudgetPlanGenerated),
    /// The plan was generated from another plan.
    GeneratedFromExisting(BudgetPlanGeneratedFromExisting),
    /// An entry was added.
    EntryAdded(BudgetPlanEntryAdded),
    /// An entry was adjusted.
    EntryAdjusted(BudgetPlanEntryAdjusted),
    /// An entry was removed.
    EntryRemoved(BudgetPlanEntryRemoved),
    /// The currency changed.
    CurrencyChanged(BudgetPlanCurrencyChanged),
    /// The plan was removed.
    Removed(BudgetPlanRemoved),
}

impl EventKind for BudgetPlanEventKind {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Generated(_) => BudgetPlanGenerated::EVENT_TYPE,
            Self::GeneratedFromExisting(_) => BudgetPlanGeneratedFromExisting::EVENT_TYPE,
            Self::EntryAdded(_) => BudgetPlanEntryAdded::EVENT_TYPE,
            Self::EntryAdjusted(_) => BudgetPlanEntryAdjusted::EVENT_TYPE,
            Self::EntryRemoved(_) => BudgetPlanEntryRemoved::EVENT_TYPE,
            Self::CurrencyChanged(_) => BudgetPlanCurrencyChanged::EVENT_TYPE,
            Self::Removed(_) => BudgetPlanRemoved::EVENT_TYPE,
        }
    }

    fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Self::Generated(p) => serde_json::to_value(p),
            Self::GeneratedFromExisting(p) => serde_json::to_value(p),
            Self::EntryAdded(p) => serde_json::to_value(p),
            Self::EntryAdjusted(p) => serde_json::to_value(p),
            Self::EntryRemoved(p) => serde_json::to_value(p),
            Self::CurrencyChanged(p) => serde_json::to_value(p),
            Self::Removed(p) => serde_json::to_value(p),
        }
    }
}

/// Builds the registry of BudgetPlan event types.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if two payloads share an event type.
pub fn budget_plan_event_registry() -> Result<EventTypeRegistry<BudgetPlanEventKind>, DomainError> {
    EventTypeRegistry::builder()
        .register(BudgetPlanEventKind::Generated)
        .register(BudgetPlanEventKind::GeneratedFromExisting)
        .register(BudgetPlanEventKind::EntryAdded)
        .register(BudgetPlanEventKind::EntryAdjusted)
        .register(BudgetPlanEventKind::EntryRemoved)
        .register(BudgetPlanEventKind::CurrencyChanged)
        .register(BudgetPlanEventKind::Removed)
        .build()
}
