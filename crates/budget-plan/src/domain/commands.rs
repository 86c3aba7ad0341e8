//! Commands for the BudgetPlan context.

use budget_core::command::Command;
use budget_core::money::{Amount, Currency};
use chrono::NaiveDate;
use uuid::Uuid;

use super::events::EntryGroup;
use super::split::CategoryLabels;

/// An income as entered by the user.
#[derive(Debug, Clone)]
pub struct IncomeLine {
    /// Display name.
    pub name: String,
    /// Monthly amount.
    pub amount: Amount,
}

/// Command to generate a plan from incomes.
#[derive(Debug, Clone)]
pub struct GenerateBudgetPlan {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The new plan identifier.
    pub budget_plan_id: Uuid,
    /// The acting user, who owns the plan.
    pub user_id: Uuid,
    /// Any day of the planned month.
    pub date: NaiveDate,
    /// Plan currency.
    pub currency: Currency,
    /// Incomes.
    pub incomes: Vec<IncomeLine>,
    /// Names for the generated entries.
    pub labels: CategoryLabels,
}

impl Command for GenerateBudgetPlan {
    fn command_type(&self) -> &'static str {
        "budget_plan.generate"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn acting_user_id(&self) -> Uuid {
        self.user_id
    }
}

/// Command to generate a plan by copying an existing one.
#[derive(Debug, Clone)]
pub struct GenerateBudgetPlanFromExisting {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The new plan identifier.
    pub budget_plan_id: Uuid,
    /// The plan to copy.
    pub source_budget_plan_id: Uuid,
    /// The acting user, who must own the source plan.
    pub user_id: Uuid,
    /// Any day of the planned month.
    pub date: NaiveDate,
}

impl Command for GenerateBudgetPlanFromExisting {
    fn command_type(&self) -> &'static str {
        "budget_plan.generate_from_existing"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn acting_user_id(&self) -> Uuid {
        self.user_id
    }
}

/// Command to add an entry to one of the groups.
#[derive(Debug, Clone)]
pub struct AddEntry {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The plan identifier.
    pub budget_plan_id: Uuid,
    /// The acting user.
    pub user_id: Uuid,
    /// Target group.
    pub group: EntryGroup,
    /// The new entry identifier.
    pub entry_id: Uuid,
    /// Display name.
    pub name: String,
    /// Planned amount.
    pub amount: Amount,
    /// Category key.
    pub category: String,
}

impl Command for AddEntry {
    fn command_type(&self) -> &'static str {
        "budget_plan.add_entry"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn acting_user_id(&self) -> Uuid {
        self.user_id
    }
}

/// Command to change an entry's name and amount.
#[derive(Debug, Clone)]
pub struct AdjustEntry {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The plan identifier.
    pub budget_plan_id: Uuid,
    /// The acting user.
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

impl Command for AdjustEntry {
    fn command_type(&self) -> &'static str {
        "budget_plan.adjust_entry"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn acting_user_id(&self) -> Uuid {
        self.user_id
    }
}

/// Command to remove an entry.
#[derive(Debug, Clone)]
pub struct RemoveEntry {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The plan identifier.
    pub budget_plan_id: Uuid,
    /// The acting user.
    pub user_id: Uuid,
    /// Group of the entry.
    pub group: EntryGroup,
    /// The entry identifier.
    pub entry_id: Uuid,
}

impl Command for RemoveEntry {
    fn command_type(&self) -> &'static str {
        "budget_plan.remove_entry"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn acting_user_id(&self) -> Uuid {
        self.user_id
    }
}

/// Command to change the plan currency.
#[derive(Debug, Clone)]
pub struct ChangeCurrency {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The plan identifier.
    pub budget_plan_id: Uuid,
    /// The acting user.
    pub user_id: Uuid,
    /// New currency.
    pub currency: Currency,
}

impl Command for ChangeCurrency {
    fn command_type(&self) -> &'static str {
        "budget_plan.change_currency"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn acting_user_id(&self) -> Uuid {
        self.user_id
    }
}

/// Command to remove a plan.
#[derive(Debug, Clone)]
pub struct RemoveBudgetPlan {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The plan identifier.
    pub budget_plan_id: Uuid,
    /// The acting user.
    pub user_id: Uuid,
}

impl Command for RemoveBudgetPlan {
    fn command_type(&self) -> &'static str {
        "budget_plan.remove"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn acting_user_id(&self) -> Uuid {
        self.user_id
    }
}
