//! The BudgetPlan aggregate.

use budget_core::aggregate::{AggregateRoot, PendingEvents};
use budget_core::clock::Clock;
use budget_core::error::DomainError;
use budget_core::event::DomainEvent;
use budget_core::money::{Amount, Currency};
use budget_core::repository::EMPTY_STREAM_VERSION;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{
    BudgetPlanCurrencyChanged, BudgetPlanEntryAdded, BudgetPlanEntryAdjusted,
    BudgetPlanEntryRemoved, BudgetPlanEventKind, BudgetPlanGenerated,
    BudgetPlanGeneratedFromExisting, BudgetPlanRemoved, EntryGroup, PlanEntry,
};
use super::split::{CategoryLabels, split_income};

/// Entries of an existing plan to seed a new one with.
#[derive(Debug, Clone)]
pub struct PlanTemplate {
    /// Plan the entries come from.
    pub source_budget_plan_id: Uuid,
    /// Currency of the source plan.
    pub currency: Currency,
    /// Incomes to copy.
    pub incomes: Vec<PlanEntry>,
    /// Needs to copy.
    pub needs: Vec<PlanEntry>,
    /// Wants to copy.
    pub wants: Vec<PlanEntry>,
    /// Savings to copy.
    pub savings: Vec<PlanEntry>,
}

/// A user's plan for one month.
#[derive(Debug, Serialize, Deserialize)]
pub struct BudgetPlan {
    /// Aggregate identifier.
    pub id: Uuid,
    version: i64,
    user_id: Uuid,
    date: Option<NaiveDate>,
    currency: Option<Currency>,
    incomes: Vec<PlanEntry>,
    needs: Vec<PlanEntry>,
    wants: Vec<PlanEntry>,
    savings: Vec<PlanEntry>,
    is_deleted: bool,
    #[serde(skip)]
    pending: PendingEvents<BudgetPlanEventKind>,
}

impl BudgetPlan {
    /// The owner.
    #[must_use]
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// First day of the planned month, once generated.
    #[must_use]
    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    /// Plan currency, once generated.
    #[must_use]
    pub fn currency(&self) -> Option<&Currency> {
        self.currency.as_ref()
    }

    /// Entries of one group.
    #[must_use]
    pub fn entries(&self, group: EntryGroup) -> &[PlanEntry] {
        match group {
            EntryGroup::Income => &self.incomes,
            EntryGroup::Need => &self.needs,
            EntryGroup::Want => &self.wants,
            EntryGroup::Saving => &self.savings,
        }
    }

    /// Sum of one group.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` on overflow.
    pub fn total(&self, group: EntryGroup) -> Result<Amount, DomainError> {
        Amount::sum(self.entries(group).iter().map(|e| &e.amount))
    }

    /// Returns `true` once the plan has been removed.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    /// Copies the plan's entries, under fresh ids, for seeding another plan.
    #[must_use]
    pub fn to_template(&self) -> Option<PlanTemplate> {
        let renumber = |entries: &[PlanEntry]| -> Vec<PlanEntry> {
            entries
                .iter()
                .map(|e| PlanEntry {
                    id: Uuid::new_v4(),
                    ..e.clone()
                })
                .collect()
        };
        Some(PlanTemplate {
            source_budget_plan_id: self.id,
            currency: self.currency.clone()?,
            incomes: renumber(&self.incomes),
            needs: renumber(&self.needs),
            wants: renumber(&self.wants),
            savings: renumber(&self.savings),
        })
    }

    /// Generates the plan from incomes, deriving needs, wants and savings
    /// with the 50/30/20 rule.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AlreadyExists` if the plan was generated
    /// before, and `DomainError::Validation` for an empty income list or a
    /// non-positive income.
    #[allow(clippy::too_many_arguments)]
    pub fn generate(
        &mut self,
        user_id: Uuid,
        date: NaiveDate,
        currency: Currency,
        incomes: Vec<PlanEntry>,
        labels: &CategoryLabels,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_new()?;
        if incomes.is_empty() {
            return Err(DomainError::Validation(
                "a plan needs at least one income".into(),
            ));
        }
        validate_entries(&incomes)?;
        let total = Amount::sum(incomes.iter().map(|e| &e.amount))?;
        let split = split_income(total, labels);
        self.raise(
            BudgetPlanEventKind::Generated(BudgetPlanGenerated {
                budget_plan_id: self.id,
                user_id,
                date,
                currency,
                incomes,
                needs: split.needs,
                wants: split.wants,
                savings: split.savings,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Generates the plan with the entries of another plan.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AlreadyExists` if the plan was generated before.
    pub fn generate_from_existing(
        &mut self,
        user_id: Uuid,
        date: NaiveDate,
        template: PlanTemplate,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_new()?;
        self.raise(
            BudgetPlanEventKind::GeneratedFromExisting(BudgetPlanGeneratedFromExisting {
                budget_plan_id: self.id,
                source_budget_plan_id: template.source_budget_plan_id,
                user_id,
                date,
                currency: template.currency,
                incomes: template.incomes,
                needs: template.needs,
                wants: template.wants,
                savings: template.savings,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Adds an income.
    ///
    /// # Errors
    ///
    /// See [`BudgetPlan::add_entry`].
    pub fn add_income(
        &mut self,
        user_id: Uuid,
        entry: PlanEntry,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.add_entry(EntryGroup::Income, user_id, entry, correlation_id, clock)
    }

    /// Adds a need.
    ///
    /// # Errors
    ///
    /// See [`BudgetPlan::add_entry`].
    pub fn add_need(
        &mut self,
        user_id: Uuid,
        entry: PlanEntry,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.add_entry(EntryGroup::Need, user_id, entry, correlation_id, clock)
    }

    /// Adds a want.
    ///
    /// # Errors
    ///
    /// See [`BudgetPlan::add_entry`].
    pub fn add_want(
        &mut self,
        user_id: Uuid,
        entry: PlanEntry,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.add_entry(EntryGroup::Want, user_id, entry, correlation_id, clock)
    }

    /// Adds a saving.
    ///
    /// # Errors
    ///
    /// See [`BudgetPlan::add_entry`].
    pub fn add_saving(
        &mut self,
        user_id: Uuid,
        entry: PlanEntry,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.add_entry(EntryGroup::Saving, user_id, entry, correlation_id, clock)
    }

    /// Adds an entry to `group`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` before generation,
    /// `DomainError::AggregateDeleted` after removal, `DomainError::NotOwner`
    /// for another user, and `DomainError::Validation` for a non-positive
    /// amount or an entry id already in the group.
    pub fn add_entry(
        &mut self,
        group: EntryGroup,
        user_id: Uuid,
        entry: PlanEntry,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_writable(user_id)?;
        validate_entries(std::slice::from_ref(&entry))?;
        if self.position(group, entry.id).is_some() {
            return Err(DomainError::Validation(format!(
                "{} {} already exists in plan {}",
                group.as_str(),
                entry.id,
                self.id
            )));
        }
        self.raise(
            BudgetPlanEventKind::EntryAdded(BudgetPlanEntryAdded {
                budget_plan_id: self.id,
                user_id,
                group,
                entry_id: entry.id,
                name: entry.name,
                amount: entry.amount,
                category: entry.category,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Changes the name and amount of an entry.
    ///
    /// # Errors
    ///
    /// Same as [`BudgetPlan::add_entry`], and `DomainError::Validation` if
    /// the entry does not exist.
    #[allow(clippy::too_many_arguments)]
    pub fn adjust_entry(
        &mut self,
        group: EntryGroup,
        user_id: Uuid,
        entry_id: Uuid,
        name: String,
        amount: Amount,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_writable(user_id)?;
        self.existing(group, entry_id)?;
        if !amount.is_positive() {
            return Err(DomainError::Validation(format!(
                "amount must be positive, got {amount}"
            )));
        }
        self.raise(
            BudgetPlanEventKind::EntryAdjusted(BudgetPlanEntryAdjusted {
                budget_plan_id: self.id,
                user_id,
                group,
                entry_id,
                name,
                amount,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Removes an entry.
    ///
    /// # Errors
    ///
    /// Same as [`BudgetPlan::adjust_entry`].
    pub fn remove_entry(
        &mut self,
        group: EntryGroup,
        user_id: Uuid,
        entry_id: Uuid,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_writable(user_id)?;
        self.existing(group, entry_id)?;
        self.raise(
            BudgetPlanEventKind::EntryRemoved(BudgetPlanEntryRemoved {
                budget_plan_id: self.id,
                user_id,
                group,
                entry_id,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Changes the plan currency.
    ///
    /// # Errors
    ///
    /// Same guards as [`BudgetPlan::add_entry`].
    pub fn change_currency(
        &mut self,
        user_id: Uuid,
        currency: Currency,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_writable(user_id)?;
        self.raise(
            BudgetPlanEventKind::CurrencyChanged(BudgetPlanCurrencyChanged {
                budget_plan_id: self.id,
                user_id,
                currency,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Removes the plan. Every later mutation fails.
    ///
    /// # Errors
    ///
    /// Same guards as [`BudgetPlan::add_entry`].
    pub fn remove(
        &mut self,
        user_id: Uuid,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_writable(user_id)?;
        self.raise(
            BudgetPlanEventKind::Removed(BudgetPlanRemoved {
                budget_plan_id: self.id,
                user_id,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    fn ensure_new(&self) -> Result<(), DomainError> {
        if self.exists() {
            return Err(DomainError::AlreadyExists(format!(
                "budget plan {}",
                self.id
            )));
        }
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

    fn position(&self, group: EntryGroup, entry_id: Uuid) -> Option<usize> {
        self.entries(group).iter().position(|e| e.id == entry_id)
    }

    fn existing(&self, group: EntryGroup, entry_id: Uuid) -> Result<usize, DomainError> {
        self.position(group, entry_id).ok_or_else(|| {
            DomainError::Validation(format!(
                "{} {entry_id} not found in plan {}",
                group.as_str(),
                self.id
            ))
        })
    }

    fn entries_mut(&mut self, group: EntryGroup) -> &mut Vec<PlanEntry> {
        match group {
            EntryGroup::Income => &mut self.incomes,
            EntryGroup::Need => &mut self.needs,
            EntryGroup::Want => &mut self.wants,
            EntryGroup::Saving => &mut self.savings,
        }
    }
}

fn validate_entries(entries: &[PlanEntry]) -> Result<(), DomainError> {
    match entries.iter().find(|e| !e.amount.is_positive()) {
        Some(entry) => Err(DomainError::Validation(format!(
            "amount must be positive, got {} for {}",
            entry.amount, entry.name
        ))),
        None => Ok(()),
    }
}

impl AggregateRoot for BudgetPlan {
    type Event = BudgetPlanEventKind;

    const AGGREGATE_TYPE: &'static str = "budget_plan";

    fn empty(id: Uuid) -> Self {
        Self {
            id,
            version: EMPTY_STREAM_VERSION,
            user_id: Uuid::nil(),
            date: None,
            currency: None,
            incomes: Vec::new(),
            needs: Vec::new(),
            wants: Vec::new(),
            savings: Vec::new(),
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
            BudgetPlanEventKind::Generated(p) => {
                self.user_id = p.user_id;
                self.date = Some(p.date);
                self.currency = Some(p.currency.clone());
                self.incomes.clone_from(&p.incomes);
                self.needs.clone_from(&p.needs);
                self.wants.clone_from(&p.wants);
                self.savings.clone_from(&p.savings);
            }
            BudgetPlanEventKind::GeneratedFromExisting(p) => {
                self.user_id = p.user_id;
                self.date = Some(p.date);
                self.currency = Some(p.currency.clone());
                self.incomes.clone_from(&p.incomes);
                self.needs.clone_from(&p.needs);
                self.wants.clone_from(&p.wants);
                self.savings.clone_from(&p.savings);
            }
            BudgetPlanEventKind::EntryAdded(p) => {
                self.entries_mut(p.group).push(PlanEntry {
                    id: p.entry_id,
                    name: p.name.clone(),
                    amount: p.amount,
                    category: p.category.clone(),
                });
            }
            BudgetPlanEventKind::EntryAdjusted(p) => {
                if let Some(entry) = self
                    .entries_mut(p.group)
                    .iter_mut()
                    .find(|e| e.id == p.entry_id)
                {
                    entry.name.clone_from(&p.name);
                    entry.amount = p.amount;
                }
            }
            BudgetPlanEventKind::EntryRemoved(p) => {
                self.entries_mut(p.group).retain(|e| e.id != p.entry_id);
            }
            BudgetPlanEventKind::CurrencyChanged(p) => {
                self.currency = Some(p.currency.clone());
            }
            BudgetPlanEventKind::Removed(_) => {
                self.is_deleted = true;
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
