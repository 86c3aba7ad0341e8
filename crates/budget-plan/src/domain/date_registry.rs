//! One plan per user and month.
//!
//! The registry is its own aggregate so that the uniqueness check goes
//! through the same optimistic concurrency as every other write: two plans
//! generated for the same month race on the registry stream and one of
//! them gets a conflict.

use budget_core::aggregate::{AggregateRoot, PendingEvents};
use budget_core::clock::Clock;
use budget_core::error::DomainError;
use budget_core::event::{DomainEvent, EventKind};
use budget_core::registry::{EventSchema, EventTypeRegistry};
use budget_core::repository::EMPTY_STREAM_VERSION;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const REGISTRY_NAMESPACE: Uuid = Uuid::from_u128(0x6d1f_5b4e_2c3a_4e8f_9a0b_7c6d_5e4f_3a2b);

/// Identifier of the registry covering `user_id` and the month of `date`.
#[must_use]
pub fn registry_id(user_id: Uuid, date: NaiveDate) -> Uuid {
    let name = format!("{user_id}:{:04}-{:02}", date.year(), date.month());
    Uuid::new_v5(&REGISTRY_NAMESPACE, name.as_bytes())
}

/// Emitted when a plan claims a month.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetPlanDateRegistered {
    /// The registry identifier.
    pub registry_id: Uuid,
    /// The owner.
    pub user_id: Uuid,
    /// The plan holding the month.
    pub budget_plan_id: Uuid,
    /// First day of the month.
    pub date: NaiveDate,
}

impl EventSchema for BudgetPlanDateRegistered {
    const EVENT_TYPE: &'static str = "budget_plan_date_registry.registered";
}

/// Emitted when a plan gives a month back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetPlanDateReleased {
    /// The registry identifier.
    pub registry_id: Uuid,
    /// The owner.
    pub user_id: Uuid,
    /// The plan that held the month.
    pub budget_plan_id: Uuid,
}

impl EventSchema for BudgetPlanDateReleased {
    const EVENT_TYPE: &'static str = "budget_plan_date_registry.released";
}

/// Event payload variants for the date registry.
#[derive(Debug, Clone)]
pub enum DateRegistryEventKind {
    /// A plan claimed the month.
    Registered(BudgetPlanDateRegistered),
    /// The month was freed.
    Released(BudgetPlanDateReleased),
}

impl EventKind for DateRegistryEventKind {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Registered(_) => BudgetPlanDateRegistered::EVENT_TYPE,
            Self::Released(_) => BudgetPlanDateReleased::EVENT_TYPE,
        }
    }

    fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Self::Registered(p) => serde_json::to_value(p),
            Self::Released(p) => serde_json::to_value(p),
        }
    }
}

/// Builds the registry of date registry event types.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if two payloads share an event type.
pub fn date_registry_event_registry() -> Result<EventTypeRegistry<DateRegistryEventKind>, DomainError>
{
    EventTypeRegistry::builder()
        .register(DateRegistryEventKind::Registered)
        .register(DateRegistryEventKind::Released)
        .build()
}

/// Which plan, if any, holds a user's month.
#[derive(Debug, Serialize, Deserialize)]
pub struct BudgetPlanDateRegistry {
    /// Aggregate identifier, see [`registry_id`].
    pub id: Uuid,
    version: i64,
    user_id: Uuid,
    budget_plan_id: Option<Uuid>,
    #[serde(skip)]
    pending: PendingEvents<DateRegistryEventKind>,
}

impl BudgetPlanDateRegistry {
    /// The plan currently holding the month.
    #[must_use]
    pub fn budget_plan_id(&self) -> Option<Uuid> {
        self.budget_plan_id
    }

    /// Claims the month for `budget_plan_id`. Claiming it again for the
    /// same plan raises nothing.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AlreadyExists` if another plan holds the month.
    pub fn register(
        &mut self,
        budget_plan_id: Uuid,
        user_id: Uuid,
        date: NaiveDate,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        match self.budget_plan_id {
            Some(held) if held == budget_plan_id => Ok(()),
            Some(held) => Err(DomainError::AlreadyExists(format!(
                "budget plan {held} already covers {}-{:02}",
                date.year(),
                date.month()
            ))),
            None => {
                self.raise(
                    DateRegistryEventKind::Registered(BudgetPlanDateRegistered {
                        registry_id: self.id,
                        user_id,
                        budget_plan_id,
                        date,
                    }),
                    correlation_id,
                    clock,
                );
                Ok(())
            }
        }
    }

    /// Frees the month if `budget_plan_id` holds it; otherwise raises
    /// nothing.
    pub fn release(&mut self, budget_plan_id: Uuid, correlation_id: Uuid, clock: &dyn Clock) {
        if self.budget_plan_id == Some(budget_plan_id) {
            self.raise(
                DateRegistryEventKind::Released(BudgetPlanDateReleased {
                    registry_id: self.id,
                    user_id: self.user_id,
                    budget_plan_id,
                }),
                correlation_id,
                clock,
            );
        }
    }
}

impl AggregateRoot for BudgetPlanDateRegistry {
    type Event = DateRegistryEventKind;

    const AGGREGATE_TYPE: &'static str = "budget_plan_date_registry";

    fn empty(id: Uuid) -> Self {
        Self {
            id,
            version: EMPTY_STREAM_VERSION,
            user_id: Uuid::nil(),
            budget_plan_id: None,
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
            DateRegistryEventKind::Registered(p) => {
                self.user_id = p.user_id;
                self.budget_plan_id = Some(p.budget_plan_id);
            }
            DateRegistryEventKind::Released(_) => {
                self.budget_plan_id = None;
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

#[cfg(test)]
mod tests {
    use super::*;
    use budget_core::clock::SystemClock;

    fn january() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
    }

    #[test]
    fn test_registry_id_depends_on_user_and_month_only() {
        let user_id = Uuid::new_v4();

        let first = registry_id(user_id, january());
        let later_same_month = registry_id(user_id, NaiveDate::from_ymd_opt(2026, 1, 28).unwrap());
        let next_month = registry_id(user_id, NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());

        assert_eq!(first, later_same_month);
        assert_ne!(first, next_month);
        assert_ne!(first, registry_id(Uuid::new_v4(), january()));
    }

    #[test]
    fn test_second_plan_for_the_same_month_is_rejected() {
        // Arrange
        let user_id = Uuid::new_v4();
        let mut registry = BudgetPlanDateRegistry::empty(registry_id(user_id, january()));
        let plan = Uuid::new_v4();
        registry
            .register(plan, user_id, january(), Uuid::new_v4(), &SystemClock)
            .unwrap();

        // Act
        let again = registry.register(plan, user_id, january(), Uuid::new_v4(), &SystemClock);
        let other = registry.register(Uuid::new_v4(), user_id, january(), Uuid::new_v4(), &SystemClock);

        // Assert
        assert!(again.is_ok());
        assert!(matches!(other, Err(DomainError::AlreadyExists(_))));
        assert_eq!(registry.pending_events().len(), 1);
        assert_eq!(registry.budget_plan_id(), Some(plan));
    }

    #[test]
    fn test_release_frees_the_month_for_the_holder_only() {
        let user_id = Uuid::new_v4();
        let mut registry = BudgetPlanDateRegistry::empty(registry_id(user_id, january()));
        let plan = Uuid::new_v4();
        registry
            .register(plan, user_id, january(), Uuid::new_v4(), &SystemClock)
            .unwrap();

        registry.release(Uuid::new_v4(), Uuid::new_v4(), &SystemClock);
        assert_eq!(registry.budget_plan_id(), Some(plan));
        registry.release(plan, Uuid::new_v4(), &SystemClock);

        assert_eq!(registry.budget_plan_id(), None);
        assert_eq!(registry.pending_events().len(), 2);
        assert!(date_registry_event_registry().unwrap().contains("budget_plan_date_registry.released"));
    }
}
