//! Domain model of the BudgetPlan context.

pub mod aggregates;
pub mod commands;
pub mod date_registry;
pub mod events;
pub mod split;
