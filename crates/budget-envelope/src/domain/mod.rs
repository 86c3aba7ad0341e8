//! Domain model of the BudgetEnvelope context.

pub mod aggregates;
pub mod commands;
pub mod events;
