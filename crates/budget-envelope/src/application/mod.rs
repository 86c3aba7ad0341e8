//! Application services of the BudgetEnvelope context.

pub mod command_handlers;
pub mod projections;
pub mod query_handlers;
