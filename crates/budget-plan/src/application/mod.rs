//! Application services of the BudgetPlan context.

pub mod command_handlers;
pub mod projections;
pub mod query_handlers;
