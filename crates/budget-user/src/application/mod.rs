//! Application services of the User context.

pub mod command_handlers;
pub mod projections;
pub mod query_handlers;
