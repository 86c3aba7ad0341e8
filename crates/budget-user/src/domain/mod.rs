//! Domain model of the User context.

pub mod aggregates;
pub mod commands;
pub mod events;
