//! Budget API — HTTP surface over the budget plan, envelope and user
//! contexts.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
