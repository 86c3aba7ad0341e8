//! Budget Core — shared event-sourcing abstractions.
//!
//! This crate defines the fundamental traits and types that all bounded
//! contexts depend on. It contains no infrastructure code.

pub mod aggregate;
pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod money;
pub mod projection;
pub mod publisher;
pub mod registry;
pub mod repository;
pub mod snapshot;
