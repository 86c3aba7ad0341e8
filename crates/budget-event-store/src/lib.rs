//! Budget Event Store — persistence for event-sourced aggregates.
//!
//! Provides the field-level event codec, in-memory and `PostgreSQL`
//! implementations of the event log and snapshot store, `PostgreSQL`
//! projection checkpoints, the reconstitution engine and the repository
//! command handlers use.

pub mod cipher;
pub mod codec;
pub mod event_sourced_repository;
pub mod memory;
pub mod pg_checkpoint_store;
pub mod pg_event_log;
pub mod pg_snapshot_store;
pub mod reconstitution;
pub mod schema;

#[cfg(test)]
mod test_fixtures;
