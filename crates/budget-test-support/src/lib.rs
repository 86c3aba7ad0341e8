//! Shared test mocks and utilities for the budget backend.

mod clock;
mod log;
mod publisher;
mod store;

pub use clock::{FixedClock, SteppingClock};
pub use log::{FailingEventLog, FaultyEventLog};
pub use publisher::{FailingPublisher, RecordingPublisher};
pub use store::TestStore;
