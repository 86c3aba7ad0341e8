//! Budget Projection — asynchronous read-model maintenance.
//!
//! Projections read the event log themselves, each from its own
//! checkpoint, through [`dispatcher::ProjectionDispatcher`]. An
//! [`EventPublisher`] only tells them there is something new:
//! [`bus::BusPublisher`] wakes background workers, while
//! [`bus::InlinePublisher`] catches up before returning where
//! read-your-writes matters more than decoupling.
//!
//! [`EventPublisher`]: budget_core::publisher::EventPublisher

pub mod bus;
pub mod checkpoint;
pub mod dispatcher;
pub mod read_model;

/// Returns `true` if an event at `incoming` was already folded into a row
/// last updated at `applied`.
#[must_use]
pub fn is_stale(applied: Option<i64>, incoming: i64) -> bool {
    applied.is_some_and(|applied| incoming <= applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_stale() {
        assert!(!is_stale(None, 0));
        assert!(!is_stale(Some(3), 4));
        assert!(is_stale(Some(3), 3));
        assert!(is_stale(Some(3), 1));
    }
}
