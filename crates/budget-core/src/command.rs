//! Command abstractions.

use uuid::Uuid;

/// Trait that all commands implement.
///
/// A command targets exactly one aggregate operation and carries the
/// identity of the user issuing it.
pub trait Command: Send + Sync + std::fmt::Debug {
    /// The type name for this command (for logging/routing).
    fn command_type(&self) -> &'static str;

    /// Correlation ID to trace this command through the system.
    fn correlation_id(&self) -> Uuid;

    /// The user on whose behalf the command runs.
    fn acting_user_id(&self) -> Uuid;
}
