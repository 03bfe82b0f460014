//! Lifecycle-specific error types

use super::LifecycleState;
use thiserror::Error;

/// Errors raised by lifecycle state transitions
#[derive(Debug, Clone, Error)]
pub enum LifecycleError {
    /// A transition tried to move to a lower-ranked state
    #[error("{name}: cannot revert from {from} to {to}")]
    InvalidTransition {
        /// Name of the lifecycle object
        name: String,
        /// Current state
        from: LifecycleState,
        /// Requested state
        to: LifecycleState,
    },

    /// The object is already in the requested state
    #[error("{name} is already {state}")]
    AlreadyInState {
        /// Name of the lifecycle object
        name: String,
        /// The state it is in
        state: LifecycleState,
    },

    /// The object failed earlier and will never reach the awaited state
    #[error("{name} failed before reaching {awaited}: {reason}")]
    Aborted {
        /// Name of the lifecycle object
        name: String,
        /// The state that was being waited for
        awaited: LifecycleState,
        /// Failure recorded by the object
        reason: String,
    },
}

impl LifecycleError {
    /// Create an invalid transition error
    pub fn invalid_transition(
        name: impl Into<String>,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Self {
        Self::InvalidTransition {
            name: name.into(),
            from,
            to,
        }
    }

    /// Create an aborted error
    pub fn aborted(
        name: impl Into<String>,
        awaited: LifecycleState,
        reason: impl Into<String>,
    ) -> Self {
        Self::Aborted {
            name: name.into(),
            awaited,
            reason: reason.into(),
        }
    }
}
