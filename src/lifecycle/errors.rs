//! Lifecycle registry errors

use std::fmt;

/// Errors from failure-scope activation, activity, and drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// `deactivate` was called before the quiesce fence was raised.
    ///
    /// Deregistration is only safe once new activations are fenced off;
    /// the registry checks the ordering instead of assuming it.
    QuiesceNotStarted,

    /// The record is not (or no longer) in the registry.
    NotRegistered { identity: String },

    /// The activity count did not drain to zero inside the deadline.
    DrainTimeout { identity: String, remaining: usize },

    /// A cancellation signal ended the drain wait early.
    DrainCancelled { identity: String, remaining: usize },

    /// New activity was refused because the scope is draining.
    NotAcceptingWork { identity: String },
}

impl LifecycleError {
    pub fn not_registered(identity: impl Into<String>) -> Self {
        LifecycleError::NotRegistered {
            identity: identity.into(),
        }
    }

    pub fn drain_timeout(identity: impl Into<String>, remaining: usize) -> Self {
        LifecycleError::DrainTimeout {
            identity: identity.into(),
            remaining,
        }
    }

    pub fn drain_cancelled(identity: impl Into<String>, remaining: usize) -> Self {
        LifecycleError::DrainCancelled {
            identity: identity.into(),
            remaining,
        }
    }

    pub fn not_accepting_work(identity: impl Into<String>) -> Self {
        LifecycleError::NotAcceptingWork {
            identity: identity.into(),
        }
    }
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleError::QuiesceNotStarted => {
                write!(f, "deactivation requires the quiesce fence to be raised first")
            }
            LifecycleError::NotRegistered { identity } => {
                write!(f, "failure scope '{}' is not registered", identity)
            }
            LifecycleError::DrainTimeout { identity, remaining } => {
                write!(
                    f,
                    "drain of failure scope '{}' timed out with {} activities outstanding",
                    identity, remaining
                )
            }
            LifecycleError::DrainCancelled { identity, remaining } => {
                write!(
                    f,
                    "drain of failure scope '{}' cancelled with {} activities outstanding",
                    identity, remaining
                )
            }
            LifecycleError::NotAcceptingWork { identity } => {
                write!(f, "failure scope '{}' is not accepting new work", identity)
            }
        }
    }
}

impl std::error::Error for LifecycleError {}

/// Result type for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_scope() {
        let err = LifecycleError::drain_timeout("server1", 3);
        let shown = format!("{}", err);
        assert!(shown.contains("server1"));
        assert!(shown.contains('3'));
    }

    #[test]
    fn test_quiesce_not_started_display() {
        let shown = format!("{}", LifecycleError::QuiesceNotStarted);
        assert!(shown.contains("quiesce"));
    }
}
