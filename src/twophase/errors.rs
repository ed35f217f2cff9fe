//! Completion protocol errors
//!
//! A completion call resolves to one of three failure shapes: the
//! transaction must roll back, the outcome is heuristically damaged, or
//! the coordinator hit an unrecoverable internal condition. Heuristic
//! errors carry the folded verdict so callers can report the exact damage.

use std::fmt;

use crate::participant::ResourceStatus;

/// Errors from prepare, outcome, and forget distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TwoPhaseError {
    /// The transaction cannot commit and must roll back.
    RollbackRequired { detail: String },

    /// Completion finished with heuristic damage.
    ///
    /// `verdict` is one of the four heuristic statuses.
    Heuristic {
        verdict: ResourceStatus,
        detail: String,
    },

    /// An unrecoverable coordinator or resource-manager error.
    System { detail: String },

    /// The participant could not be enlisted.
    EnlistRefused { detail: String },
}

impl TwoPhaseError {
    pub fn rollback_required(detail: impl Into<String>) -> Self {
        TwoPhaseError::RollbackRequired {
            detail: detail.into(),
        }
    }

    pub fn heuristic(verdict: ResourceStatus, detail: impl Into<String>) -> Self {
        TwoPhaseError::Heuristic {
            verdict,
            detail: detail.into(),
        }
    }

    pub fn system(detail: impl Into<String>) -> Self {
        TwoPhaseError::System {
            detail: detail.into(),
        }
    }

    pub fn enlist_refused(detail: impl Into<String>) -> Self {
        TwoPhaseError::EnlistRefused {
            detail: detail.into(),
        }
    }

    /// The heuristic verdict, when this error reports one.
    pub fn verdict(&self) -> Option<ResourceStatus> {
        match self {
            TwoPhaseError::Heuristic { verdict, .. } => Some(*verdict),
            _ => None,
        }
    }

    /// Whether this error reports heuristic damage.
    pub fn is_heuristic(&self) -> bool {
        matches!(self, TwoPhaseError::Heuristic { .. })
    }
}

impl fmt::Display for TwoPhaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TwoPhaseError::RollbackRequired { detail } => {
                write!(f, "transaction must roll back: {}", detail)
            }
            TwoPhaseError::Heuristic { verdict, detail } => {
                write!(f, "heuristic outcome {}: {}", verdict.as_str(), detail)
            }
            TwoPhaseError::System { detail } => {
                write!(f, "transaction service error: {}", detail)
            }
            TwoPhaseError::EnlistRefused { detail } => {
                write!(f, "enlistment refused: {}", detail)
            }
        }
    }
}

impl std::error::Error for TwoPhaseError {}

/// Result type for completion operations.
pub type TwoPhaseResult<T> = Result<T, TwoPhaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heuristic_display_names_verdict() {
        let err = TwoPhaseError::heuristic(ResourceStatus::HeuristicMixed, "1 of 3 rolled back");
        let shown = format!("{}", err);
        assert!(shown.contains("HEURISTIC_MIXED"));
        assert!(shown.contains("1 of 3"));
    }

    #[test]
    fn test_verdict_accessor() {
        let err = TwoPhaseError::heuristic(ResourceStatus::HeuristicHazard, "lost contact");
        assert_eq!(err.verdict(), Some(ResourceStatus::HeuristicHazard));
        assert!(err.is_heuristic());

        let err = TwoPhaseError::rollback_required("vote");
        assert_eq!(err.verdict(), None);
        assert!(!err.is_heuristic());
    }

    #[test]
    fn test_rollback_display() {
        let shown = format!("{}", TwoPhaseError::rollback_required("participant voted no"));
        assert!(shown.contains("roll back"));
        assert!(shown.contains("voted no"));
    }
}
