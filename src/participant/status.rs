//! Two-phase-commit participant status
//!
//! The status enumeration a resource moves through during 2PC. The numeric
//! codes are order-significant and appear in the recovery log and in
//! diagnostics, so they are fixed: `None` must be 0 (heuristic folding
//! treats it as the identity) and the heuristic block must stay contiguous
//! at 8..=11.

use std::fmt;

use serde::Serialize;

/// Status of one participant in a two-phase-commit transaction.
///
/// The enum itself does not police transitions; legality is the completion
/// engine's contract. Every status has a fixed numeric code for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(i32)]
pub enum ResourceStatus {
    /// Not yet part of any transaction.
    None = 0,

    /// Enlisted in a transaction, not yet prepared.
    Registered = 1,

    /// Voted commit in phase one; awaiting the outcome.
    Prepared = 2,

    /// Outcome delivery to this participant is in flight.
    Completing = 3,

    /// Fully done with the transaction (including any forget).
    Completed = 4,

    /// One-phase commit flow to this participant is in flight.
    CompletingOnePhase = 5,

    /// Rolled back.
    RolledBack = 6,

    /// Committed.
    Committed = 7,

    /// Heuristically committed without coordinator instruction.
    HeuristicCommit = 8,

    /// Heuristically rolled back without coordinator instruction.
    HeuristicRollback = 9,

    /// Part of the branch committed and part rolled back.
    HeuristicMixed = 10,

    /// The branch outcome cannot be determined.
    HeuristicHazard = 11,
}

impl ResourceStatus {
    /// The fixed numeric code for this status.
    pub fn as_code(&self) -> i32 {
        *self as i32
    }

    /// Decode a numeric status code.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ResourceStatus::None),
            1 => Some(ResourceStatus::Registered),
            2 => Some(ResourceStatus::Prepared),
            3 => Some(ResourceStatus::Completing),
            4 => Some(ResourceStatus::Completed),
            5 => Some(ResourceStatus::CompletingOnePhase),
            6 => Some(ResourceStatus::RolledBack),
            7 => Some(ResourceStatus::Committed),
            8 => Some(ResourceStatus::HeuristicCommit),
            9 => Some(ResourceStatus::HeuristicRollback),
            10 => Some(ResourceStatus::HeuristicMixed),
            11 => Some(ResourceStatus::HeuristicHazard),
            _ => None,
        }
    }

    /// The display name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::None => "NONE",
            ResourceStatus::Registered => "REGISTERED",
            ResourceStatus::Prepared => "PREPARED",
            ResourceStatus::Completing => "COMPLETING",
            ResourceStatus::Completed => "COMPLETED",
            ResourceStatus::CompletingOnePhase => "COMPLETING_ONE_PHASE",
            ResourceStatus::RolledBack => "ROLLEDBACK",
            ResourceStatus::Committed => "COMMITTED",
            ResourceStatus::HeuristicCommit => "HEURISTIC_COMMIT",
            ResourceStatus::HeuristicRollback => "HEURISTIC_ROLLBACK",
            ResourceStatus::HeuristicMixed => "HEURISTIC_MIXED",
            ResourceStatus::HeuristicHazard => "HEURISTIC_HAZARD",
        }
    }

    /// Whether this status records a heuristic completion.
    pub fn is_heuristic(&self) -> bool {
        matches!(
            self,
            ResourceStatus::HeuristicCommit
                | ResourceStatus::HeuristicRollback
                | ResourceStatus::HeuristicMixed
                | ResourceStatus::HeuristicHazard
        )
    }

    /// Whether this participant still has outcome work ahead of it.
    pub fn awaits_outcome(&self) -> bool {
        matches!(
            self,
            ResourceStatus::Registered
                | ResourceStatus::Prepared
                | ResourceStatus::Completing
                | ResourceStatus::CompletingOnePhase
        )
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Render any integer status code for display.
///
/// Codes outside the enumeration render as `"ILLEGAL STATE"`; this is a
/// display-only safety net, not an enforcement point.
pub fn status_name(code: i32) -> &'static str {
    match ResourceStatus::from_code(code) {
        Some(status) => status.as_str(),
        None => "ILLEGAL STATE",
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // === CODE MAPPING TESTS ===

    #[test]
    fn test_none_is_zero() {
        assert_eq!(ResourceStatus::None.as_code(), 0);
    }

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ResourceStatus::Registered.as_code(), 1);
        assert_eq!(ResourceStatus::Prepared.as_code(), 2);
        assert_eq!(ResourceStatus::Completing.as_code(), 3);
        assert_eq!(ResourceStatus::Completed.as_code(), 4);
        assert_eq!(ResourceStatus::CompletingOnePhase.as_code(), 5);
        assert_eq!(ResourceStatus::RolledBack.as_code(), 6);
        assert_eq!(ResourceStatus::Committed.as_code(), 7);
        assert_eq!(ResourceStatus::HeuristicCommit.as_code(), 8);
        assert_eq!(ResourceStatus::HeuristicRollback.as_code(), 9);
        assert_eq!(ResourceStatus::HeuristicMixed.as_code(), 10);
        assert_eq!(ResourceStatus::HeuristicHazard.as_code(), 11);
    }

    #[test]
    fn test_from_code_roundtrip() {
        for code in 0..=11 {
            let status = ResourceStatus::from_code(code).unwrap();
            assert_eq!(status.as_code(), code);
        }
    }

    #[test]
    fn test_from_code_out_of_range() {
        assert_eq!(ResourceStatus::from_code(-1), None);
        assert_eq!(ResourceStatus::from_code(12), None);
        assert_eq!(ResourceStatus::from_code(i32::MAX), None);
    }

    // === DISPLAY NAME TESTS ===

    #[test]
    fn test_exact_display_names() {
        assert_eq!(status_name(0), "NONE");
        assert_eq!(status_name(1), "REGISTERED");
        assert_eq!(status_name(2), "PREPARED");
        assert_eq!(status_name(3), "COMPLETING");
        assert_eq!(status_name(4), "COMPLETED");
        assert_eq!(status_name(5), "COMPLETING_ONE_PHASE");
        assert_eq!(status_name(6), "ROLLEDBACK");
        assert_eq!(status_name(7), "COMMITTED");
        assert_eq!(status_name(8), "HEURISTIC_COMMIT");
        assert_eq!(status_name(9), "HEURISTIC_ROLLBACK");
        assert_eq!(status_name(10), "HEURISTIC_MIXED");
        assert_eq!(status_name(11), "HEURISTIC_HAZARD");
    }

    #[test]
    fn test_illegal_state_fallback() {
        assert_eq!(status_name(-1), "ILLEGAL STATE");
        assert_eq!(status_name(12), "ILLEGAL STATE");
        assert_eq!(status_name(100), "ILLEGAL STATE");
        assert_eq!(status_name(i32::MIN), "ILLEGAL STATE");
    }

    #[test]
    fn test_display_matches_as_str() {
        assert_eq!(
            format!("{}", ResourceStatus::CompletingOnePhase),
            "COMPLETING_ONE_PHASE"
        );
    }

    // === CLASSIFICATION TESTS ===

    #[test]
    fn test_heuristic_block() {
        for code in 8..=11 {
            assert!(ResourceStatus::from_code(code).unwrap().is_heuristic());
        }
        for code in 0..=7 {
            assert!(!ResourceStatus::from_code(code).unwrap().is_heuristic());
        }
    }

    #[test]
    fn test_awaits_outcome() {
        assert!(ResourceStatus::Registered.awaits_outcome());
        assert!(ResourceStatus::Prepared.awaits_outcome());
        assert!(ResourceStatus::Completing.awaits_outcome());
        assert!(ResourceStatus::CompletingOnePhase.awaits_outcome());
        assert!(!ResourceStatus::Completed.awaits_outcome());
        assert!(!ResourceStatus::Committed.awaits_outcome());
        assert!(!ResourceStatus::HeuristicHazard.awaits_outcome());
    }
}
