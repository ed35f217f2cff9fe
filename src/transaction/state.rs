//! Transaction state enumeration
//!
//! Twelve states covering the life of a coordinated transaction. The
//! numeric codes are persisted in the recovery log's state section, so
//! they are fixed; `None` doubles as the reset state and is never
//! persisted.

use std::fmt;

/// Coordinator-side state of one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// No transaction, or a completed one that has been forgotten.
    None,
    /// Accepting enlistments and work.
    Active,
    /// Prepare votes are being collected.
    Preparing,
    /// All votes collected; awaiting the superior's decision.
    Prepared,
    /// Commit decision made and logged; outcome delivery in progress.
    Committing,
    /// A single participant is completing in one phase.
    CommittingOnePhase,
    /// Every participant acknowledged the commit.
    Committed,
    /// Rollback delivery in progress.
    RollingBack,
    /// Every participant acknowledged the rollback.
    RolledBack,
    /// The deciding one-phase participant failed with an unknown outcome.
    LastParticipant,
    /// Subordinate completed commit with heuristic damage; awaiting forget.
    HeuristicOnCommit,
    /// Subordinate completed rollback with heuristic damage; awaiting forget.
    HeuristicOnRollback,
}

impl TransactionState {
    /// The persisted code for this state.
    pub fn as_code(self) -> i32 {
        match self {
            TransactionState::None => -1,
            TransactionState::Active => 0,
            TransactionState::Preparing => 1,
            TransactionState::Prepared => 2,
            TransactionState::Committing => 3,
            TransactionState::Committed => 4,
            TransactionState::RollingBack => 5,
            TransactionState::RolledBack => 6,
            TransactionState::CommittingOnePhase => 7,
            TransactionState::LastParticipant => 8,
            TransactionState::HeuristicOnCommit => 9,
            TransactionState::HeuristicOnRollback => 10,
        }
    }

    /// Decode a persisted state code.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(TransactionState::None),
            0 => Some(TransactionState::Active),
            1 => Some(TransactionState::Preparing),
            2 => Some(TransactionState::Prepared),
            3 => Some(TransactionState::Committing),
            4 => Some(TransactionState::Committed),
            5 => Some(TransactionState::RollingBack),
            6 => Some(TransactionState::RolledBack),
            7 => Some(TransactionState::CommittingOnePhase),
            8 => Some(TransactionState::LastParticipant),
            9 => Some(TransactionState::HeuristicOnCommit),
            10 => Some(TransactionState::HeuristicOnRollback),
            _ => None,
        }
    }

    /// Display name.
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionState::None => "NONE",
            TransactionState::Active => "ACTIVE",
            TransactionState::Preparing => "PREPARING",
            TransactionState::Prepared => "PREPARED",
            TransactionState::Committing => "COMMITTING",
            TransactionState::Committed => "COMMITTED",
            TransactionState::RollingBack => "ROLLING_BACK",
            TransactionState::RolledBack => "ROLLED_BACK",
            TransactionState::CommittingOnePhase => "COMMITTING_ONE_PHASE",
            TransactionState::LastParticipant => "LAST_PARTICIPANT",
            TransactionState::HeuristicOnCommit => "HEURISTIC_ON_COMMIT",
            TransactionState::HeuristicOnRollback => "HEURISTIC_ON_ROLLBACK",
        }
    }

    /// Whether the transaction finished and will not change again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::RolledBack
        )
    }

    /// Whether a recovered unit in this state still needs outcome work.
    pub fn needs_resync(self) -> bool {
        matches!(
            self,
            TransactionState::Preparing
                | TransactionState::Prepared
                | TransactionState::Committing
                | TransactionState::CommittingOnePhase
                | TransactionState::RollingBack
                | TransactionState::LastParticipant
                | TransactionState::HeuristicOnCommit
                | TransactionState::HeuristicOnRollback
        )
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip() {
        for code in -1..=10 {
            let state = TransactionState::from_code(code).unwrap();
            assert_eq!(state.as_code(), code);
        }
        assert!(TransactionState::from_code(11).is_none());
        assert!(TransactionState::from_code(-2).is_none());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(TransactionState::Committing.as_str(), "COMMITTING");
        assert_eq!(
            TransactionState::HeuristicOnRollback.as_str(),
            "HEURISTIC_ON_ROLLBACK"
        );
        assert_eq!(format!("{}", TransactionState::Prepared), "PREPARED");
    }

    #[test]
    fn test_terminal_states() {
        assert!(TransactionState::Committed.is_terminal());
        assert!(TransactionState::RolledBack.is_terminal());
        assert!(!TransactionState::Committing.is_terminal());
        assert!(!TransactionState::HeuristicOnCommit.is_terminal());
    }

    #[test]
    fn test_resync_states() {
        assert!(TransactionState::Committing.needs_resync());
        assert!(TransactionState::Prepared.needs_resync());
        assert!(TransactionState::LastParticipant.needs_resync());
        assert!(!TransactionState::Committed.needs_resync());
        assert!(!TransactionState::Active.needs_resync());
        assert!(!TransactionState::None.needs_resync());
    }
}
