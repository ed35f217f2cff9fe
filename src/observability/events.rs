//! Lifecycle events for txncore
//!
//! Events are explicit and typed; the recovery, transaction log, and
//! failure-scope paths log these at their transition points.

use std::fmt;

/// Observable lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Recovery lifecycle
    /// Recovery processing started for a failure scope
    RecoveryStart,
    /// Transaction log replay begins
    ReplayBegin,
    /// Transaction log replay complete, scope activated
    ReplayComplete,
    /// Resync of recovered transactions begins
    ResyncBegin,
    /// Resync complete, no recovered work outstanding
    ResyncComplete,
    /// Recovery failed (FATAL)
    RecoveryFailed,

    // Transaction log
    /// Log record appended
    LogAppend,
    /// Log forced to disk
    LogForce,
    /// Log truncated at a keypoint
    LogTruncate,
    /// Log corruption detected away from the tail (FATAL)
    LogCorruption,

    // Scope lifecycle
    /// Failure scope registered as active
    ScopeActivated,
    /// Failure scope drained and removed
    ScopeDeactivated,
    /// Quiesce fence raised, no new activations accepted
    QuiesceBegin,

    // Shutdown
    /// Shutdown initiated
    ShutdownStart,
    /// Shutdown complete
    ShutdownComplete,
}

impl Event {
    /// Returns the event name string
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::RecoveryStart => "RECOVERY_START",
            Event::ReplayBegin => "REPLAY_BEGIN",
            Event::ReplayComplete => "REPLAY_COMPLETE",
            Event::ResyncBegin => "RESYNC_BEGIN",
            Event::ResyncComplete => "RESYNC_COMPLETE",
            Event::RecoveryFailed => "RECOVERY_FAILED",
            Event::LogAppend => "LOG_APPEND",
            Event::LogForce => "LOG_FORCE",
            Event::LogTruncate => "LOG_TRUNCATE",
            Event::LogCorruption => "LOG_CORRUPTION",
            Event::ScopeActivated => "SCOPE_ACTIVATED",
            Event::ScopeDeactivated => "SCOPE_DEACTIVATED",
            Event::QuiesceBegin => "QUIESCE_BEGIN",
            Event::ShutdownStart => "SHUTDOWN_START",
            Event::ShutdownComplete => "SHUTDOWN_COMPLETE",
        }
    }

    /// Whether this event signals an unrecoverable condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::RecoveryFailed | Event::LogCorruption)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(Event::ReplayComplete.as_str(), "REPLAY_COMPLETE");
        assert_eq!(Event::QuiesceBegin.as_str(), "QUIESCE_BEGIN");
        assert_eq!(Event::ScopeDeactivated.as_str(), "SCOPE_DEACTIVATED");
    }

    #[test]
    fn test_fatal_events() {
        assert!(Event::RecoveryFailed.is_fatal());
        assert!(Event::LogCorruption.is_fatal());
        assert!(!Event::ReplayComplete.is_fatal());
        assert!(!Event::ShutdownComplete.is_fatal());
    }

    #[test]
    fn test_event_display() {
        assert_eq!(format!("{}", Event::ResyncBegin), "RESYNC_BEGIN");
    }
}
