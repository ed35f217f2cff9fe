//! Recovery manager error types
//!
//! Error codes:
//! - TXN_RECOVERY_REPLAY_FAILED (FATAL severity)
//! - TXN_RECOVERY_ACTIVATION_REFUSED (ERROR severity)
//! - TXN_RECOVERY_NOT_READY (ERROR severity)
//! - TXN_RECOVERY_QUIESCE_NOT_STARTED (ERROR severity)
//! - TXN_RECOVERY_DRAIN_FAILED (ERROR severity)
//! - TXN_RECOVERY_LOG_DISPOSITION_FAILED (ERROR severity)

use std::fmt;

use crate::lifecycle::LifecycleError;
use crate::txlog::TxLogError;

/// Severity levels for recovery errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The operation fails; the scope can be retried
    Error,
    /// The scope cannot recover; the server must not serve its work
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Recovery error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryErrorCode {
    /// The transaction log could not be opened or replayed
    ReplayFailed,
    /// The failure scope could not be activated after replay
    ActivationRefused,
    /// An operation ran out of order (resync before replay, replay twice)
    NotReady,
    /// Shutdown was requested before the quiesce fence was raised
    QuiesceNotStarted,
    /// The failure scope did not drain inside the shutdown deadline
    DrainFailed,
    /// The log could not be truncated or its service data rewritten
    DispositionFailed,
}

impl RecoveryErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            RecoveryErrorCode::ReplayFailed => "TXN_RECOVERY_REPLAY_FAILED",
            RecoveryErrorCode::ActivationRefused => "TXN_RECOVERY_ACTIVATION_REFUSED",
            RecoveryErrorCode::NotReady => "TXN_RECOVERY_NOT_READY",
            RecoveryErrorCode::QuiesceNotStarted => "TXN_RECOVERY_QUIESCE_NOT_STARTED",
            RecoveryErrorCode::DrainFailed => "TXN_RECOVERY_DRAIN_FAILED",
            RecoveryErrorCode::DispositionFailed => "TXN_RECOVERY_LOG_DISPOSITION_FAILED",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            RecoveryErrorCode::ReplayFailed => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for RecoveryErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Recovery error with context
#[derive(Debug)]
pub struct RecoveryError {
    code: RecoveryErrorCode,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl RecoveryError {
    /// Log open or replay failed; the scope cannot recover.
    pub fn replay_failed(source: TxLogError) -> Self {
        Self {
            code: RecoveryErrorCode::ReplayFailed,
            message: format!("transaction log replay failed: {}", source),
            source: Some(Box::new(source)),
        }
    }

    /// Scope activation was refused, usually because quiesce began first.
    pub fn activation_refused(scope: impl Into<String>) -> Self {
        Self {
            code: RecoveryErrorCode::ActivationRefused,
            message: format!(
                "failure scope '{}' could not be activated after replay",
                scope.into()
            ),
            source: None,
        }
    }

    /// An operation was requested out of order.
    pub fn not_ready(message: impl Into<String>) -> Self {
        Self {
            code: RecoveryErrorCode::NotReady,
            message: message.into(),
            source: None,
        }
    }

    /// Shutdown was requested without raising the quiesce fence first.
    pub fn quiesce_not_started() -> Self {
        Self {
            code: RecoveryErrorCode::QuiesceNotStarted,
            message: String::from("shutdown requires prepare_to_shutdown to run first"),
            source: None,
        }
    }

    /// The failure scope did not drain; the entry stays registered so the
    /// shutdown can be retried.
    pub fn drain_failed(source: LifecycleError) -> Self {
        Self {
            code: RecoveryErrorCode::DrainFailed,
            message: format!("failure scope drain failed: {}", source),
            source: Some(Box::new(source)),
        }
    }

    /// Final log disposition failed at shutdown.
    pub fn disposition_failed(source: TxLogError) -> Self {
        Self {
            code: RecoveryErrorCode::DispositionFailed,
            message: format!("log disposition at shutdown failed: {}", source),
            source: Some(Box::new(source)),
        }
    }

    /// Returns the error code
    pub fn code(&self) -> RecoveryErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns whether the scope must not serve work
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for RecoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )
    }
}

impl std::error::Error for RecoveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Result type for recovery operations
pub type RecoveryResult<T> = Result<T, RecoveryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_code_strings() {
        assert_eq!(
            RecoveryErrorCode::ReplayFailed.code(),
            "TXN_RECOVERY_REPLAY_FAILED"
        );
        assert_eq!(
            RecoveryErrorCode::QuiesceNotStarted.code(),
            "TXN_RECOVERY_QUIESCE_NOT_STARTED"
        );
        assert_eq!(
            RecoveryErrorCode::DrainFailed.code(),
            "TXN_RECOVERY_DRAIN_FAILED"
        );
    }

    #[test]
    fn test_replay_failure_is_fatal() {
        let source = TxLogError::force_failed(
            "fsync failed",
            io::Error::new(io::ErrorKind::Other, "disk error"),
        );
        let err = RecoveryError::replay_failed(source);
        assert!(err.is_fatal());
        assert_eq!(err.code(), RecoveryErrorCode::ReplayFailed);
    }

    #[test]
    fn test_drain_failure_is_retryable() {
        let err = RecoveryError::drain_failed(LifecycleError::drain_timeout("server1", 2));
        assert!(!err.is_fatal());
        let shown = format!("{}", err);
        assert!(shown.contains("TXN_RECOVERY_DRAIN_FAILED"));
        assert!(shown.contains("server1"));
    }

    #[test]
    fn test_quiesce_contract_message() {
        let err = RecoveryError::quiesce_not_started();
        assert!(err.message().contains("prepare_to_shutdown"));
    }
}
