//! Transaction log error types
//!
//! Error codes:
//! - TXN_LOG_APPEND_FAILED (ERROR severity)
//! - TXN_LOG_FORCE_FAILED (FATAL severity)
//! - TXN_LOG_CORRUPTION (FATAL severity)

use std::fmt;
use std::io;

/// Severity levels for transaction log errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, the coordinator continues
    Error,
    /// The log instance must be abandoned
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

/// Transaction log error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxLogErrorCode {
    /// Log write failed
    AppendFailed,
    /// Log force (fsync) failed
    ForceFailed,
    /// Log unreadable away from the tail
    Corruption,
}

impl TxLogErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            TxLogErrorCode::AppendFailed => "TXN_LOG_APPEND_FAILED",
            TxLogErrorCode::ForceFailed => "TXN_LOG_FORCE_FAILED",
            TxLogErrorCode::Corruption => "TXN_LOG_CORRUPTION",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            TxLogErrorCode::AppendFailed => Severity::Error,
            TxLogErrorCode::ForceFailed => Severity::Fatal,
            TxLogErrorCode::Corruption => Severity::Fatal,
        }
    }
}

impl fmt::Display for TxLogErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Transaction log error with context
#[derive(Debug)]
pub struct TxLogError {
    code: TxLogErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl TxLogError {
    /// Create a new append-failed error
    pub fn append_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: TxLogErrorCode::AppendFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a new force-failed error
    pub fn force_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: TxLogErrorCode::ForceFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a new corruption error
    pub fn corruption(message: impl Into<String>) -> Self {
        Self {
            code: TxLogErrorCode::Corruption,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Create a corruption error with byte offset context
    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self {
            code: TxLogErrorCode::Corruption,
            message: reason.into(),
            details: Some(format!("byte_offset: {}", offset)),
            source: None,
        }
    }

    /// Create a corruption error with sequence number context
    pub fn corruption_at_sequence(sequence: u64, reason: impl Into<String>) -> Self {
        Self {
            code: TxLogErrorCode::Corruption,
            message: reason.into(),
            details: Some(format!("sequence_number: {}", sequence)),
            source: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> TxLogErrorCode {
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

    /// Returns additional error details
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether the log instance must be abandoned
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for TxLogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for TxLogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for transaction log operations
pub type TxLogResult<T> = Result<T, TxLogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_strings() {
        assert_eq!(TxLogErrorCode::AppendFailed.code(), "TXN_LOG_APPEND_FAILED");
        assert_eq!(TxLogErrorCode::ForceFailed.code(), "TXN_LOG_FORCE_FAILED");
        assert_eq!(TxLogErrorCode::Corruption.code(), "TXN_LOG_CORRUPTION");
    }

    #[test]
    fn test_severity_levels() {
        assert_eq!(TxLogErrorCode::AppendFailed.severity(), Severity::Error);
        assert_eq!(TxLogErrorCode::ForceFailed.severity(), Severity::Fatal);
        assert_eq!(TxLogErrorCode::Corruption.severity(), Severity::Fatal);
    }

    #[test]
    fn test_force_failed_is_fatal() {
        let err = TxLogError::force_failed(
            "fsync failed",
            io::Error::new(io::ErrorKind::Other, "disk error"),
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn test_append_failed_is_not_fatal() {
        let err = TxLogError::append_failed(
            "write failed",
            io::Error::new(io::ErrorKind::Other, "disk full"),
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_display_carries_context() {
        let err = TxLogError::corruption_at_sequence(7, "checksum mismatch");
        let display = format!("{}", err);
        assert!(display.contains("FATAL"));
        assert!(display.contains("TXN_LOG_CORRUPTION"));
        assert!(display.contains("checksum mismatch"));
        assert!(display.contains("sequence_number: 7"));
    }
}
