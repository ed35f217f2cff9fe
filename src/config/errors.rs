//! Configuration error types
//!
//! Configuration problems are fatal at startup: the process reports the
//! error and exits rather than running with guessed values.

use std::fmt;

/// Configuration error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorCode {
    /// The config file exists but could not be read.
    ReadFailed,
    /// The config file is not valid JSON for the expected shape.
    ParseFailed,
    /// A field value fails validation.
    InvalidValue,
}

impl ConfigErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ReadFailed => "TXN_CONFIG_READ_FAILED",
            Self::ParseFailed => "TXN_CONFIG_PARSE_FAILED",
            Self::InvalidValue => "TXN_CONFIG_INVALID_VALUE",
        }
    }
}

/// Configuration error
#[derive(Debug, Clone)]
pub struct ConfigError {
    code: ConfigErrorCode,
    message: String,
}

impl ConfigError {
    pub fn new(code: ConfigErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn read_failed(msg: impl Into<String>) -> Self {
        Self::new(ConfigErrorCode::ReadFailed, msg)
    }

    pub fn parse_failed(msg: impl Into<String>) -> Self {
        Self::new(ConfigErrorCode::ParseFailed, msg)
    }

    pub fn invalid_value(msg: impl Into<String>) -> Self {
        Self::new(ConfigErrorCode::InvalidValue, msg)
    }

    pub fn code(&self) -> ConfigErrorCode {
        self.code
    }

    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_strings() {
        assert_eq!(
            ConfigErrorCode::ReadFailed.code(),
            "TXN_CONFIG_READ_FAILED"
        );
        assert_eq!(
            ConfigErrorCode::ParseFailed.code(),
            "TXN_CONFIG_PARSE_FAILED"
        );
        assert_eq!(
            ConfigErrorCode::InvalidValue.code(),
            "TXN_CONFIG_INVALID_VALUE"
        );
    }

    #[test]
    fn test_display_includes_code_and_message() {
        let err = ConfigError::invalid_value("retry_interval_ms must be > 0");
        let text = err.to_string();
        assert!(text.contains("TXN_CONFIG_INVALID_VALUE"));
        assert!(text.contains("retry_interval_ms"));
    }
}
