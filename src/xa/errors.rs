//! XA protocol errors
//!
//! An `XaError` is the coordinator-side rendering of a non-OK answer from a
//! resource manager. The numeric code drives the completion ladders; the
//! symbolic name travels in diagnostics.

use std::fmt;

use super::codes::{self, convert_xa_code};

/// A non-OK answer from an XA flow to a participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XaError {
    code: i32,
    message: Option<String>,
}

impl XaError {
    /// An error carrying just the XA code.
    pub fn new(code: i32) -> Self {
        Self { code, message: None }
    }

    /// An error with additional resource-manager detail.
    pub fn with_message(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }

    /// The raw XA return/error code.
    pub fn code(&self) -> i32 {
        self.code
    }

    /// The symbolic name for the code.
    pub fn code_name(&self) -> String {
        convert_xa_code(self.code)
    }

    /// Whether the code is a rollback vote (`XA_RB*`).
    pub fn is_rollback_vote(&self) -> bool {
        codes::is_rollback_vote(self.code)
    }

    /// Whether the code reports a heuristic completion.
    pub fn is_heuristic(&self) -> bool {
        matches!(
            self.code,
            codes::XA_HEURCOM | codes::XA_HEURRB | codes::XA_HEURMIX | codes::XA_HEURHAZ
        )
    }
}

impl fmt::Display for XaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "XA error {}", convert_xa_code(self.code))?;
        if let Some(ref message) = self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

impl std::error::Error for XaError {}

/// Result type for XA flows to a participant.
pub type XaResult<T> = Result<T, XaError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xa::codes::{XAER_NOTA, XA_HEURRB, XA_RBDEADLOCK};

    #[test]
    fn test_display_symbolic_name() {
        let err = XaError::new(XAER_NOTA);
        assert_eq!(format!("{}", err), "XA error XAER_NOTA");
    }

    #[test]
    fn test_display_with_message() {
        let err = XaError::with_message(XA_HEURRB, "branch rolled back by operator");
        let shown = format!("{}", err);
        assert!(shown.contains("XA_HEURRB"));
        assert!(shown.contains("operator"));
    }

    #[test]
    fn test_classification() {
        assert!(XaError::new(XA_RBDEADLOCK).is_rollback_vote());
        assert!(!XaError::new(XAER_NOTA).is_rollback_vote());
        assert!(XaError::new(XA_HEURRB).is_heuristic());
        assert!(!XaError::new(XA_RBDEADLOCK).is_heuristic());
    }

    #[test]
    fn test_unknown_code_decimal_in_display() {
        let err = XaError::new(1234);
        assert_eq!(format!("{}", err), "XA error 1234");
    }
}
