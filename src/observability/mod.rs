//! Observability subsystem for txncore
//!
//! This module provides:
//! - Structured logging (JSON lines, deterministic key order)
//! - Lifecycle event tracing
//! - Operation scopes with paired BEGIN/COMPLETE output
//! - An append-only audit trail of completion and forget flows
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on protocol execution
//! 3. No async or background threads
//! 4. Deterministic output
//!
//! # Usage
//!
//! ```ignore
//! use txncore::observability::{Logger, Event, ObservationScope};
//!
//! // Log an event
//! Logger::info("RESYNC_COMPLETE", &[("recovered", "3")]);
//!
//! // Scope-based logging
//! let scope = ObservationScope::new("REPLAY");
//! // ... read the log ...
//! scope.complete();
//! ```

mod events;
mod logger;
mod scope;
pub mod audit;

pub use audit::{AuditAction, AuditDirection, AuditLog, AuditRecord, FileAuditLog, MemoryAuditLog};
pub use events::Event;
pub use logger::{Logger, Severity};
pub use scope::{quiet_fail, ObservationScope, Timer};

/// Log a lifecycle event
pub fn log_event(event: Event) {
    let severity = if event.is_fatal() {
        Severity::Fatal
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_fatal() {
        Severity::Fatal
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), fields);
}
