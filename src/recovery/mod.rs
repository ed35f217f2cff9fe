//! Restart recovery for a failure scope
//!
//! Recovery runs in two passes over the transaction log. Replay reads the
//! log, reconstructs every in-doubt transaction from its logged unit, and
//! activates the failure scope. Resync then re-drives each reconstructed
//! outcome against its reopened participants. Between crash and replay the
//! log is the only authority; a unit whose participants cannot be reopened
//! stays in the log untouched for a later pass.
//!
//! Shutdown is the mirror image: quiesce, drain the scope, then either
//! truncate a clean log or rewrite the service data over surviving units.

mod errors;
mod manager;

pub use errors::{RecoveryError, RecoveryErrorCode, RecoveryResult, Severity};
pub use manager::{ParticipantRecovery, RecoveryManager, ReplayStats, ResyncStats};
