//! Two-phase commit distribution
//!
//! The machinery that drives prepare, outcome, and forget flows across a
//! transaction's participants, plus the retry clock that paces completion
//! attempts against unreachable resource managers.

mod errors;
mod resources;
mod retry;

pub use errors::{TwoPhaseError, TwoPhaseResult};
pub use resources::{PrepareResult, ResourceList};
pub use retry::RetryClock;
