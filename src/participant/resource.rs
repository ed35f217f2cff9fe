//! Participant contracts and the engine-side wrapper
//!
//! `XaParticipant` is what a resource adapter implements; `Participant`
//! wraps one with the status bookkeeping the completion engine drives.
//! Status writes trace the before/after names so protocol progress can be
//! reconstructed from the diagnostic stream alone.

use crate::observability::Logger;
use crate::xa::{Vote, XaResult, Xid};

use super::status::ResourceStatus;

/// Anything that carries a two-phase-commit status.
///
/// Setting is total over the enumeration; transition legality belongs to
/// the caller, not the type.
pub trait StatefulResource {
    /// Current status.
    fn resource_status(&self) -> ResourceStatus;

    /// Overwrite the status.
    fn set_resource_status(&mut self, status: ResourceStatus);
}

/// The contract a resource adapter implements to take part in 2PC.
///
/// Calls map one-to-one onto XA verbs. Errors carry the XA code; the
/// completion engine owns the interpretation ladder.
pub trait XaParticipant: Send {
    /// Phase one: vote on the branch outcome.
    fn prepare(&mut self) -> XaResult<Vote>;

    /// Phase two: commit the prepared branch.
    fn commit(&mut self) -> XaResult<()>;

    /// Commit in a single flow, skipping prepare.
    fn commit_one_phase(&mut self) -> XaResult<()>;

    /// Roll the branch back.
    fn rollback(&mut self) -> XaResult<()>;

    /// Discard knowledge of a heuristically completed branch.
    fn forget(&mut self) -> XaResult<()>;

    /// End the work association before completion begins.
    fn end(&mut self, flags: i32) -> XaResult<()> {
        let _ = flags;
        Ok(())
    }

    /// Opaque identity of the resource manager behind this adapter.
    ///
    /// `None` (the default) opts out of same-RM matching.
    fn rm_identity(&self) -> Option<String> {
        None
    }

    /// Whether this adapter talks to the same resource manager as `other`.
    ///
    /// When it does, the coordinator may join both onto one branch instead
    /// of minting a second one. The default compares `rm_identity`.
    fn is_same_rm(&self, other: &dyn XaParticipant) -> bool {
        match (self.rm_identity(), other.rm_identity()) {
            (Some(mine), Some(theirs)) => mine == theirs,
            _ => false,
        }
    }

    /// Whether the adapter can complete via a single one-phase flow.
    fn supports_one_phase(&self) -> bool {
        false
    }

    /// Relative commit order; higher prepares and commits earlier.
    fn commit_priority(&self) -> i32 {
        0
    }

    /// Identifies the factory able to recreate this participant during
    /// recovery. Zero means not recoverable.
    fn recovery_id(&self) -> u64 {
        0
    }

    /// Human-readable identity for diagnostics.
    fn describe(&self) -> String {
        String::from("<unnamed participant>")
    }

    /// Release any resource-manager association. Called once when the
    /// coordinator is finished with the participant.
    fn destroy(&mut self) {}
}

/// One enlisted participant: an adapter plus the engine's bookkeeping.
pub struct Participant {
    inner: Box<dyn XaParticipant>,
    status: ResourceStatus,
    xid: Xid,
    joined: bool,
    failed: bool,
    destroyed: bool,
}

impl Participant {
    /// Wrap an adapter under the given branch identity.
    pub fn new(inner: Box<dyn XaParticipant>, xid: Xid) -> Self {
        Self {
            inner,
            status: ResourceStatus::None,
            xid,
            joined: false,
            failed: false,
            destroyed: false,
        }
    }

    /// The branch identity this participant works under.
    pub fn xid(&self) -> &Xid {
        &self.xid
    }

    /// Relative commit order, delegated to the adapter.
    pub fn priority(&self) -> i32 {
        self.inner.commit_priority()
    }

    /// Recovery factory id, delegated to the adapter.
    pub fn recovery_id(&self) -> u64 {
        self.inner.recovery_id()
    }

    /// Whether the adapter can complete one-phase.
    pub fn supports_one_phase(&self) -> bool {
        self.inner.supports_one_phase()
    }

    /// Whether this participant joined an existing branch (`TMJOIN`).
    pub fn is_joined(&self) -> bool {
        self.joined
    }

    pub(crate) fn mark_joined(&mut self) {
        self.joined = true;
    }

    /// Whether the resource manager connection is marked failed.
    ///
    /// A failed participant is re-driven on retry so the adapter can
    /// re-establish its connection.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Mark the resource manager connection failed.
    pub fn mark_failed(&mut self) {
        self.failed = true;
    }

    /// Clear the failed mark after a successful retry.
    pub fn clear_failed(&mut self) {
        self.failed = false;
    }

    /// Whether the coordinator is finished with this participant.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Release the participant. Idempotent.
    pub fn destroy(&mut self) {
        if !self.destroyed {
            self.inner.destroy();
            self.destroyed = true;
        }
    }

    /// Adapter identity for diagnostics.
    pub fn describe(&self) -> String {
        self.inner.describe()
    }

    /// Same-RM probe against another adapter.
    pub fn is_same_rm(&self, other: &Participant) -> bool {
        self.inner.is_same_rm(other.inner.as_ref())
    }

    /// Same-RM probe against a not-yet-enlisted adapter.
    pub(crate) fn same_rm_as_adapter(&self, adapter: &dyn XaParticipant) -> bool {
        self.inner.is_same_rm(adapter)
    }

    // --- XA flows -----------------------------------------------------

    pub fn prepare(&mut self) -> XaResult<Vote> {
        self.inner.prepare()
    }

    pub fn commit(&mut self) -> XaResult<()> {
        self.inner.commit()
    }

    pub fn commit_one_phase(&mut self) -> XaResult<()> {
        self.inner.commit_one_phase()
    }

    pub fn rollback(&mut self) -> XaResult<()> {
        self.inner.rollback()
    }

    pub fn forget(&mut self) -> XaResult<()> {
        self.inner.forget()
    }

    pub fn end(&mut self, flags: i32) -> XaResult<()> {
        self.inner.end(flags)
    }
}

impl StatefulResource for Participant {
    fn resource_status(&self) -> ResourceStatus {
        self.status
    }

    fn set_resource_status(&mut self, status: ResourceStatus) {
        Logger::trace(
            "PARTICIPANT_STATUS",
            &[
                ("before", self.status.as_str()),
                ("after", status.as_str()),
                ("xid", &self.xid.to_string()),
            ],
        );
        self.status = status;
    }
}

impl std::fmt::Debug for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Participant")
            .field("xid", &self.xid.to_string())
            .field("status", &self.status)
            .field("failed", &self.failed)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
