//! Participant list and outcome distribution
//!
//! `ResourceList` owns every participant enlisted in one transaction and
//! drives the two-phase protocol across them: prepare voting, the
//! one-phase optimisations, commit/rollback delivery, forget, and the
//! retry bookkeeping that feeds the coordinator's completion loop.
//!
//! Ordering rules: participants prepare in descending commit-priority
//! order (equal priorities in reverse enlistment order) and complete in
//! descending priority order (equal priorities in enlistment order). A
//! one-phase participant is pinned at slot 0 and completed last.
//!
//! Error handling follows the X/Open ladders: heuristic codes latch
//! participant statuses, `XAER_RMFAIL`/`XA_RETRY` mark the connection
//! failed and queue the participant for retry, and protocol errors latch
//! a system error that surfaces after distribution finishes. The
//! transaction-level heuristic verdict is a monotone fold over participant
//! statuses; once damage is recorded it never downgrades.

use std::sync::Arc;

use crate::observability::audit::{AuditAction, AuditDirection, AuditLog, AuditRecord};
use crate::observability::Logger;
use crate::participant::heuristic;
use crate::participant::{Participant, ResourceStatus, StatefulResource, XaParticipant};
use crate::xa::codes::{
    XAER_NOTA, XAER_RMERR, XAER_RMFAIL, XA_HEURCOM, XA_HEURHAZ, XA_HEURMIX, XA_HEURRB, XA_RETRY,
};
use crate::xa::{Vote, XaError, Xid};

use super::errors::{TwoPhaseError, TwoPhaseResult};

/// Consolidated result of prepare distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareResult {
    /// Every participant voted read-only; there is no outcome to deliver.
    ReadOnly,

    /// Two or more commit votes; the outcome must be logged and delivered.
    Commit,

    /// Completed through a one-phase optimisation; no outcome phase runs.
    OnePhaseOpt,

    /// The one-phase optimisation target rolled back; everything else had
    /// voted read-only, so no rollback distribution is needed.
    OnePhaseOptRollback,
}

/// The participants of one transaction and their completion machinery.
pub struct ResourceList {
    global_xid: Xid,
    participants: Vec<Participant>,
    next_branch: u32,
    one_phase_enlisted: bool,
    priority_enlisted: bool,
    join_same_rm: bool,
    sorted: bool,
    outcome_is_commit: bool,
    ok_vote_count: usize,
    retry_completion: bool,
    retry_required: bool,
    heuristic_outcome: ResourceStatus,
    system_error: Option<XaError>,
    diagnostics_required: bool,
    audit: Option<Arc<dyn AuditLog>>,
}

impl ResourceList {
    /// An empty list for the given global transaction identity.
    pub fn new(global_xid: Xid) -> Self {
        Self {
            global_xid,
            participants: Vec::new(),
            next_branch: 1,
            one_phase_enlisted: false,
            priority_enlisted: false,
            join_same_rm: false,
            sorted: false,
            outcome_is_commit: false,
            ok_vote_count: 0,
            retry_completion: false,
            retry_required: false,
            heuristic_outcome: ResourceStatus::None,
            system_error: None,
            diagnostics_required: false,
            audit: None,
        }
    }

    /// Enable branch sharing for adapters that report the same resource
    /// manager.
    pub fn with_same_rm_joining(mut self, enabled: bool) -> Self {
        self.join_same_rm = enabled;
        self
    }

    /// Record completion and forget flows in the given audit log.
    pub fn with_audit(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// The global transaction identity participants branch from.
    pub fn global_xid(&self) -> &Xid {
        &self.global_xid
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Iterate the participants in current list order.
    pub fn iter(&self) -> std::slice::Iter<'_, Participant> {
        self.participants.iter()
    }

    /// Whether a one-phase participant is enlisted at slot 0.
    pub fn one_phase_enlisted(&self) -> bool {
        self.one_phase_enlisted
    }

    /// Whether the sole participant can complete one-phase.
    pub fn is_only_agent(&self) -> bool {
        self.participants.len() == 1 && self.participants[0].supports_one_phase()
    }

    /// Whether the last distribution left work that must be re-driven.
    pub fn retry_required(&self) -> bool {
        self.retry_required
    }

    /// Commit votes collected by the last prepare distribution.
    pub fn ok_vote_count(&self) -> usize {
        self.ok_vote_count
    }

    /// The accumulated transaction-level heuristic verdict.
    pub fn heuristic_outcome(&self) -> ResourceStatus {
        self.heuristic_outcome
    }

    /// Overwrite the verdict. Used when rebuilding a transaction from its
    /// logged sections.
    pub fn set_heuristic_outcome(&mut self, status: ResourceStatus) {
        self.heuristic_outcome = status;
    }

    /// Merge new evidence into the verdict. Monotone: recorded damage
    /// never downgrades.
    pub fn latch_heuristic(&mut self, status: ResourceStatus) {
        let merged = heuristic::combine(self.heuristic_outcome, status);
        if merged != self.heuristic_outcome {
            Logger::trace(
                "HEURISTIC_LATCH",
                &[
                    ("after", merged.as_str()),
                    ("before", self.heuristic_outcome.as_str()),
                ],
            );
        }
        self.heuristic_outcome = merged;
    }

    // --- Enlistment ---------------------------------------------------

    /// Enlist a two-phase participant, minting a new branch identity or
    /// joining an existing same-RM branch. Returns the branch the
    /// participant works under.
    pub fn enlist(&mut self, adapter: Box<dyn XaParticipant>) -> Xid {
        if self.join_same_rm {
            let master = self
                .participants
                .iter()
                .position(|p| !p.is_joined() && p.same_rm_as_adapter(adapter.as_ref()));
            if let Some(index) = master {
                let xid = self.participants[index].xid().clone();
                let mut joined = Participant::new(adapter, xid.clone());
                joined.mark_joined();
                joined.set_resource_status(ResourceStatus::Registered);
                self.participants.push(joined);
                return xid;
            }
        }

        let xid = self.global_xid.new_branch(self.next_branch);
        self.next_branch += 1;
        let mut participant = Participant::new(adapter, xid.clone());
        participant.set_resource_status(ResourceStatus::Registered);
        if participant.priority() != 0 {
            self.priority_enlisted = true;
        }
        self.participants.push(participant);
        xid
    }

    /// Enlist the single one-phase participant at slot 0 so it completes
    /// last.
    pub fn enlist_one_phase(&mut self, adapter: Box<dyn XaParticipant>) -> TwoPhaseResult<Xid> {
        if self.one_phase_enlisted {
            return Err(TwoPhaseError::enlist_refused(
                "a one-phase participant is already enlisted",
            ));
        }
        if !adapter.supports_one_phase() {
            return Err(TwoPhaseError::enlist_refused(
                "participant does not support one-phase completion",
            ));
        }

        // The one-phase participant works directly under the global
        // identity; it never appears as a separate branch in the log.
        let xid = self.global_xid.clone();
        let mut participant = Participant::new(adapter, xid.clone());
        participant.set_resource_status(ResourceStatus::Registered);
        self.participants.insert(0, participant);
        self.one_phase_enlisted = true;
        Ok(xid)
    }

    /// Re-add a participant reconstructed from the recovery log with the
    /// status it was logged in.
    pub fn enlist_recovered(
        &mut self,
        adapter: Box<dyn XaParticipant>,
        xid: Xid,
        status: ResourceStatus,
    ) {
        if let Some(branch) = xid.branch_index() {
            if branch >= self.next_branch {
                self.next_branch = branch + 1;
            }
        }
        let mut participant = Participant::new(adapter, xid);
        participant.set_resource_status(status);
        if participant.priority() != 0 {
            self.priority_enlisted = true;
        }
        self.participants.push(participant);
    }

    // --- Association end ----------------------------------------------

    /// Flow `end` to every participant before completion starts. Returns
    /// false when any participant failed the disassociation; the caller
    /// is expected to roll back.
    pub fn distribute_end(&mut self, flags: i32) -> bool {
        let mut all_ok = true;
        for index in (0..self.participants.len()).rev() {
            if !self.send_end(index, flags) {
                all_ok = false;
            }
        }
        all_ok
    }

    fn send_end(&mut self, index: usize, flags: i32) -> bool {
        match self.participants[index].end(flags) {
            Ok(()) => true,
            Err(err) => {
                let detail = self.participants[index].describe();
                if err.is_rollback_vote() {
                    Logger::trace("END_ROLLBACK_VOTE", &[("participant", &detail)]);
                } else {
                    Logger::warn(
                        "END_FAILED",
                        &[("code", &err.code_name()), ("participant", &detail)],
                    );
                    // Already rolled back; keep completion away from it
                    let p = &mut self.participants[index];
                    p.set_resource_status(ResourceStatus::RolledBack);
                    p.destroy();
                }
                false
            }
        }
    }

    // --- Prepare ------------------------------------------------------

    /// Distribute prepare and consolidate the votes.
    ///
    /// `subordinate` refuses the one-phase participant up front (its vote
    /// cannot be delegated); `optimise` permits the one-phase shortcuts.
    /// `rollback_marked` is polled between votes so an operator mark
    /// aborts the phase.
    pub fn distribute_prepare<F>(
        &mut self,
        subordinate: bool,
        optimise: bool,
        mut rollback_marked: F,
    ) -> TwoPhaseResult<PrepareResult>
    where
        F: FnMut() -> bool,
    {
        self.diagnostics_required = false;
        let result = self.run_prepare(subordinate, optimise, &mut rollback_marked);
        if self.diagnostics_required {
            self.dump_diagnostics("prepare");
            self.diagnostics_required = false;
        }
        result
    }

    fn run_prepare(
        &mut self,
        subordinate: bool,
        optimise: bool,
        rollback_marked: &mut dyn FnMut() -> bool,
    ) -> TwoPhaseResult<PrepareResult> {
        if subordinate && self.one_phase_enlisted {
            Logger::error(
                "SUBORDINATE_ONE_PHASE",
                &[("xid", &self.global_xid.to_string())],
            );
            return Err(TwoPhaseError::rollback_required(
                "a one-phase participant cannot be prepared under a subordinate coordinator",
            ));
        }

        self.sort_prepare_order();

        // Highest priority prepares first
        for index in (0..self.participants.len()).rev() {
            if index == 0
                && self.ok_vote_count == 0
                && optimise
                && !self.one_phase_enlisted
                && !self.participants[0].is_joined()
                && self.participants[0].supports_one_phase()
            {
                // Everything else voted read-only: complete the last
                // participant with a single one-phase flow, no logging.
                return match self.flow_commit_one_phase(false) {
                    Ok(()) => Ok(PrepareResult::OnePhaseOpt),
                    Err(TwoPhaseError::RollbackRequired { .. }) => {
                        Ok(PrepareResult::OnePhaseOptRollback)
                    }
                    Err(other) => Err(other),
                };
            }
            if index == 0 && self.one_phase_enlisted {
                // Slot 0 completes last through the one-phase flow
                continue;
            }
            if self.participants[index].is_joined() {
                continue;
            }

            match self.prepare_participant(index)? {
                Vote::Commit => {
                    self.participants[index].set_resource_status(ResourceStatus::Prepared);
                    self.ok_vote_count += 1;
                }
                Vote::ReadOnly => {
                    self.participants[index].set_resource_status(ResourceStatus::Completed);
                }
            }

            if rollback_marked() {
                return Err(TwoPhaseError::rollback_required(
                    "transaction was marked rollback-only during prepare",
                ));
            }
        }

        if self.ok_vote_count == 1 && optimise && !self.one_phase_enlisted {
            // A single commit vote needs no logged outcome
            self.distribute_commit()?;
            return Ok(PrepareResult::OnePhaseOpt);
        }
        if self.ok_vote_count > 0 {
            self.sort_commit_order();
            return Ok(PrepareResult::Commit);
        }
        Ok(PrepareResult::ReadOnly)
    }

    fn prepare_participant(&mut self, index: usize) -> TwoPhaseResult<Vote> {
        let err = match self.participants[index].prepare() {
            Ok(vote) => return Ok(vote),
            Err(err) => err,
        };

        let code = err.code();
        let code_name = err.code_name();
        let detail = self.participants[index].describe();

        if err.is_rollback_vote() || code == XAER_NOTA {
            // Rolled back already, or the branch was never known; either
            // way completion must not touch it again.
            let p = &mut self.participants[index];
            p.set_resource_status(ResourceStatus::RolledBack);
            p.destroy();
            return Err(TwoPhaseError::rollback_required(format!(
                "{} answered {} on prepare",
                detail, code_name
            )));
        }

        if code == XA_HEURMIX || code == XA_HEURHAZ {
            let status = if code == XA_HEURMIX {
                ResourceStatus::HeuristicMixed
            } else {
                ResourceStatus::HeuristicHazard
            };
            self.participants[index].set_resource_status(status);
            self.latch_heuristic(status);
            self.diagnostics_required = true;
            return Err(TwoPhaseError::heuristic(
                status,
                format!("{} answered {} on prepare", detail, code_name),
            ));
        }

        // XAER_RMERR, XAER_RMFAIL, XAER_INVAL, XAER_PROTO and anything
        // unexpected: the transaction must not commit.
        self.diagnostics_required = true;
        Logger::error(
            "PREPARE_FAILED",
            &[("code", &code_name), ("participant", &detail)],
        );

        if code == XAER_RMERR || code == XAER_RMFAIL {
            // The prepare may have reached the resource manager; leave
            // the participant in the rollback path and reconnect later.
            let p = &mut self.participants[index];
            p.set_resource_status(ResourceStatus::Prepared);
            p.mark_failed();
        }

        if code == XAER_RMFAIL {
            return Err(TwoPhaseError::rollback_required(format!(
                "lost contact with {} during prepare",
                detail
            )));
        }
        Err(TwoPhaseError::system(format!(
            "{} answered {} on prepare",
            detail, code_name
        )))
    }

    // --- One-phase flow -----------------------------------------------

    /// Commit the slot-0 participant in a single flow.
    ///
    /// `last_participant` marks the last-participant variant, where a
    /// heuristic rollback of the deciding participant is reported as a
    /// plain rollback of the transaction.
    pub fn flow_commit_one_phase(&mut self, last_participant: bool) -> TwoPhaseResult<()> {
        if self.participants.is_empty() {
            return Err(TwoPhaseError::system(
                "no participant enlisted for a one-phase flow",
            ));
        }

        self.participants[0].set_resource_status(ResourceStatus::CompletingOnePhase);

        match self.participants[0].commit_one_phase() {
            Ok(()) => {
                self.participants[0].set_resource_status(ResourceStatus::Committed);
            }
            Err(err) => {
                let code = err.code();
                let code_name = err.code_name();
                let detail = self.participants[0].describe();

                if err.is_rollback_vote() {
                    let p = &mut self.participants[0];
                    p.set_resource_status(ResourceStatus::RolledBack);
                    p.destroy();
                    return Err(TwoPhaseError::rollback_required(format!(
                        "{} rolled back during one-phase commit",
                        detail
                    )));
                }

                match code {
                    XA_HEURCOM => {
                        self.participants[0].set_resource_status(ResourceStatus::HeuristicCommit);
                        self.latch_heuristic(ResourceStatus::HeuristicCommit);
                    }
                    XA_HEURRB | XA_HEURMIX | XA_HEURHAZ => {
                        let status = match code {
                            XA_HEURRB => ResourceStatus::HeuristicRollback,
                            XA_HEURMIX => ResourceStatus::HeuristicMixed,
                            _ => ResourceStatus::HeuristicHazard,
                        };
                        Logger::error(
                            "HEURISTIC_ON_COMMIT",
                            &[("code", &code_name), ("participant", &detail)],
                        );
                        self.participants[0].set_resource_status(status);
                        self.latch_heuristic(status);
                    }
                    XAER_RMERR => {
                        // The branch work was rolled back and cannot be
                        // retried.
                        Logger::error("RMERR_ON_COMMIT", &[("participant", &detail)]);
                        let p = &mut self.participants[0];
                        p.set_resource_status(ResourceStatus::RolledBack);
                        p.destroy();
                        return Err(TwoPhaseError::rollback_required(format!(
                            "{} rolled back its work during one-phase commit",
                            detail
                        )));
                    }
                    XAER_RMFAIL => {
                        // No way to learn what happened to the branch
                        Logger::warn("RMFAIL_ON_ONE_PHASE", &[("participant", &detail)]);
                        let p = &mut self.participants[0];
                        p.set_resource_status(ResourceStatus::Completed);
                        p.destroy();
                        self.latch_heuristic(ResourceStatus::HeuristicHazard);
                    }
                    XAER_NOTA => {
                        let p = &mut self.participants[0];
                        p.set_resource_status(ResourceStatus::Completed);
                        p.destroy();
                        return Err(TwoPhaseError::rollback_required(format!(
                            "{} had no knowledge of the branch; assuming it rolled back",
                            detail
                        )));
                    }
                    _ => {
                        Logger::error(
                            "UNEXPECTED_XA_ERROR",
                            &[
                                ("code", &code_name),
                                ("flow", "commit_one_phase"),
                                ("participant", &detail),
                            ],
                        );
                        let p = &mut self.participants[0];
                        p.set_resource_status(ResourceStatus::Completed);
                        p.destroy();
                        return Err(TwoPhaseError::system(format!(
                            "{} answered {} on one-phase commit",
                            detail, code_name
                        )));
                    }
                }
            }
        }

        if self.heuristic_outcome.is_heuristic() {
            return match self.heuristic_outcome {
                ResourceStatus::HeuristicCommit => Ok(()),
                ResourceStatus::HeuristicRollback => {
                    if last_participant {
                        // The deciding participant rolled back, so the
                        // transaction outcome is an ordinary rollback.
                        Err(TwoPhaseError::rollback_required(
                            "last participant rolled back heuristically",
                        ))
                    } else {
                        Err(self.heuristic_error())
                    }
                }
                _ => Err(self.heuristic_error()),
            };
        }
        Ok(())
    }

    // --- Outcome ------------------------------------------------------

    /// Deliver the commit outcome to every participant that still awaits
    /// one, surfacing the consolidated verdict.
    pub fn distribute_commit(&mut self) -> TwoPhaseResult<()> {
        self.sort_commit_order();
        self.outcome_is_commit = true;
        self.retry_required = self.distribute_outcome();

        self.raise_system_error()?;

        if self.heuristic_outcome.is_heuristic()
            && self.heuristic_outcome != ResourceStatus::HeuristicCommit
        {
            return Err(self.heuristic_error());
        }
        Ok(())
    }

    /// Deliver the rollback outcome. A verdict latched before this call
    /// (during prepare) is preserved and not re-reported here.
    pub fn distribute_rollback(&mut self) -> TwoPhaseResult<()> {
        let saved = self.heuristic_outcome;
        self.outcome_is_commit = false;
        self.retry_required = self.distribute_outcome();

        self.raise_system_error()?;

        if self.heuristic_outcome.is_heuristic() && saved == ResourceStatus::None {
            match self.heuristic_outcome {
                ResourceStatus::HeuristicRollback => {}
                _ => return Err(self.heuristic_error()),
            }
        }
        if saved != ResourceStatus::None {
            self.heuristic_outcome = saved;
        }
        Ok(())
    }

    /// Re-drive the last outcome direction against participants still
    /// awaiting completion. Used by the retry loop; verdicts are read by
    /// the caller rather than raised again.
    pub fn redeliver_outcome(&mut self) -> bool {
        self.retry_required = self.distribute_outcome();
        self.retry_required
    }

    /// Treat the next distribution as a redelivery. Recovered outcomes
    /// re-enter delivery this way so a participant that no longer knows
    /// the branch reads as already completed rather than hazarded.
    pub fn mark_redelivery(&mut self) {
        self.retry_completion = true;
    }

    fn distribute_outcome(&mut self) -> bool {
        let mut retry_required = false;
        self.diagnostics_required = false;

        let count = self.participants.len();
        let mut failed_priority: Option<i32> = None;

        for index in 0..count {
            if self.participants[index].is_joined() {
                continue;
            }

            if self.deliver_outcome(index) {
                retry_required = true;
                if self.priority_enlisted && self.outcome_is_commit {
                    failed_priority = Some(self.participants[index].priority());
                }
            }

            // Once a priority-ordered commit must be retried, finish the
            // failing priority level and leave lower levels for the retry
            // pass so they never commit ahead of it.
            if let Some(failed) = failed_priority {
                if index + 1 < count && self.participants[index + 1].priority() != failed {
                    break;
                }
            }
        }

        let verdict = heuristic::fold(self.participants.iter().map(|p| p.resource_status()));
        self.latch_heuristic(verdict);
        self.retry_completion = true;

        if self.diagnostics_required {
            self.dump_diagnostics("completion");
            self.diagnostics_required = false;
        }
        retry_required
    }

    fn deliver_outcome(&mut self, index: usize) -> bool {
        let commit = self.outcome_is_commit;
        let entry_status = self.participants[index].resource_status();

        let mut audited = false;
        let flow = match entry_status {
            ResourceStatus::Prepared | ResourceStatus::Completing => {
                if entry_status == ResourceStatus::Prepared {
                    self.participants[index].set_resource_status(ResourceStatus::Completing);
                }
                audited = self.audit_completion_sent(index, commit);
                let result = if commit {
                    self.participants[index].commit()
                } else {
                    self.participants[index].rollback()
                };
                if result.is_ok() {
                    self.participants[index].set_resource_status(if commit {
                        ResourceStatus::Committed
                    } else {
                        ResourceStatus::RolledBack
                    });
                    if audited {
                        self.audit_completion_response(index, commit, "XA_OK");
                    }
                }
                result
            }
            ResourceStatus::CompletingOnePhase => {
                // A one-phase flow being retried
                let result = if commit {
                    self.participants[index].commit_one_phase()
                } else {
                    self.participants[index].rollback()
                };
                if result.is_ok() {
                    self.participants[index].set_resource_status(if commit {
                        ResourceStatus::Committed
                    } else {
                        ResourceStatus::RolledBack
                    });
                }
                result
            }
            ResourceStatus::Registered => {
                // Never prepared; only a rollback outcome reaches it
                if commit {
                    return false;
                }
                self.participants[index].set_resource_status(ResourceStatus::Completing);
                let result = self.participants[index].rollback();
                if result.is_ok() {
                    self.participants[index].set_resource_status(ResourceStatus::RolledBack);
                }
                result
            }
            _ => return false,
        };

        let err = match flow {
            Ok(()) => return false,
            Err(err) => err,
        };

        if audited {
            self.audit_completion_response(index, commit, &err.code_name());
        }

        let prepared_resource =
            matches!(entry_status, ResourceStatus::Prepared | ResourceStatus::Completing);
        let code = err.code();
        let code_name = err.code_name();
        let detail = self.participants[index].describe();
        let mut retry_required = false;

        if err.is_rollback_vote() {
            // Answered with a rollback vote; on a commit outcome the
            // status fold records the damage.
            let p = &mut self.participants[index];
            p.set_resource_status(ResourceStatus::RolledBack);
            p.destroy();
            return false;
        }

        match code {
            XA_HEURRB => {
                self.participants[index].set_resource_status(ResourceStatus::HeuristicRollback);
                if commit {
                    self.diagnostics_required = true;
                    Logger::error(
                        "HEURISTIC_ON_COMMIT",
                        &[("code", &code_name), ("participant", &detail)],
                    );
                }
            }
            XA_HEURCOM => {
                self.participants[index].set_resource_status(ResourceStatus::HeuristicCommit);
                if !commit {
                    self.diagnostics_required = true;
                    Logger::error(
                        "HEURISTIC_ON_ROLLBACK",
                        &[("code", &code_name), ("participant", &detail)],
                    );
                }
            }
            XA_HEURMIX | XA_HEURHAZ => {
                let status = if code == XA_HEURMIX {
                    ResourceStatus::HeuristicMixed
                } else {
                    ResourceStatus::HeuristicHazard
                };
                self.participants[index].set_resource_status(status);
                self.diagnostics_required = true;
                Logger::error(
                    if commit {
                        "HEURISTIC_ON_COMMIT"
                    } else {
                        "HEURISTIC_ON_ROLLBACK"
                    },
                    &[("code", &code_name), ("participant", &detail)],
                );
            }
            XAER_RMERR => {
                // The resource manager rolled the branch back and cannot
                // hold it prepared.
                self.latch_heuristic(ResourceStatus::HeuristicRollback);
                let p = &mut self.participants[index];
                p.set_resource_status(ResourceStatus::RolledBack);
                p.destroy();
                if commit {
                    self.diagnostics_required = true;
                    Logger::error("RMERR_ON_COMMIT", &[("participant", &detail)]);
                }
            }
            XAER_RMFAIL => {
                if !commit && !prepared_resource {
                    // Nothing prepared and nothing to reach: the branch
                    // is as rolled back as it will ever be.
                    let p = &mut self.participants[index];
                    p.set_resource_status(ResourceStatus::RolledBack);
                    p.destroy();
                } else {
                    Logger::warn(
                        if commit {
                            "RMFAIL_ON_COMMIT"
                        } else {
                            "RMFAIL_ON_ROLLBACK"
                        },
                        &[("participant", &detail)],
                    );
                    self.participants[index].mark_failed();
                    self.latch_heuristic(ResourceStatus::HeuristicHazard);
                    retry_required = true;
                }
            }
            XA_RETRY => {
                self.participants[index].mark_failed();
                self.latch_heuristic(ResourceStatus::HeuristicHazard);
                retry_required = true;
            }
            XAER_NOTA => {
                // Unknown branch: harmless on rollback or on a completion
                // retry, but a first-attempt commit may have been lost.
                let status_now = self.participants[index].resource_status();
                if status_now == ResourceStatus::CompletingOnePhase
                    || (commit && !self.retry_completion)
                {
                    self.latch_heuristic(ResourceStatus::HeuristicHazard);
                }
                let p = &mut self.participants[index];
                p.set_resource_status(ResourceStatus::Completed);
                p.destroy();
            }
            _ => {
                // XAER_INVAL, XAER_PROTO and anything unexpected
                Logger::error(
                    "COMPLETION_FAILED",
                    &[("code", &code_name), ("participant", &detail)],
                );
                self.diagnostics_required = true;
                let p = &mut self.participants[index];
                p.set_resource_status(ResourceStatus::Completed);
                p.destroy();
                self.system_error = Some(err);
            }
        }

        retry_required
    }

    // --- Forget -------------------------------------------------------

    /// Flow forget to every participant left in a heuristic status.
    /// Returns whether any forget must be retried.
    pub fn distribute_forget(&mut self) -> TwoPhaseResult<bool> {
        let mut retry_required = false;

        for index in 0..self.participants.len() {
            if self.participants[index].is_joined() {
                continue;
            }
            if self.participants[index].resource_status().is_heuristic()
                && self.forget_participant(index)
            {
                retry_required = true;
                self.retry_required = true;
            }
        }

        self.raise_system_error()?;
        Ok(retry_required)
    }

    fn forget_participant(&mut self, index: usize) -> bool {
        let audited = self.audit_forget_sent(index);

        let err = match self.participants[index].forget() {
            Ok(()) => {
                self.participants[index].set_resource_status(ResourceStatus::Completed);
                if audited {
                    self.audit_forget_response(index, "XA_OK");
                }
                return false;
            }
            Err(err) => err,
        };

        if audited {
            self.audit_forget_response(index, &err.code_name());
        }
        let detail = self.participants[index].describe();

        match err.code() {
            XAER_RMERR => true,
            XAER_RMFAIL => {
                self.participants[index].mark_failed();
                true
            }
            XAER_NOTA => {
                let p = &mut self.participants[index];
                p.set_resource_status(ResourceStatus::Completed);
                p.destroy();
                false
            }
            _ => {
                // XAER_INVAL, XAER_PROTO
                Logger::error(
                    "FORGET_FAILED",
                    &[("code", &err.code_name()), ("participant", &detail)],
                );
                self.participants[index].set_resource_status(ResourceStatus::Completed);
                self.system_error = Some(err);
                false
            }
        }
    }

    // --- Teardown -----------------------------------------------------

    /// Release every participant that never reached a terminal status.
    /// Used when retries are abandoned.
    pub fn destroy_resources(&mut self) {
        for participant in &mut self.participants {
            match participant.resource_status() {
                ResourceStatus::Completed
                | ResourceStatus::RolledBack
                | ResourceStatus::Committed => {}
                _ => participant.destroy(),
            }
        }
    }

    // --- Internals ----------------------------------------------------

    fn raise_system_error(&self) -> TwoPhaseResult<()> {
        if let Some(ref err) = self.system_error {
            return Err(TwoPhaseError::system(format!(
                "unrecoverable completion error: {}",
                err
            )));
        }
        Ok(())
    }

    fn heuristic_error(&self) -> TwoPhaseError {
        TwoPhaseError::heuristic(
            self.heuristic_outcome,
            format!(
                "transaction {} completed with heuristic damage",
                self.global_xid.gtrid_hex()
            ),
        )
    }

    /// Ascending priority: combined with the reverse prepare walk this
    /// prepares higher priorities first, equal priorities in reverse
    /// enlistment order.
    fn sort_prepare_order(&mut self) {
        if !self.priority_enlisted {
            return;
        }
        let start = if self.one_phase_enlisted { 1 } else { 0 };
        self.participants[start..].sort_by_key(|p| p.priority());
    }

    /// Descending priority for the forward completion walk, equal
    /// priorities in enlistment order. Sorted once; retries keep the
    /// order.
    fn sort_commit_order(&mut self) {
        if self.sorted {
            return;
        }
        if self.priority_enlisted && self.participants.len() > 1 {
            let start = if self.one_phase_enlisted { 1 } else { 0 };
            self.participants[start..].sort_by(|a, b| b.priority().cmp(&a.priority()));
        }
        self.sorted = true;
    }

    fn dump_diagnostics(&self, phase: &str) {
        for participant in &self.participants {
            Logger::warn(
                "PARTICIPANT_DIAGNOSTIC",
                &[
                    ("participant", &participant.describe()),
                    ("phase", phase),
                    ("status", participant.resource_status().as_str()),
                    ("xid", &participant.xid().to_string()),
                ],
            );
        }
    }

    // --- Audit --------------------------------------------------------

    fn audit_record(&self, action: AuditAction, index: usize) -> AuditRecord {
        let participant = &self.participants[index];
        let mut record = AuditRecord::new(action, self.global_xid.gtrid_hex());
        if let Some(branch) = participant.xid().branch_index() {
            record = record.with_branch(branch);
        }
        if participant.recovery_id() != 0 {
            record = record.with_recovery_id(participant.recovery_id());
        }
        record
    }

    fn append_audit(&self, record: &AuditRecord) {
        if let Some(ref audit) = self.audit {
            if let Err(err) = audit.append(record) {
                Logger::warn("AUDIT_APPEND_FAILED", &[("detail", &err.to_string())]);
            }
        }
    }

    fn audit_completion_sent(&self, index: usize, commit: bool) -> bool {
        if self.audit.is_none() {
            return false;
        }
        let record = self
            .audit_record(AuditAction::CompletionSent, index)
            .with_direction(direction(commit));
        self.append_audit(&record);
        true
    }

    fn audit_completion_response(&self, index: usize, commit: bool, xa_code: &str) {
        let record = self
            .audit_record(AuditAction::CompletionResponse, index)
            .with_direction(direction(commit))
            .with_xa_code(xa_code);
        self.append_audit(&record);
    }

    fn audit_forget_sent(&self, index: usize) -> bool {
        if self.audit.is_none() {
            return false;
        }
        let record = self.audit_record(AuditAction::ForgetSent, index);
        self.append_audit(&record);
        true
    }

    fn audit_forget_response(&self, index: usize, xa_code: &str) {
        let record = self
            .audit_record(AuditAction::ForgetResponse, index)
            .with_xa_code(xa_code);
        self.append_audit(&record);
    }
}

fn direction(commit: bool) -> AuditDirection {
    if commit {
        AuditDirection::Commit
    } else {
        AuditDirection::Rollback
    }
}

impl std::fmt::Debug for ResourceList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceList")
            .field("global_xid", &self.global_xid.to_string())
            .field("participants", &self.participants.len())
            .field("heuristic_outcome", &self.heuristic_outcome)
            .field("retry_required", &self.retry_required)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
