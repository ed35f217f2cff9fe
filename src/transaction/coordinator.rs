//! Transaction coordination
//!
//! `Transaction` drives one global transaction through the two-phase
//! protocol: enlistment, prepare, a hardened commit decision, outcome and
//! forget distribution with bounded retry, and disposition of the
//! recovery-log unit. Roots decide their own outcome; subordinates collect
//! votes for a superior and hold heuristic verdicts until the superior's
//! forget releases them.
//!
//! The log is written only at the protocol's force points: a root's commit
//! (or last-participant) decision, a subordinate's prepared vote, and a
//! subordinate's heuristic verdict. Everything absent from the log is
//! presumed to roll back.

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::lifecycle::EventLatch;
use crate::observability::{AuditLog, Logger};
use crate::participant::{ResourceStatus, StatefulResource, XaParticipant};
use crate::twophase::{PrepareResult, ResourceList, RetryClock, TwoPhaseError, TwoPhaseResult};
use crate::txlog::{LogWriter, TxLogError, TxLogResult};
use crate::xa::codes::TMSUCCESS;
use crate::xa::{Vote, Xid};

use super::state::TransactionState;

/// Log section carrying the latest persisted state code.
pub const SECTION_STATE: u16 = 0;

/// Log section carrying one item per logged participant branch.
pub const SECTION_PARTICIPANT: u16 = 2;

/// Log section carrying the serialized global identifier.
pub const SECTION_GLOBAL_ID: u16 = 3;

/// Log section carrying a subordinate's one-byte heuristic verdict.
pub const SECTION_HEURISTIC: u16 = 8;

/// The recovery log handle shared between live transactions and the
/// recovery manager.
pub type SharedLog = Arc<Mutex<LogWriter>>;

fn lock_log(log: &SharedLog) -> MutexGuard<'_, LogWriter> {
    log.lock().unwrap_or_else(|e| e.into_inner())
}

/// Encode a state code for the state section.
pub fn encode_state(state: TransactionState) -> Vec<u8> {
    state.as_code().to_le_bytes().to_vec()
}

/// Decode a state section item.
pub fn decode_state(item: &[u8]) -> Option<TransactionState> {
    if item.len() < 4 {
        return None;
    }
    let code = i32::from_le_bytes(item[0..4].try_into().ok()?);
    TransactionState::from_code(code)
}

/// Decode a heuristic section item.
pub fn decode_heuristic(item: &[u8]) -> Option<ResourceStatus> {
    let byte = *item.first()?;
    ResourceStatus::from_code(i32::from(byte))
}

/// One participant branch as persisted in the participant section.
///
/// Layout: `u64` LE recovery id, `i32` LE commit priority, one status
/// byte, then the serialized branch xid to the end of the item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantRecord {
    pub recovery_id: u64,
    pub priority: i32,
    pub status: ResourceStatus,
    pub xid: Xid,
}

impl ParticipantRecord {
    pub fn encode(&self) -> Vec<u8> {
        let xid = self.xid.to_bytes();
        let mut out = Vec::with_capacity(13 + xid.len());
        out.extend_from_slice(&self.recovery_id.to_le_bytes());
        out.extend_from_slice(&self.priority.to_le_bytes());
        out.push(self.status.as_code() as u8);
        out.extend_from_slice(&xid);
        out
    }

    pub fn decode(item: &[u8]) -> Option<Self> {
        if item.len() < 13 {
            return None;
        }
        let recovery_id = u64::from_le_bytes(item[0..8].try_into().ok()?);
        let priority = i32::from_le_bytes(item[8..12].try_into().ok()?);
        let status = ResourceStatus::from_code(i32::from(item[12]))?;
        let xid = Xid::from_bytes(&item[13..]).ok()?;
        Some(ParticipantRecord {
            recovery_id,
            priority,
            status,
            xid,
        })
    }
}

/// Per-transaction tunables, usually sourced from the service
/// configuration.
#[derive(Debug, Clone)]
pub struct TxnOptions {
    /// Base wait between completion retry passes.
    pub retry_interval: Duration,

    /// Retry passes before outcome delivery is abandoned. Zero retries
    /// until cancelled.
    pub retry_limit: u32,

    /// Share one branch between adapters reporting the same resource
    /// manager.
    pub join_same_rm: bool,

    /// Allow the single-vote and sole-agent one-phase shortcuts.
    pub one_phase_optimisation: bool,
}

impl Default for TxnOptions {
    fn default() -> Self {
        TxnOptions {
            retry_interval: Duration::from_secs(1),
            retry_limit: 20,
            join_same_rm: true,
            one_phase_optimisation: true,
        }
    }
}

/// One coordinated transaction: a state machine over a participant list
/// and one recoverable log unit.
pub struct Transaction {
    xid: Xid,
    state: TransactionState,
    resources: ResourceList,
    log: Option<SharedLog>,
    unit_id: Option<u64>,
    subordinate: bool,
    rollback_only: Arc<AtomicBool>,
    logged_heuristic: ResourceStatus,
    options: TxnOptions,
    cancel: EventLatch,
}

impl Transaction {
    /// Begin a new root transaction with a fresh global identity.
    pub fn begin(options: TxnOptions) -> Self {
        Self::start(Xid::generate(), false, options)
    }

    /// Begin a subordinate transaction working under an imported identity.
    pub fn begin_subordinate(xid: Xid, options: TxnOptions) -> Self {
        Self::start(xid, true, options)
    }

    fn start(xid: Xid, subordinate: bool, options: TxnOptions) -> Self {
        Logger::trace(
            "TRANSACTION_BEGIN",
            &[
                ("subordinate", if subordinate { "true" } else { "false" }),
                ("xid", &xid.to_string()),
            ],
        );
        let resources = ResourceList::new(xid.clone()).with_same_rm_joining(options.join_same_rm);
        Transaction {
            xid,
            state: TransactionState::Active,
            resources,
            log: None,
            unit_id: None,
            subordinate,
            rollback_only: Arc::new(AtomicBool::new(false)),
            logged_heuristic: ResourceStatus::None,
            options,
            cancel: EventLatch::new(),
        }
    }

    /// Rebuild a transaction from its recovered log sections. Participants
    /// and any logged verdict are restored by the caller afterwards.
    pub fn reconstruct(
        unit_id: u64,
        state: TransactionState,
        xid: Xid,
        options: TxnOptions,
        log: SharedLog,
    ) -> Self {
        // Only a subordinate persists these states; everything else was a
        // root when it went down.
        let subordinate = matches!(
            state,
            TransactionState::Prepared
                | TransactionState::HeuristicOnCommit
                | TransactionState::HeuristicOnRollback
        );
        let mut resources =
            ResourceList::new(xid.clone()).with_same_rm_joining(options.join_same_rm);
        resources.mark_redelivery();
        Logger::trace(
            "TRANSACTION_RECONSTRUCT",
            &[
                ("state", state.as_str()),
                ("unit", &unit_id.to_string()),
                ("xid", &xid.to_string()),
            ],
        );
        Transaction {
            xid,
            state,
            resources,
            log: Some(log),
            unit_id: Some(unit_id),
            subordinate,
            rollback_only: Arc::new(AtomicBool::new(false)),
            logged_heuristic: ResourceStatus::None,
            options,
            cancel: EventLatch::new(),
        }
    }

    /// Attach the recovery log this transaction hardens its decisions to.
    /// Without one the transaction runs volatile.
    pub fn attach_log(&mut self, log: SharedLog) {
        self.log = Some(log);
    }

    /// Record completion and forget flows in the given audit log.
    pub fn with_audit(mut self, audit: Arc<dyn AuditLog>) -> Self {
        let resources = mem::replace(&mut self.resources, ResourceList::new(self.xid.clone()));
        self.resources = resources.with_audit(audit);
        self
    }

    // --- Accessors ----------------------------------------------------

    pub fn xid(&self) -> &Xid {
        &self.xid
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_subordinate(&self) -> bool {
        self.subordinate
    }

    /// The recoverable unit this transaction writes, once allocated.
    pub fn unit_id(&self) -> Option<u64> {
        self.unit_id
    }

    pub fn resources(&self) -> &ResourceList {
        &self.resources
    }

    /// The transaction-level heuristic verdict accumulated so far.
    pub fn heuristic_outcome(&self) -> ResourceStatus {
        self.resources.heuristic_outcome()
    }

    /// A handle that cancels an in-progress completion retry loop.
    pub fn cancel_signal(&self) -> EventLatch {
        self.cancel.clone()
    }

    /// Mark the transaction so the only permitted outcome is rollback.
    pub fn set_rollback_only(&mut self) {
        if !self.rollback_only.swap(true, Ordering::SeqCst) {
            Logger::trace("ROLLBACK_ONLY", &[("xid", &self.xid.to_string())]);
        }
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only.load(Ordering::SeqCst)
    }

    // --- Enlistment ---------------------------------------------------

    /// Enlist a two-phase participant. Returns the branch identity the
    /// participant works under.
    pub fn enlist(&mut self, adapter: Box<dyn XaParticipant>) -> TwoPhaseResult<Xid> {
        self.require_active("enlist")?;
        Ok(self.resources.enlist(adapter))
    }

    /// Enlist the distinguished one-phase participant.
    pub fn enlist_one_phase(&mut self, adapter: Box<dyn XaParticipant>) -> TwoPhaseResult<Xid> {
        self.require_active("enlist_one_phase")?;
        self.resources.enlist_one_phase(adapter)
    }

    /// Re-enlist a participant reopened by a recovery factory, carrying
    /// the status it was logged with.
    pub fn adopt_participant(
        &mut self,
        adapter: Box<dyn XaParticipant>,
        xid: Xid,
        status: ResourceStatus,
    ) {
        self.resources.enlist_recovered(adapter, xid, status);
    }

    /// Restore a verdict read back from the unit's heuristic section.
    pub fn restore_heuristic(&mut self, verdict: ResourceStatus) {
        self.resources.set_heuristic_outcome(verdict);
        self.logged_heuristic = verdict;
    }

    // --- Root completion ----------------------------------------------

    /// Drive the transaction to its outcome through the full two-phase
    /// protocol, taking the one-phase shortcuts where they apply.
    pub fn commit(&mut self) -> TwoPhaseResult<()> {
        if self.subordinate {
            return Err(TwoPhaseError::system(
                "subordinate transactions complete through prepare and the superior's decision",
            ));
        }
        self.require_active("commit")?;

        if !self.resources.distribute_end(TMSUCCESS) {
            self.set_rollback_only();
        }
        if self.is_rollback_only() {
            self.set_state(TransactionState::RollingBack);
            self.rollback_after_failure();
            return Err(TwoPhaseError::rollback_required(
                "transaction was marked rollback-only",
            ));
        }

        self.set_state(TransactionState::Preparing);
        let marked = Arc::clone(&self.rollback_only);
        let prepared = self.resources.distribute_prepare(
            false,
            self.options.one_phase_optimisation,
            move || marked.load(Ordering::SeqCst),
        );

        match prepared {
            Ok(PrepareResult::Commit) if self.resources.one_phase_enlisted() => {
                self.commit_last_participant()
            }
            Ok(PrepareResult::Commit) => {
                if let Err(err) = self.harden_decision(TransactionState::Committing) {
                    return Err(self.fail_unlogged_decision(err));
                }
                self.set_state(TransactionState::Committing);
                let outcome = self.resources.distribute_commit();
                self.complete(true, outcome)
            }
            Ok(PrepareResult::ReadOnly) => {
                self.set_state(TransactionState::Committed);
                Ok(())
            }
            Ok(PrepareResult::OnePhaseOpt) => self.complete(true, Ok(())),
            Ok(PrepareResult::OnePhaseOptRollback) => {
                self.set_state(TransactionState::RolledBack);
                Err(TwoPhaseError::rollback_required(
                    "the one-phase participant rolled the transaction back",
                ))
            }
            Err(err) => {
                self.set_state(TransactionState::RollingBack);
                self.rollback_after_failure();
                Err(err)
            }
        }
    }

    /// Roll the transaction back and release every participant.
    pub fn rollback(&mut self) -> TwoPhaseResult<()> {
        self.require_active("rollback")?;
        self.set_state(TransactionState::RollingBack);
        // A failed disassociation cannot make a rollback any worse.
        self.resources.distribute_end(TMSUCCESS);
        let outcome = self.resources.distribute_rollback();
        self.complete(false, outcome)
    }

    // The deciding one-phase participant completes first; its answer
    // decides the outcome for the prepared rest.
    fn commit_last_participant(&mut self) -> TwoPhaseResult<()> {
        if let Err(err) = self.harden_decision(TransactionState::LastParticipant) {
            return Err(self.fail_unlogged_decision(err));
        }
        self.set_state(TransactionState::LastParticipant);

        match self.resources.flow_commit_one_phase(true) {
            Ok(()) => {
                if let Err(err) = self.log_state(TransactionState::Committing) {
                    Logger::warn(
                        "STATE_NOT_LOGGED",
                        &[
                            ("detail", &err.to_string()),
                            ("state", TransactionState::Committing.as_str()),
                            ("xid", &self.xid.to_string()),
                        ],
                    );
                }
                self.set_state(TransactionState::Committing);
                let outcome = self.resources.distribute_commit();
                self.complete(true, outcome)
            }
            Err(err) => {
                self.set_state(TransactionState::RollingBack);
                self.rollback_after_failure();
                Err(err)
            }
        }
    }

    // --- Subordinate completion ---------------------------------------

    /// Collect votes on behalf of a superior coordinator.
    ///
    /// `Vote::Commit` leaves the transaction prepared and hardened,
    /// awaiting the superior's decision; `Vote::ReadOnly` completes it.
    pub fn prepare(&mut self) -> TwoPhaseResult<Vote> {
        if !self.subordinate {
            return Err(TwoPhaseError::system(
                "prepare applies to subordinate transactions; roots complete with commit",
            ));
        }
        self.require_active("prepare")?;

        if !self.resources.distribute_end(TMSUCCESS) {
            self.set_rollback_only();
        }
        if self.is_rollback_only() {
            self.set_state(TransactionState::RollingBack);
            self.rollback_after_failure();
            return Err(TwoPhaseError::rollback_required(
                "transaction was marked rollback-only",
            ));
        }

        self.set_state(TransactionState::Preparing);
        let marked = Arc::clone(&self.rollback_only);
        let prepared = self
            .resources
            .distribute_prepare(true, false, move || marked.load(Ordering::SeqCst));

        match prepared {
            Ok(PrepareResult::Commit) => {
                if let Err(err) = self.harden_decision(TransactionState::Prepared) {
                    return Err(self.fail_unlogged_decision(err));
                }
                self.set_state(TransactionState::Prepared);
                Ok(Vote::Commit)
            }
            Ok(PrepareResult::ReadOnly) => {
                self.set_state(TransactionState::Committed);
                Ok(Vote::ReadOnly)
            }
            Ok(PrepareResult::OnePhaseOpt) | Ok(PrepareResult::OnePhaseOptRollback) => Err(
                TwoPhaseError::system("one-phase outcome from a subordinate prepare"),
            ),
            Err(err) => {
                self.set_state(TransactionState::RollingBack);
                self.rollback_after_failure();
                Err(err)
            }
        }
    }

    /// Deliver a superior's commit decision to a prepared transaction.
    pub fn commit_prepared(&mut self) -> TwoPhaseResult<()> {
        if self.state != TransactionState::Prepared {
            return Err(TwoPhaseError::system(format!(
                "commit_prepared requires a prepared transaction, state is {}",
                self.state
            )));
        }
        if let Err(err) = self.log_state(TransactionState::Committing) {
            // The decision is the superior's; a lost state write leaves
            // the unit prepared and recovery re-asks for the outcome.
            Logger::warn(
                "STATE_NOT_LOGGED",
                &[
                    ("detail", &err.to_string()),
                    ("state", TransactionState::Committing.as_str()),
                    ("xid", &self.xid.to_string()),
                ],
            );
        }
        self.set_state(TransactionState::Committing);
        let outcome = self.resources.distribute_commit();
        self.complete(true, outcome)
    }

    /// Deliver a superior's rollback decision to a prepared transaction.
    /// Rollback needs no state write: an unresolved unit presumes abort.
    pub fn rollback_prepared(&mut self) -> TwoPhaseResult<()> {
        if self.state != TransactionState::Prepared {
            return Err(TwoPhaseError::system(format!(
                "rollback_prepared requires a prepared transaction, state is {}",
                self.state
            )));
        }
        self.set_state(TransactionState::RollingBack);
        let outcome = self.resources.distribute_rollback();
        self.complete(false, outcome)
    }

    /// A superior's forget for a transaction completed with heuristic
    /// damage. Releases the logged verdict and removes the unit.
    pub fn forget(&mut self) -> TwoPhaseResult<()> {
        let commit = match self.state {
            TransactionState::HeuristicOnCommit => true,
            TransactionState::HeuristicOnRollback => false,
            _ => {
                return Err(TwoPhaseError::system(format!(
                    "forget requires a heuristically completed transaction, state is {}",
                    self.state
                )))
            }
        };

        let mut outcome = self.resources.distribute_forget().map(|_| ());
        self.run_retry_loop(commit, &mut outcome);
        self.set_state(if commit {
            TransactionState::Committed
        } else {
            TransactionState::RolledBack
        });
        self.forget_unit();
        outcome
    }

    // --- Recovery -----------------------------------------------------

    /// Re-drive a reconstructed transaction per its logged state.
    pub fn recover(&mut self) -> TwoPhaseResult<()> {
        match self.state {
            TransactionState::Committing
            | TransactionState::Committed
            | TransactionState::HeuristicOnCommit => self.recover_commit(),
            TransactionState::RollingBack
            | TransactionState::RolledBack
            | TransactionState::HeuristicOnRollback
            | TransactionState::Active
            | TransactionState::Preparing
            | TransactionState::CommittingOnePhase => self.recover_rollback(),
            TransactionState::LastParticipant => {
                // The deciding participant's answer was never learned;
                // direction defaults to rollback.
                Logger::error(
                    "HEURISTIC_MAY_HAVE_OCCURRED",
                    &[("xid", &self.xid.to_string())],
                );
                self.recover_rollback()
            }
            TransactionState::Prepared => {
                // In doubt: only the superior can resolve the direction.
                Logger::warn("INDOUBT_TRANSACTION", &[("xid", &self.xid.to_string())]);
                Ok(())
            }
            TransactionState::None => Ok(()),
        }
    }

    fn recover_commit(&mut self) -> TwoPhaseResult<()> {
        if self.state != TransactionState::HeuristicOnCommit {
            self.set_state(TransactionState::Committing);
        }
        let outcome = self.resources.distribute_commit();
        self.complete(true, outcome)
    }

    fn recover_rollback(&mut self) -> TwoPhaseResult<()> {
        if self.state == TransactionState::Active {
            self.resources.distribute_end(TMSUCCESS);
        }
        if self.state != TransactionState::HeuristicOnRollback {
            self.set_state(TransactionState::RollingBack);
        }
        let outcome = self.resources.distribute_rollback();
        self.complete(false, outcome)
    }

    // --- Completion internals -----------------------------------------

    fn require_active(&self, operation: &str) -> TwoPhaseResult<()> {
        if self.state != TransactionState::Active {
            return Err(TwoPhaseError::system(format!(
                "{} requires an active transaction, state is {}",
                operation, self.state
            )));
        }
        Ok(())
    }

    fn set_state(&mut self, state: TransactionState) {
        if state != self.state {
            Logger::trace(
                "TRANSACTION_STATE",
                &[
                    ("after", state.as_str()),
                    ("before", self.state.as_str()),
                    ("xid", &self.xid.to_string()),
                ],
            );
        }
        self.state = state;
    }

    // Forget processing plus the bounded retry loop, then disposition of
    // the log unit.
    fn complete(&mut self, commit: bool, mut outcome: TwoPhaseResult<()>) -> TwoPhaseResult<()> {
        if self.resources.heuristic_outcome().is_heuristic() {
            if let Err(err) = self.resources.distribute_forget() {
                if outcome.is_ok() {
                    outcome = Err(err);
                }
            }
        }
        self.run_retry_loop(commit, &mut outcome);
        self.refresh_verdict(commit, &mut outcome);
        self.finish_unit(commit, outcome)
    }

    // The synchronous stand-in for a retry timer: re-drive outcome and
    // forget until nothing remains, the attempt budget runs out, or the
    // cancel signal fires.
    fn run_retry_loop(&mut self, commit: bool, outcome: &mut TwoPhaseResult<()>) {
        let mut clock = RetryClock::new(self.options.retry_interval, self.options.retry_limit);
        while self.resources.retry_required() {
            let wait = match clock.next_wait() {
                Some(wait) => wait,
                None => {
                    Logger::warn(
                        "RETRY_EXHAUSTED",
                        &[
                            ("attempts", &clock.attempts().to_string()),
                            ("xid", &self.xid.to_string()),
                        ],
                    );
                    self.abandon_completion(outcome);
                    return;
                }
            };
            if self.cancel.wait_timeout(wait) {
                Logger::warn("RETRY_CANCELLED", &[("xid", &self.xid.to_string())]);
                self.abandon_completion(outcome);
                return;
            }

            Logger::info(
                "COMPLETION_RETRY",
                &[
                    ("attempt", &clock.attempts().to_string()),
                    ("direction", if commit { "commit" } else { "rollback" }),
                    ("xid", &self.xid.to_string()),
                ],
            );
            self.resources.redeliver_outcome();
            if self.resources.heuristic_outcome().is_heuristic() {
                if let Err(err) = self.resources.distribute_forget() {
                    if outcome.is_ok() {
                        *outcome = Err(err);
                    }
                }
            }
        }
    }

    fn abandon_completion(&mut self, outcome: &mut TwoPhaseResult<()>) {
        self.resources.destroy_resources();
        self.resources
            .latch_heuristic(ResourceStatus::HeuristicMixed);
        *outcome = Err(TwoPhaseError::heuristic(
            self.resources.heuristic_outcome(),
            "outcome delivery abandoned with participants incomplete",
        ));
    }

    // Damage can grow while retries run; heuristic reports carry the
    // final verdict, not the first one raised.
    fn refresh_verdict(&self, commit: bool, outcome: &mut TwoPhaseResult<()>) {
        let current = self.resources.heuristic_outcome();
        if !current.is_heuristic() {
            return;
        }
        let benign = if commit {
            ResourceStatus::HeuristicCommit
        } else {
            ResourceStatus::HeuristicRollback
        };
        let grew = match outcome {
            Ok(()) => current != benign,
            Err(TwoPhaseError::Heuristic { verdict, .. }) => *verdict != current,
            Err(_) => false,
        };
        if grew {
            *outcome = Err(TwoPhaseError::heuristic(
                current,
                format!(
                    "transaction {} completed with heuristic damage",
                    self.xid.gtrid_hex()
                ),
            ));
        }
    }

    fn finish_unit(&mut self, commit: bool, outcome: TwoPhaseResult<()>) -> TwoPhaseResult<()> {
        // A subordinate that reported damage holds its unit and verdict
        // until the superior's forget releases them.
        if self.subordinate && matches!(outcome, Err(TwoPhaseError::Heuristic { .. })) {
            self.set_state(if commit {
                TransactionState::HeuristicOnCommit
            } else {
                TransactionState::HeuristicOnRollback
            });
            self.log_heuristic_outcome();
            return outcome;
        }

        self.set_state(if commit {
            TransactionState::Committed
        } else {
            TransactionState::RolledBack
        });
        self.forget_unit();
        outcome
    }

    // Rollback distribution after a failed prepare or a rollback-only
    // mark. The caller surfaces its own error; damage latched here stays
    // in the verdict and is logged instead.
    fn rollback_after_failure(&mut self) {
        let outcome = self.resources.distribute_rollback();
        if let Err(err) = self.complete(false, outcome) {
            Logger::warn(
                "ROLLBACK_COMPLETION_DAMAGE",
                &[("detail", &err.to_string()), ("xid", &self.xid.to_string())],
            );
        }
    }

    // --- Log unit -----------------------------------------------------

    fn fail_unlogged_decision(&mut self, err: TxLogError) -> TwoPhaseError {
        Logger::error(
            "DECISION_NOT_LOGGED",
            &[("detail", &err.to_string()), ("xid", &self.xid.to_string())],
        );
        self.set_state(TransactionState::RollingBack);
        self.rollback_after_failure();
        TwoPhaseError::system(format!("commit decision could not be logged: {}", err))
    }

    // Write the decision point: global id, one item per prepared branch,
    // and the deciding state, forced as one unit.
    fn harden_decision(&mut self, state: TransactionState) -> TxLogResult<()> {
        let log = match &self.log {
            Some(log) => Arc::clone(log),
            None => return Ok(()),
        };
        let mut writer = lock_log(&log);
        let unit_id = match self.unit_id {
            Some(unit_id) => unit_id,
            None => {
                let unit_id = writer.allocate_unit_id();
                self.unit_id = Some(unit_id);
                unit_id
            }
        };

        writer.append_unit_write(unit_id, SECTION_GLOBAL_ID, self.xid.to_bytes())?;
        for participant in self.resources.iter() {
            if participant.is_joined()
                || participant.resource_status() != ResourceStatus::Prepared
            {
                continue;
            }
            let record = ParticipantRecord {
                recovery_id: participant.recovery_id(),
                priority: participant.priority(),
                status: participant.resource_status(),
                xid: participant.xid().clone(),
            };
            writer.append_unit_write(unit_id, SECTION_PARTICIPANT, record.encode())?;
        }
        writer.append_unit_write(unit_id, SECTION_STATE, encode_state(state))?;
        writer.force()
    }

    fn log_state(&mut self, state: TransactionState) -> TxLogResult<()> {
        let (log, unit_id) = match (&self.log, self.unit_id) {
            (Some(log), Some(unit_id)) => (Arc::clone(log), unit_id),
            _ => return Ok(()),
        };
        let mut writer = lock_log(&log);
        writer.append_unit_write(unit_id, SECTION_STATE, encode_state(state))?;
        writer.force()
    }

    fn log_heuristic_outcome(&mut self) {
        let verdict = self.resources.heuristic_outcome();
        if verdict == self.logged_heuristic {
            return;
        }
        let (log, unit_id) = match (&self.log, self.unit_id) {
            (Some(log), Some(unit_id)) => (Arc::clone(log), unit_id),
            _ => return,
        };
        let state = self.state;
        let mut writer = lock_log(&log);
        match write_heuristic(&mut writer, unit_id, verdict, state) {
            Ok(()) => self.logged_heuristic = verdict,
            Err(err) => Logger::warn(
                "HEURISTIC_NOT_LOGGED",
                &[("detail", &err.to_string()), ("xid", &self.xid.to_string())],
            ),
        }
    }

    fn forget_unit(&mut self) {
        let log = match &self.log {
            Some(log) => Arc::clone(log),
            None => {
                self.unit_id = None;
                return;
            }
        };
        let unit_id = match self.unit_id.take() {
            Some(unit_id) => unit_id,
            None => return,
        };
        let mut writer = lock_log(&log);
        if let Err(err) = remove_unit(&mut writer, unit_id) {
            Logger::warn(
                "UNIT_REMOVE_FAILED",
                &[
                    ("detail", &err.to_string()),
                    ("unit", &unit_id.to_string()),
                    ("xid", &self.xid.to_string()),
                ],
            );
        }
    }
}

fn write_heuristic(
    writer: &mut LogWriter,
    unit_id: u64,
    verdict: ResourceStatus,
    state: TransactionState,
) -> TxLogResult<()> {
    writer.append_unit_write(unit_id, SECTION_HEURISTIC, vec![verdict.as_code() as u8])?;
    writer.append_unit_write(unit_id, SECTION_STATE, encode_state(state))?;
    writer.force()
}

fn remove_unit(writer: &mut LogWriter, unit_id: u64) -> TxLogResult<()> {
    writer.append_unit_remove(unit_id)?;
    writer.force()
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("xid", &self.xid.to_string())
            .field("state", &self.state)
            .field("participants", &self.resources.len())
            .field("subordinate", &self.subordinate)
            .field("unit_id", &self.unit_id)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
