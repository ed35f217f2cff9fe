//! Recovery manager
//!
//! Orchestrates restart for one failure scope, in strict order:
//!
//! 1. Open the transaction log (a torn tail is truncated by the open)
//! 2. Replay live units and bump the recovery epoch
//! 3. Reconstruct transactions, reopening participants through their
//!    registered factories
//! 4. Activate the failure scope; replay is complete
//! 5. Resync: re-drive every reconstructed outcome
//!
//! Shutdown runs the inverse: quiesce fence, scope drain, then log
//! disposition (truncate when nothing is live, otherwise rewrite the
//! service data and leave the units for the next restart).

use std::collections::HashMap;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::TxnConfig;
use crate::lifecycle::{EventLatch, FailureScope, Locality, ScopeLifeCycle, ScopeRegistry};
use crate::observability::{
    log_event_with_fields, quiet_fail, AuditLog, Event, Logger, ObservationScope, Timer,
};
use crate::participant::XaParticipant;
use crate::transaction::{
    decode_heuristic, decode_state, ParticipantRecord, SharedLog, Transaction, TransactionState,
    TxnOptions, SECTION_GLOBAL_ID, SECTION_HEURISTIC, SECTION_PARTICIPANT, SECTION_STATE,
};
use crate::txlog::{replay as replay_log, LogWriter, RecoveredUnit, TxLogError};
use crate::xa::Xid;

use super::errors::{RecoveryError, RecoveryResult};

/// Reopens participants from their logged records.
///
/// Implementations register with the manager under the recovery id their
/// adapters report. `reopen` returning `None` means the factory cannot
/// currently reach the branch; the whole unit stays in the log for a
/// later recovery pass.
pub trait ParticipantRecovery: Send {
    fn reopen(&self, record: &ParticipantRecord) -> Option<Box<dyn XaParticipant>>;
}

/// What replay found in the log.
#[derive(Debug, Clone, Default)]
pub struct ReplayStats {
    /// Live units present in the log.
    pub live_units: usize,
    /// Units turned into transactions awaiting resync.
    pub reconstructed: usize,
    /// Units left in the log for a later pass.
    pub deferred: usize,
    /// Stale units removed during replay.
    pub discarded: usize,
    /// The recovery epoch written for this restart.
    pub epoch: u32,
}

/// What resync did with the reconstructed transactions.
#[derive(Debug, Clone, Default)]
pub struct ResyncStats {
    /// Transactions whose recovery was driven this pass.
    pub driven: usize,
    /// Transactions that reached a terminal state.
    pub resolved: usize,
    /// Transactions that completed with heuristic damage.
    pub damaged: usize,
    /// Prepared transactions left pending for their superior.
    pub in_doubt: usize,
    /// Heuristically completed transactions held for a forget.
    pub held: usize,
}

enum UnitDisposition {
    Reconstructed(Transaction),
    Stale,
    Deferred,
}

/// Restart and shutdown orchestration for one failure scope.
pub struct RecoveryManager {
    data_dir: PathBuf,
    scope: FailureScope,
    locality: Locality,
    registry: Arc<ScopeRegistry>,
    options: TxnOptions,
    drain_timeout: Duration,
    audit: Option<Arc<dyn AuditLog>>,
    factories: HashMap<u64, Box<dyn ParticipantRecovery>>,
    log: Option<SharedLog>,
    lifecycle: Option<Arc<ScopeLifeCycle>>,
    recovered: Vec<Transaction>,
    resync_cancels: Vec<EventLatch>,
    deferred: Vec<u64>,
    epoch: u32,
    cancel: EventLatch,
}

impl RecoveryManager {
    pub fn new(
        data_dir: impl AsRef<Path>,
        server_name: impl Into<String>,
        registry: Arc<ScopeRegistry>,
        options: TxnOptions,
    ) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            scope: FailureScope::new(server_name),
            locality: Locality::Local,
            registry,
            options,
            drain_timeout: Duration::from_secs(30),
            audit: None,
            factories: HashMap::new(),
            log: None,
            lifecycle: None,
            recovered: Vec::new(),
            resync_cancels: Vec::new(),
            deferred: Vec::new(),
            epoch: 0,
            cancel: EventLatch::new(),
        }
    }

    /// A manager for this server's own scope, configured from `config`.
    /// The audit stream is attached separately, through
    /// [`TxnConfig::open_audit_log`] and [`with_audit`](Self::with_audit).
    pub fn from_config(config: &TxnConfig, registry: Arc<ScopeRegistry>) -> Self {
        Self::new(
            config.data_path(),
            config.server_name.clone(),
            registry,
            config.txn_options(),
        )
        .with_drain_timeout(config.drain_timeout())
    }

    /// Recover on behalf of a peer server's scope instead of this one's.
    pub fn with_locality(mut self, locality: Locality) -> Self {
        self.locality = locality;
        self
    }

    /// How long `shutdown` waits for in-flight scope activity to drain.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Audit every completion and forget flow the reconstructed
    /// transactions send during resync.
    pub fn with_audit(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Register the factory that reopens participants logged under
    /// `recovery_id`. Id zero marks non-recoverable adapters and is
    /// refused.
    pub fn register_factory(&mut self, recovery_id: u64, factory: Box<dyn ParticipantRecovery>) {
        if recovery_id == 0 {
            Logger::warn(
                "FACTORY_ID_RESERVED",
                &[("recovery_id", "0"), ("scope", self.scope.server_name())],
            );
            return;
        }
        if self.factories.insert(recovery_id, factory).is_some() {
            Logger::warn(
                "FACTORY_REPLACED",
                &[("recovery_id", &recovery_id.to_string())],
            );
        }
    }

    // --- Accessors ----------------------------------------------------

    pub fn server_name(&self) -> &str {
        self.scope.server_name()
    }

    /// The recovery epoch written by the last replay.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// The shared log handle, once replay has opened it. New transactions
    /// attach this to harden into the same log.
    pub fn shared_log(&self) -> Option<SharedLog> {
        self.log.as_ref().map(Arc::clone)
    }

    /// Transactions reconstructed but not yet resolved: in-doubt ones
    /// awaiting their superior and heuristic ones awaiting forget.
    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.recovered
    }

    /// Hand the pending transactions to the caller, usually so a superior
    /// protocol can resolve them.
    pub fn take_pending(&mut self) -> Vec<Transaction> {
        mem::take(&mut self.recovered)
    }

    /// Units left in the log because their participants could not be
    /// reopened this pass.
    pub fn deferred_units(&self) -> &[u64] {
        &self.deferred
    }

    // --- Replay -------------------------------------------------------

    /// Open and replay the log, reconstruct in-doubt transactions, and
    /// activate the failure scope.
    pub fn replay(&mut self) -> RecoveryResult<ReplayStats> {
        if self.log.is_some() {
            return Err(RecoveryError::not_ready(
                "replay already completed for this scope",
            ));
        }
        log_event_with_fields(Event::RecoveryStart, &[("scope", self.scope.server_name())]);
        log_event_with_fields(Event::ReplayBegin, &[("scope", self.scope.server_name())]);
        let timer = Timer::new();

        let mut writer = LogWriter::open(&self.data_dir).map_err(|e| self.replay_failure(e))?;
        let recovered = replay_log(writer.path()).map_err(|e| self.replay_failure(e))?;

        if let Some(service) = recovered.service_data() {
            if service.server_name != self.scope.server_name() {
                Logger::warn(
                    "LOG_OWNER_MISMATCH",
                    &[
                        ("found", &service.server_name),
                        ("scope", self.scope.server_name()),
                    ],
                );
            }
        }
        let epoch = recovered.service_data().map(|s| s.epoch).unwrap_or(0) + 1;
        writer
            .append_service_data(epoch, self.scope.server_name())
            .map_err(|e| self.replay_failure(e))?;

        let log: SharedLog = Arc::new(Mutex::new(writer));
        let mut stats = ReplayStats {
            live_units: recovered.live_unit_count(),
            epoch,
            ..ReplayStats::default()
        };

        let mut stale = Vec::new();
        for (unit_id, unit) in recovered.units() {
            match self.reconstruct_unit(unit_id, unit, &log) {
                UnitDisposition::Reconstructed(txn) => {
                    self.resync_cancels.push(txn.cancel_signal());
                    self.recovered.push(txn);
                    stats.reconstructed += 1;
                }
                UnitDisposition::Stale => {
                    stale.push(unit_id);
                    stats.discarded += 1;
                }
                UnitDisposition::Deferred => {
                    self.deferred.push(unit_id);
                    stats.deferred += 1;
                }
            }
        }

        {
            let mut writer = log.lock().unwrap_or_else(|e| e.into_inner());
            for unit_id in &stale {
                if let Err(err) = writer.append_unit_remove(*unit_id) {
                    Logger::warn(
                        "UNIT_REMOVE_FAILED",
                        &[
                            ("detail", &err.to_string()),
                            ("unit", &unit_id.to_string()),
                        ],
                    );
                }
            }
            writer.force().map_err(|e| self.replay_failure(e))?;
        }

        self.epoch = epoch;
        self.log = Some(Arc::clone(&log));

        match self.registry.activate(Some(&self.scope), self.locality) {
            Some(lifecycle) => self.lifecycle = Some(lifecycle),
            None => {
                return Err(RecoveryError::activation_refused(self.scope.server_name()))
            }
        }
        log_event_with_fields(
            Event::ReplayComplete,
            &[
                ("deferred", &stats.deferred.to_string()),
                ("elapsed_ms", &timer.elapsed_ms()),
                ("reconstructed", &stats.reconstructed.to_string()),
                ("scope", self.scope.server_name()),
            ],
        );
        Ok(stats)
    }

    fn replay_failure(&self, source: TxLogError) -> RecoveryError {
        log_event_with_fields(
            Event::RecoveryFailed,
            &[
                ("detail", &source.to_string()),
                ("scope", self.scope.server_name()),
            ],
        );
        RecoveryError::replay_failed(source)
    }

    fn reconstruct_unit(
        &self,
        unit_id: u64,
        unit: &RecoveredUnit,
        log: &SharedLog,
    ) -> UnitDisposition {
        let state = match unit.last_item(SECTION_STATE).and_then(decode_state) {
            Some(state) => state,
            None => {
                Logger::warn("UNIT_STATE_UNREADABLE", &[("unit", &unit_id.to_string())]);
                return UnitDisposition::Deferred;
            }
        };
        if matches!(
            state,
            TransactionState::None | TransactionState::Committed | TransactionState::RolledBack
        ) {
            return UnitDisposition::Stale;
        }
        let xid = match unit
            .last_item(SECTION_GLOBAL_ID)
            .and_then(|item| Xid::from_bytes(item).ok())
        {
            Some(xid) => xid,
            None => {
                Logger::warn(
                    "UNIT_GLOBAL_ID_UNREADABLE",
                    &[("unit", &unit_id.to_string())],
                );
                return UnitDisposition::Deferred;
            }
        };

        let mut adopted: Vec<(Box<dyn XaParticipant>, ParticipantRecord)> = Vec::new();
        for item in unit.section(SECTION_PARTICIPANT).unwrap_or(&[]) {
            let record = match ParticipantRecord::decode(item) {
                Some(record) => record,
                None => {
                    Logger::warn(
                        "PARTICIPANT_RECORD_UNREADABLE",
                        &[("unit", &unit_id.to_string())],
                    );
                    return UnitDisposition::Deferred;
                }
            };
            let factory = match self.factories.get(&record.recovery_id) {
                Some(factory) => factory,
                None => {
                    Logger::warn(
                        "PARTICIPANT_FACTORY_MISSING",
                        &[
                            ("recovery_id", &record.recovery_id.to_string()),
                            ("unit", &unit_id.to_string()),
                        ],
                    );
                    return UnitDisposition::Deferred;
                }
            };
            match factory.reopen(&record) {
                Some(adapter) => adopted.push((adapter, record)),
                None => {
                    Logger::warn(
                        "PARTICIPANT_NOT_REOPENED",
                        &[
                            ("recovery_id", &record.recovery_id.to_string()),
                            ("unit", &unit_id.to_string()),
                        ],
                    );
                    return UnitDisposition::Deferred;
                }
            }
        }

        let mut txn =
            Transaction::reconstruct(unit_id, state, xid, self.options.clone(), Arc::clone(log));
        if let Some(audit) = &self.audit {
            txn = txn.with_audit(Arc::clone(audit));
        }
        if let Some(verdict) = unit.last_item(SECTION_HEURISTIC).and_then(decode_heuristic) {
            txn.restore_heuristic(verdict);
        }
        for (adapter, record) in adopted {
            txn.adopt_participant(adapter, record.xid, record.status);
        }
        UnitDisposition::Reconstructed(txn)
    }

    // --- Resync -------------------------------------------------------

    /// Re-drive every reconstructed transaction. Prepared transactions
    /// stay in doubt; heuristically completed ones stay held for forget;
    /// everything else resolves and releases its unit.
    pub fn resync(&mut self) -> RecoveryResult<ResyncStats> {
        let lifecycle = match &self.lifecycle {
            Some(lifecycle) => Arc::clone(lifecycle),
            None => {
                return Err(RecoveryError::not_ready(
                    "resync requires a completed replay",
                ))
            }
        };
        log_event_with_fields(
            Event::ResyncBegin,
            &[
                ("pending", &self.recovered.len().to_string()),
                ("scope", self.scope.server_name()),
            ],
        );
        let timer = Timer::new();

        let mut stats = ResyncStats::default();
        let pending = mem::take(&mut self.recovered);
        let mut kept = Vec::new();
        let mut halted = false;

        for mut txn in pending {
            if halted || self.cancel.is_set() {
                kept.push(txn);
                continue;
            }
            let guard = match lifecycle.begin_activity() {
                Ok(guard) => guard,
                Err(err) => {
                    Logger::warn(
                        "RESYNC_HALTED",
                        &[
                            ("detail", &err.to_string()),
                            ("scope", self.scope.server_name()),
                        ],
                    );
                    halted = true;
                    kept.push(txn);
                    continue;
                }
            };
            stats.driven += 1;
            let delivery = ObservationScope::with_fields(
                "RESYNC_DELIVERY",
                &[("xid", &txn.xid().to_string())],
            );
            let outcome = txn.recover();
            drop(guard);

            if let Err(err) = &outcome {
                stats.damaged += 1;
                Logger::warn(
                    "RESYNC_DAMAGE",
                    &[
                        ("detail", &err.to_string()),
                        ("xid", &txn.xid().to_string()),
                    ],
                );
            }
            match txn.state() {
                TransactionState::Prepared => {
                    stats.in_doubt += 1;
                    quiet_fail(delivery, "in doubt, awaiting the superior's decision");
                    kept.push(txn);
                }
                TransactionState::HeuristicOnCommit | TransactionState::HeuristicOnRollback => {
                    stats.held += 1;
                    quiet_fail(delivery, "heuristic outcome held for forget");
                    kept.push(txn);
                }
                _ => {
                    stats.resolved += 1;
                    match &outcome {
                        Ok(()) => delivery.complete(),
                        Err(err) => delivery.fail(&err.to_string()),
                    }
                }
            }
        }
        self.recovered = kept;

        log_event_with_fields(
            Event::ResyncComplete,
            &[
                ("elapsed_ms", &timer.elapsed_ms()),
                ("held", &(stats.in_doubt + stats.held).to_string()),
                ("resolved", &stats.resolved.to_string()),
                ("scope", self.scope.server_name()),
            ],
        );
        Ok(stats)
    }

    // --- Shutdown -----------------------------------------------------

    /// Raise the quiesce fence and cancel in-flight completion retries.
    /// Safe to call more than once.
    pub fn prepare_to_shutdown(&mut self) {
        self.registry.begin_quiesce();
        self.cancel.set();
        for signal in &self.resync_cancels {
            signal.set();
        }
    }

    /// Drain and deactivate the failure scope, then dispose of the log.
    ///
    /// `prepare_to_shutdown` must have run first. On a drain failure the
    /// scope stays registered and the call can be retried.
    pub fn shutdown(&mut self) -> RecoveryResult<()> {
        if !self.registry.quiesce_started() {
            return Err(RecoveryError::quiesce_not_started());
        }
        log_event_with_fields(Event::ShutdownStart, &[("scope", self.scope.server_name())]);

        if let Some(lifecycle) = self.lifecycle.take() {
            if let Err(err) = self.registry.deactivate(&lifecycle, self.drain_timeout, None) {
                self.lifecycle = Some(lifecycle);
                return Err(RecoveryError::drain_failed(err));
            }
        }

        if let Some(log) = self.log.take() {
            let mut writer = log.lock().unwrap_or_else(|e| e.into_inner());
            let disposition = replay_log(writer.path()).and_then(|recovered| {
                if recovered.has_live_units() {
                    writer.append_service_data(self.epoch, self.scope.server_name())?;
                    writer.force()
                } else {
                    writer.truncate()
                }
            });
            if let Err(err) = disposition {
                return Err(RecoveryError::disposition_failed(err));
            }
        }

        log_event_with_fields(
            Event::ShutdownComplete,
            &[("scope", self.scope.server_name())],
        );
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
