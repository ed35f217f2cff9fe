//! Restart recovery round trips
//!
//! Each test leaves a crash image in the transaction log (either through
//! the coordinator API or by writing unit sections directly), then brings
//! up a recovery manager over the same data directory the way a restarted
//! process would. Recovery must deliver exactly the logged decision: no
//! outcome invented, no in-doubt unit resolved without its superior, and
//! no unit left behind once its transaction is done.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use txncore::lifecycle::ScopeRegistry;
use txncore::participant::{ResourceStatus, XaParticipant};
use txncore::recovery::{ParticipantRecovery, RecoveryManager};
use txncore::transaction::{
    encode_state, ParticipantRecord, Transaction, TransactionState, TxnOptions,
    SECTION_GLOBAL_ID, SECTION_PARTICIPANT, SECTION_STATE,
};
use txncore::twophase::TwoPhaseError;
use txncore::txlog::{replay, LogWriter};
use txncore::xa::codes::XA_HEURRB;
use txncore::xa::{Vote, XaError, XaResult, Xid};

// =============================================================================
// Test Utilities
// =============================================================================

#[derive(Default)]
struct Calls {
    commit: u32,
    rollback: u32,
}

type SharedCalls = Arc<Mutex<Calls>>;

/// Participant for the pre-crash process.
struct Scripted {
    calls: SharedCalls,
    commit: XaResult<()>,
}

impl Scripted {
    fn ok(calls: &SharedCalls) -> Box<Self> {
        Box::new(Self {
            calls: Arc::clone(calls),
            commit: Ok(()),
        })
    }

    fn heuristic_commit_answer(calls: &SharedCalls) -> Box<Self> {
        Box::new(Self {
            calls: Arc::clone(calls),
            commit: Err(XaError::new(XA_HEURRB)),
        })
    }
}

impl XaParticipant for Scripted {
    fn prepare(&mut self) -> XaResult<Vote> {
        Ok(Vote::Commit)
    }

    fn commit(&mut self) -> XaResult<()> {
        self.calls.lock().unwrap().commit += 1;
        self.commit.clone()
    }

    fn commit_one_phase(&mut self) -> XaResult<()> {
        Ok(())
    }

    fn rollback(&mut self) -> XaResult<()> {
        self.calls.lock().unwrap().rollback += 1;
        Ok(())
    }

    fn forget(&mut self) -> XaResult<()> {
        Ok(())
    }

    fn recovery_id(&self) -> u64 {
        7
    }
}

/// Participant the factory hands back after restart.
struct Reopened {
    calls: SharedCalls,
}

impl XaParticipant for Reopened {
    fn prepare(&mut self) -> XaResult<Vote> {
        Ok(Vote::Commit)
    }

    fn commit(&mut self) -> XaResult<()> {
        self.calls.lock().unwrap().commit += 1;
        Ok(())
    }

    fn commit_one_phase(&mut self) -> XaResult<()> {
        Ok(())
    }

    fn rollback(&mut self) -> XaResult<()> {
        self.calls.lock().unwrap().rollback += 1;
        Ok(())
    }

    fn forget(&mut self) -> XaResult<()> {
        Ok(())
    }

    fn recovery_id(&self) -> u64 {
        7
    }
}

struct Factory {
    calls: SharedCalls,
}

impl Factory {
    fn boxed(calls: &SharedCalls) -> Box<dyn ParticipantRecovery> {
        Box::new(Self {
            calls: Arc::clone(calls),
        })
    }
}

impl ParticipantRecovery for Factory {
    fn reopen(&self, _record: &ParticipantRecord) -> Option<Box<dyn XaParticipant>> {
        Some(Box::new(Reopened {
            calls: Arc::clone(&self.calls),
        }))
    }
}

fn calls() -> SharedCalls {
    Arc::new(Mutex::new(Calls::default()))
}

fn fast_options() -> TxnOptions {
    TxnOptions {
        retry_interval: Duration::from_millis(1),
        retry_limit: 2,
        ..TxnOptions::default()
    }
}

fn restart_manager(dir: &TempDir) -> RecoveryManager {
    RecoveryManager::new(
        dir.path(),
        "server1",
        Arc::new(ScopeRegistry::new()),
        fast_options(),
    )
}

fn live_units(dir: &TempDir) -> usize {
    let path = dir.path().join("txlog").join("tranlog.log");
    replay(&path).unwrap().live_unit_count()
}

// =============================================================================
// In-doubt resolution
// =============================================================================

/// A subordinate that crashed between prepare and the superior's decision
/// is reconstructed in doubt; the superior's commit still applies.
#[test]
fn test_in_doubt_subordinate_resolved_after_restart() {
    let dir = TempDir::new().unwrap();
    let before = calls();

    // Pre-crash process: prepare hardens the unit, then nothing more.
    {
        let writer = LogWriter::open(dir.path()).unwrap();
        let mut txn = Transaction::begin_subordinate(Xid::generate(), fast_options());
        txn.attach_log(Arc::new(Mutex::new(writer)));
        txn.enlist(Scripted::ok(&before)).unwrap();
        txn.enlist(Scripted::ok(&before)).unwrap();
        assert_eq!(txn.prepare().unwrap(), Vote::Commit);
    }
    assert_eq!(live_units(&dir), 1);

    // Restarted process: replay, resync, then the superior decides.
    let after = calls();
    let mut manager = restart_manager(&dir);
    manager.register_factory(7, Factory::boxed(&after));

    let stats = manager.replay().unwrap();
    assert_eq!(stats.reconstructed, 1);

    let resync = manager.resync().unwrap();
    assert_eq!(resync.in_doubt, 1);
    assert_eq!(after.lock().unwrap().commit, 0);

    let mut pending = manager.take_pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].state(), TransactionState::Prepared);

    pending[0].commit_prepared().unwrap();
    assert_eq!(pending[0].state(), TransactionState::Committed);
    assert_eq!(after.lock().unwrap().commit, 2);
    assert_eq!(live_units(&dir), 0);
}

/// A logged commit decision is redelivered after restart.
#[test]
fn test_crashed_commit_completes_on_restart() {
    let dir = TempDir::new().unwrap();
    let xid = Xid::generate();

    // Crash image: decision logged, outcome never delivered.
    {
        let mut writer = LogWriter::open(dir.path()).unwrap();
        let unit_id = writer.allocate_unit_id();
        writer
            .append_unit_write(unit_id, SECTION_GLOBAL_ID, xid.to_bytes())
            .unwrap();
        let record = ParticipantRecord {
            recovery_id: 7,
            priority: 0,
            status: ResourceStatus::Prepared,
            xid: xid.new_branch(1),
        };
        writer
            .append_unit_write(unit_id, SECTION_PARTICIPANT, record.encode())
            .unwrap();
        writer
            .append_unit_write(
                unit_id,
                SECTION_STATE,
                encode_state(TransactionState::Committing),
            )
            .unwrap();
        writer.force().unwrap();
    }

    let after = calls();
    let mut manager = restart_manager(&dir);
    manager.register_factory(7, Factory::boxed(&after));

    manager.replay().unwrap();
    let resync = manager.resync().unwrap();

    assert_eq!(resync.resolved, 1);
    assert_eq!(resync.damaged, 0);
    let after = after.lock().unwrap();
    assert_eq!(after.commit, 1);
    assert_eq!(after.rollback, 0);
    drop(after);
    assert_eq!(live_units(&dir), 0);
}

// =============================================================================
// Heuristic hold
// =============================================================================

/// A subordinate that took heuristic damage keeps its unit across the
/// crash until the superior's forget releases it.
#[test]
fn test_heuristic_outcome_held_until_superior_forget() {
    let dir = TempDir::new().unwrap();
    let before = calls();

    // Pre-crash process: superior says commit, participant answers that
    // it already rolled back on its own.
    {
        let writer = LogWriter::open(dir.path()).unwrap();
        let mut txn = Transaction::begin_subordinate(Xid::generate(), fast_options());
        txn.attach_log(Arc::new(Mutex::new(writer)));
        txn.enlist(Scripted::heuristic_commit_answer(&before)).unwrap();
        txn.enlist(Scripted::ok(&before)).unwrap();
        txn.prepare().unwrap();

        let err = txn.commit_prepared().unwrap_err();
        assert!(matches!(err, TwoPhaseError::Heuristic { .. }));
        assert_eq!(txn.state(), TransactionState::HeuristicOnCommit);
    }
    assert_eq!(live_units(&dir), 1);

    // Restarted process: the damage survives replay and stays held.
    let after = calls();
    let mut manager = restart_manager(&dir);
    manager.register_factory(7, Factory::boxed(&after));

    manager.replay().unwrap();
    let resync = manager.resync().unwrap();
    assert_eq!(resync.held, 1);
    assert_eq!(resync.damaged, 1);
    assert_eq!(live_units(&dir), 1);

    // The superior's forget finally releases the unit.
    let mut pending = manager.take_pending();
    assert_eq!(pending[0].state(), TransactionState::HeuristicOnCommit);
    pending[0].forget().unwrap();
    assert_eq!(live_units(&dir), 0);
}

// =============================================================================
// Deferral and epoch handling
// =============================================================================

/// A unit whose factory is missing waits in the log across restarts, and
/// the epoch counts each restart that saw it. A clean shutdown truncates.
#[test]
fn test_deferred_unit_survives_until_factory_returns() {
    let dir = TempDir::new().unwrap();
    let xid = Xid::generate();

    {
        let mut writer = LogWriter::open(dir.path()).unwrap();
        let unit_id = writer.allocate_unit_id();
        writer
            .append_unit_write(unit_id, SECTION_GLOBAL_ID, xid.to_bytes())
            .unwrap();
        let record = ParticipantRecord {
            recovery_id: 7,
            priority: 0,
            status: ResourceStatus::Prepared,
            xid: xid.new_branch(1),
        };
        writer
            .append_unit_write(unit_id, SECTION_PARTICIPANT, record.encode())
            .unwrap();
        writer
            .append_unit_write(
                unit_id,
                SECTION_STATE,
                encode_state(TransactionState::Committing),
            )
            .unwrap();
        writer.force().unwrap();
    }

    // First restart: nobody can reopen recovery id 7.
    let mut first = restart_manager(&dir);
    let stats = first.replay().unwrap();
    assert_eq!(stats.deferred, 1);
    assert_eq!(stats.epoch, 1);
    first.resync().unwrap();
    first.prepare_to_shutdown();
    first.shutdown().unwrap();
    assert_eq!(live_units(&dir), 1);

    // Second restart: the factory is back and the unit resolves.
    let after = calls();
    let mut second = restart_manager(&dir);
    second.register_factory(7, Factory::boxed(&after));
    let stats = second.replay().unwrap();
    assert_eq!(stats.reconstructed, 1);
    assert_eq!(stats.epoch, 2);
    let resync = second.resync().unwrap();
    assert_eq!(resync.resolved, 1);
    assert_eq!(after.lock().unwrap().commit, 1);
    second.prepare_to_shutdown();
    second.shutdown().unwrap();

    // Clean shutdown truncated; the next restart starts from scratch.
    let mut third = restart_manager(&dir);
    let stats = third.replay().unwrap();
    assert_eq!(stats.live_units, 0);
    assert_eq!(stats.epoch, 1);
}
