//! Quiesce fence and shutdown behaviour
//!
//! Shutdown is a two-step handshake: `prepare_to_shutdown` raises the
//! quiesce fence and cancels in-flight completion retries, `shutdown`
//! drains the scope and disposes of the log. These tests pin down the
//! fence: no new scope activates behind it, a quiesced resync delivers
//! nothing, and an unbounded retry loop ends when the fence goes up.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tempfile::TempDir;

use txncore::lifecycle::ScopeRegistry;
use txncore::participant::{ResourceStatus, XaParticipant};
use txncore::recovery::{ParticipantRecovery, RecoveryErrorCode, RecoveryManager};
use txncore::transaction::{
    encode_state, ParticipantRecord, TransactionState, TxnOptions, SECTION_GLOBAL_ID,
    SECTION_PARTICIPANT, SECTION_STATE,
};
use txncore::txlog::{replay, LogWriter};
use txncore::xa::codes::XAER_RMFAIL;
use txncore::xa::{Vote, XaError, XaResult, Xid};

// =============================================================================
// Test Utilities
// =============================================================================

#[derive(Default)]
struct Calls {
    commit: u32,
}

type SharedCalls = Arc<Mutex<Calls>>;

struct Reopened {
    calls: SharedCalls,
    commit: XaResult<()>,
}

impl XaParticipant for Reopened {
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
        Ok(())
    }

    fn forget(&mut self) -> XaResult<()> {
        Ok(())
    }
}

struct Factory {
    calls: SharedCalls,
    commit: XaResult<()>,
}

impl Factory {
    fn boxed(calls: &SharedCalls) -> Box<dyn ParticipantRecovery> {
        Box::new(Self {
            calls: Arc::clone(calls),
            commit: Ok(()),
        })
    }

    fn boxed_unreachable(calls: &SharedCalls) -> Box<dyn ParticipantRecovery> {
        Box::new(Self {
            calls: Arc::clone(calls),
            commit: Err(XaError::new(XAER_RMFAIL)),
        })
    }
}

impl ParticipantRecovery for Factory {
    fn reopen(&self, _record: &ParticipantRecord) -> Option<Box<dyn XaParticipant>> {
        Some(Box::new(Reopened {
            calls: Arc::clone(&self.calls),
            commit: self.commit.clone(),
        }))
    }
}

fn calls() -> SharedCalls {
    Arc::new(Mutex::new(Calls::default()))
}

fn manager_with_options(dir: &TempDir, options: TxnOptions) -> RecoveryManager {
    RecoveryManager::new(dir.path(), "server1", Arc::new(ScopeRegistry::new()), options)
}

fn fast_options() -> TxnOptions {
    TxnOptions {
        retry_interval: Duration::from_millis(1),
        retry_limit: 2,
        ..TxnOptions::default()
    }
}

fn seed_committing_unit(dir: &TempDir) {
    let mut writer = LogWriter::open(dir.path()).unwrap();
    let unit_id = writer.allocate_unit_id();
    let xid = Xid::generate();
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

// =============================================================================
// Quiesce fence
// =============================================================================

/// Once the fence is up, replay cannot bring a failure scope online.
#[test]
fn test_quiesce_refuses_new_scope_activation() {
    let dir = TempDir::new().unwrap();
    let mut manager = manager_with_options(&dir, fast_options());

    manager.prepare_to_shutdown();

    let err = manager.replay().unwrap_err();
    assert_eq!(err.code(), RecoveryErrorCode::ActivationRefused);
}

/// A resync that starts behind the fence keeps every pending transaction
/// untouched; shutdown then preserves the units for the next restart.
#[test]
fn test_quiesced_resync_delivers_nothing() {
    let dir = TempDir::new().unwrap();
    seed_committing_unit(&dir);

    let after = calls();
    let mut manager = manager_with_options(&dir, fast_options());
    manager.register_factory(7, Factory::boxed(&after));

    let stats = manager.replay().unwrap();
    assert_eq!(stats.reconstructed, 1);

    manager.prepare_to_shutdown();
    let resync = manager.resync().unwrap();

    assert_eq!(resync.driven, 0);
    assert_eq!(resync.resolved, 0);
    assert_eq!(after.lock().unwrap().commit, 0);
    assert_eq!(manager.pending_transactions().len(), 1);

    manager.shutdown().unwrap();

    let recovered = replay(&dir.path().join("txlog").join("tranlog.log")).unwrap();
    assert_eq!(recovered.live_unit_count(), 1);
    assert_eq!(recovered.service_data().unwrap().epoch, 1);
}

// =============================================================================
// Retry cancellation
// =============================================================================

/// With an unbounded retry budget the only way out of outcome delivery
/// is the cancel signal. Raising the fence from another thread must end
/// the loop and surface the damage.
#[test]
fn test_shutdown_cancels_unbounded_retry() {
    let dir = TempDir::new().unwrap();
    seed_committing_unit(&dir);

    let after = calls();
    let options = TxnOptions {
        retry_interval: Duration::from_millis(20),
        retry_limit: 0,
        ..TxnOptions::default()
    };
    let mut manager = manager_with_options(&dir, options);
    manager.register_factory(7, Factory::boxed_unreachable(&after));

    let stats = manager.replay().unwrap();
    assert_eq!(stats.reconstructed, 1);

    let signal = manager.pending_transactions()[0].cancel_signal();
    let handle = thread::spawn(move || {
        let resync = manager.resync().unwrap();
        (manager, resync)
    });

    thread::sleep(Duration::from_millis(60));
    signal.set();

    let (manager, resync) = handle.join().unwrap();
    assert_eq!(resync.driven, 1);
    assert_eq!(resync.damaged, 1);
    assert_eq!(resync.resolved, 1);
    assert!(manager.pending_transactions().is_empty());
    assert!(after.lock().unwrap().commit >= 1);

    // Abandoned delivery reports heuristic damage on a root and releases
    // the unit rather than holding it in doubt.
    let recovered = replay(&dir.path().join("txlog").join("tranlog.log")).unwrap();
    assert_eq!(recovered.live_unit_count(), 0);
}
