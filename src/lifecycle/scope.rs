//! Failure scopes and their lifecycle records
//!
//! A failure scope is one recoverable unit of the system (a server or a
//! peer whose work this instance has adopted). Its lifecycle record counts
//! in-flight transactional activity so shutdown can drain it: Active
//! (accepting, count may be >0), Draining (no new activity, waiting for
//! zero), Removed (gone from the registry).

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::observability::Logger;

use super::errors::{LifecycleError, LifecycleResult};
use super::signal::EventLatch;

/// Identifies one recoverable unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FailureScope {
    server_name: String,
}

impl FailureScope {
    /// A scope for the named server instance.
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
        }
    }

    /// The identity string the registry keys on.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }
}

/// Whether a scope belongs to this process or to a peer being recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locality {
    /// The scope is this server instance.
    Local,
    /// The scope belongs to a peer whose recovery this instance adopted.
    Peer,
}

impl Locality {
    /// Display string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Locality::Local => "local",
            Locality::Peer => "peer",
        }
    }
}

struct ActivityState {
    activity: usize,
    accepting: bool,
}

/// The registry's record of one active failure scope.
///
/// Wait/notify lives on the record itself: activity guards notify the
/// condvar when the count reaches zero while draining.
pub struct ScopeLifeCycle {
    identity: String,
    locality: Locality,
    state: Mutex<ActivityState>,
    drained: Condvar,
}

impl ScopeLifeCycle {
    pub(crate) fn new(identity: String, locality: Locality) -> Arc<Self> {
        Arc::new(Self {
            identity,
            locality,
            state: Mutex::new(ActivityState {
                activity: 0,
                accepting: true,
            }),
            drained: Condvar::new(),
        })
    }

    /// The identity this record is registered under.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Local or adopted-peer scope.
    pub fn locality(&self) -> Locality {
        self.locality
    }

    /// Current in-flight activity count.
    pub fn activity_count(&self) -> usize {
        self.lock_state().activity
    }

    /// Whether new activity is still admitted.
    pub fn is_accepting_work(&self) -> bool {
        self.lock_state().accepting
    }

    /// Begin one unit of transactional activity against this scope.
    ///
    /// Refused once draining has begun. The returned guard ends the
    /// activity on drop.
    pub fn begin_activity(self: &Arc<Self>) -> LifecycleResult<ActivityGuard> {
        let mut state = self.lock_state();
        if !state.accepting {
            return Err(LifecycleError::not_accepting_work(&self.identity));
        }
        state.activity += 1;
        Ok(ActivityGuard {
            scope: Arc::clone(self),
        })
    }

    /// Stop admitting new activity. In-flight activity keeps running.
    pub fn stop_accepting_work(&self) {
        let mut state = self.lock_state();
        if state.accepting {
            state.accepting = false;
            Logger::trace(
                "SCOPE_DRAINING",
                &[
                    ("activity", &state.activity.to_string()),
                    ("scope", &self.identity),
                ],
            );
        }
    }

    /// Block until the activity count reaches zero, the deadline passes,
    /// or the cancellation latch fires.
    ///
    /// The wait wakes in short slices so cancellation is observed promptly
    /// even when no activity finishes.
    pub(crate) fn wait_drained(
        &self,
        timeout: Duration,
        cancel: Option<&EventLatch>,
    ) -> LifecycleResult<()> {
        const WAIT_SLICE: Duration = Duration::from_millis(25);

        let deadline = Instant::now() + timeout;
        let mut state = self.lock_state();

        loop {
            if state.activity == 0 {
                return Ok(());
            }
            if let Some(latch) = cancel {
                if latch.is_set() {
                    return Err(LifecycleError::drain_cancelled(
                        &self.identity,
                        state.activity,
                    ));
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(LifecycleError::drain_timeout(
                    &self.identity,
                    state.activity,
                ));
            }

            let slice = WAIT_SLICE.min(deadline - now);
            let (next, _timed_out) = self
                .drained
                .wait_timeout(state, slice)
                .unwrap_or_else(|e| e.into_inner());
            state = next;
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ActivityState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for ScopeLifeCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("ScopeLifeCycle")
            .field("identity", &self.identity)
            .field("locality", &self.locality)
            .field("activity", &state.activity)
            .field("accepting", &state.accepting)
            .finish()
    }
}

/// RAII token for one unit of in-flight activity.
///
/// Dropping the guard ends the activity; the last one out wakes the drain
/// waiter.
#[derive(Debug)]
pub struct ActivityGuard {
    scope: Arc<ScopeLifeCycle>,
}

impl ActivityGuard {
    /// The scope this activity runs under.
    pub fn scope(&self) -> &Arc<ScopeLifeCycle> {
        &self.scope
    }
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        let mut state = self.scope.lock_state();
        state.activity = state.activity.saturating_sub(1);
        if state.activity == 0 && !state.accepting {
            self.scope.drained.notify_all();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
