//! Active failure-scope registry
//!
//! Tracks which failure scopes are currently recovering or processing
//! work. Activation refuses once server quiesce has begun; deactivation
//! drains in-flight activity before removing the entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::observability::{log_event_with_fields, Event, Logger};

use super::errors::{LifecycleError, LifecycleResult};
use super::scope::{FailureScope, Locality, ScopeLifeCycle};
use super::signal::EventLatch;

struct RegistryInner {
    active: HashMap<String, Arc<ScopeLifeCycle>>,
    quiescing: bool,
}

/// Registry of failure scopes with live recovery state.
pub struct ScopeRegistry {
    inner: Mutex<RegistryInner>,
}

impl ScopeRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                active: HashMap::new(),
                quiescing: false,
            }),
        }
    }

    /// Add a failure scope to the active set.
    ///
    /// Returns the lifecycle record for the caller to thread through its
    /// activity. A missing scope is a no-op; activation during quiesce is
    /// refused so shutdown never races new recovery work.
    pub fn activate(
        &self,
        scope: Option<&FailureScope>,
        locality: Locality,
    ) -> Option<Arc<ScopeLifeCycle>> {
        let scope = scope?;
        let identity = scope.server_name().to_string();

        let mut inner = self.lock_inner();
        if inner.quiescing {
            Logger::warn(
                "SCOPE_ACTIVATION_REFUSED",
                &[("reason", "server quiesce in progress"), ("scope", &identity)],
            );
            return None;
        }

        let lifecycle = ScopeLifeCycle::new(identity.clone(), locality);
        if inner
            .active
            .insert(identity.clone(), Arc::clone(&lifecycle))
            .is_some()
        {
            Logger::warn("SCOPE_REACTIVATED", &[("scope", &identity)]);
        }
        drop(inner);

        log_event_with_fields(
            Event::ScopeActivated,
            &[("locality", locality.as_str()), ("scope", &identity)],
        );
        Some(lifecycle)
    }

    /// Fence the registry for shutdown. Subsequent activations are refused.
    pub fn begin_quiesce(&self) {
        let mut inner = self.lock_inner();
        if !inner.quiescing {
            inner.quiescing = true;
            let active = inner.active.len();
            drop(inner);
            log_event_with_fields(Event::QuiesceBegin, &[("active_scopes", &active.to_string())]);
        }
    }

    /// Whether quiesce has begun.
    pub fn quiesce_started(&self) -> bool {
        self.lock_inner().quiescing
    }

    /// Whether the named scope is currently active.
    pub fn is_active(&self, identity: &str) -> bool {
        self.lock_inner().active.contains_key(identity)
    }

    /// Number of active scopes.
    pub fn active_count(&self) -> usize {
        self.lock_inner().active.len()
    }

    /// Remove a failure scope from the active set.
    ///
    /// Quiesce must have begun first. New activity against the scope is
    /// stopped, then the call blocks until in-flight activity drains, the
    /// timeout passes, or the cancellation latch fires. On timeout or
    /// cancellation the entry stays registered so a retry can finish the
    /// drain.
    pub fn deactivate(
        &self,
        lifecycle: &Arc<ScopeLifeCycle>,
        timeout: Duration,
        cancel: Option<&EventLatch>,
    ) -> LifecycleResult<()> {
        if !self.quiesce_started() {
            return Err(LifecycleError::QuiesceNotStarted);
        }

        lifecycle.stop_accepting_work();
        lifecycle.wait_drained(timeout, cancel)?;

        let mut inner = self.lock_inner();
        let registered = inner
            .active
            .get(lifecycle.identity())
            .is_some_and(|entry| Arc::ptr_eq(entry, lifecycle));
        if !registered {
            return Err(LifecycleError::not_registered(lifecycle.identity()));
        }
        inner.active.remove(lifecycle.identity());
        drop(inner);

        log_event_with_fields(Event::ScopeDeactivated, &[("scope", lifecycle.identity())]);
        Ok(())
    }

    fn lock_inner(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ScopeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
