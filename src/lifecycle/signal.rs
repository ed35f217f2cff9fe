//! One-shot event latch
//!
//! A small condvar-backed latch used to cancel drain waits and to publish
//! lifecycle milestones (replay finished, resync finished). Once set it
//! stays set; waiters wake immediately after the fact.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

struct LatchInner {
    flag: AtomicBool,
    mutex: Mutex<()>,
    condvar: Condvar,
}

/// A clonable one-shot latch.
#[derive(Clone)]
pub struct EventLatch {
    inner: Arc<LatchInner>,
}

impl EventLatch {
    /// Create an unset latch.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LatchInner {
                flag: AtomicBool::new(false),
                mutex: Mutex::new(()),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Set the latch and wake every waiter.
    pub fn set(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        // Take the lock so a waiter between its flag check and its wait
        // cannot miss the notification
        let _guard = self
            .inner
            .mutex
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        self.inner.condvar.notify_all();
    }

    /// Whether the latch has been set.
    pub fn is_set(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Wait up to `timeout` for the latch. Returns whether it is set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_set() {
            return true;
        }

        let guard = self
            .inner
            .mutex
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        if self.is_set() {
            return true;
        }

        let (_guard, _result) = self
            .inner
            .condvar
            .wait_timeout(guard, timeout)
            .unwrap_or_else(|e| e.into_inner());

        self.is_set()
    }
}

impl Default for EventLatch {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_latch_starts_unset() {
        let latch = EventLatch::new();
        assert!(!latch.is_set());
    }

    #[test]
    fn test_set_is_sticky() {
        let latch = EventLatch::new();
        latch.set();
        assert!(latch.is_set());
        latch.set();
        assert!(latch.is_set());
    }

    #[test]
    fn test_wait_timeout_expires() {
        let latch = EventLatch::new();
        let start = Instant::now();
        let set = latch.wait_timeout(Duration::from_millis(30));
        assert!(!set);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_wait_returns_immediately_when_set() {
        let latch = EventLatch::new();
        latch.set();
        let start = Instant::now();
        assert!(latch.wait_timeout(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_cross_thread_wake() {
        let latch = EventLatch::new();
        let remote = latch.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(40));
            remote.set();
        });

        let woke = latch.wait_timeout(Duration::from_secs(5));
        handle.join().unwrap();
        assert!(woke);
        assert!(latch.is_set());
    }
}
