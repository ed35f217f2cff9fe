//! Completion retry pacing
//!
//! When a resource manager cannot be reached during outcome or forget
//! distribution, the coordinator re-drives the failed flows on a clock:
//! the base interval for the first ten attempts, doubling after every
//! tenth. A non-zero attempt limit bounds the clock; once it is spent the
//! caller abandons the remaining resources.

use std::time::Duration;

/// Paces completion retries.
///
/// `next_wait` hands out the delay to sleep before the next attempt, or
/// `None` once the configured limit is exhausted. A limit of zero means
/// unlimited attempts.
#[derive(Debug, Clone)]
pub struct RetryClock {
    interval: Duration,
    limit: u32,
    attempts: u32,
}

impl RetryClock {
    pub fn new(interval: Duration, limit: u32) -> Self {
        Self {
            interval,
            limit,
            attempts: 0,
        }
    }

    /// Attempts dispensed so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The delay before the next attempt, or `None` when the limit is spent.
    pub fn next_wait(&mut self) -> Option<Duration> {
        if self.limit > 0 && self.attempts >= self.limit {
            return None;
        }
        self.attempts += 1;
        let wait = self.interval;
        if self.attempts % 10 == 0 {
            self.interval = self.interval.saturating_mul(2);
        }
        Some(wait)
    }
}
