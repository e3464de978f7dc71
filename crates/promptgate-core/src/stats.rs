//! Call tracking: monotonic counters plus the consecutive-failure counter
//! that drives automatic offline fallback.
//!
//! The tracker is shared between the retry loop (which records per-attempt
//! outcomes) and the scheduler (which reads snapshots and resets), so it uses
//! interior mutability with atomics.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::types::CallStats;

/// Shared call counters and the fallback trigger.
///
/// `record_failure` / `record_rate_limited` return `true` exactly when this
/// call pushed the consecutive-failure counter across the fallback threshold.
/// The caller is expected to switch to offline mode on `true`; the counter
/// keeps climbing afterwards so the trigger fires at most once per streak.
#[derive(Debug)]
pub struct CallTracker {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    rate_limited: AtomicU64,
    consecutive_failures: AtomicU32,
    fallback_threshold: u32,
    last_reset: Mutex<chrono::DateTime<chrono::Utc>>,
}

impl CallTracker {
    /// Create a tracker that triggers fallback after `fallback_threshold`
    /// consecutive failed or rate-limited calls.
    pub fn new(fallback_threshold: u32) -> Self {
        CallTracker {
            total: AtomicU64::new(0),
            successful: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
            fallback_threshold,
            last_reset: Mutex::new(chrono::Utc::now()),
        }
    }

    /// Record that an attempt was started.
    pub fn record_attempt(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful call. Zeroes the consecutive-failure counter.
    pub fn record_success(&self) {
        self.successful.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    /// Record a non-rate-limit failure. Returns `true` if this call crossed
    /// the fallback threshold.
    pub fn record_failure(&self) -> bool {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.bump_consecutive()
    }

    /// Record a rate-limited call. Returns `true` if this call crossed the
    /// fallback threshold.
    pub fn record_rate_limited(&self) -> bool {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
        self.bump_consecutive()
    }

    fn bump_consecutive(&self) -> bool {
        let streak = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if streak == self.fallback_threshold {
            tracing::warn!(
                streak,
                threshold = self.fallback_threshold,
                "consecutive failure threshold crossed"
            );
            true
        } else {
            false
        }
    }

    /// Current consecutive-failure streak.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Zero the consecutive-failure streak without touching the counters.
    pub fn clear_consecutive(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    /// Snapshot of the counters.
    pub fn snapshot(&self) -> CallStats {
        CallStats {
            total: self.total.load(Ordering::Relaxed),
            successful: self.successful.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            last_reset: *self.last_reset.lock().expect("stats lock poisoned"),
        }
    }

    /// Zero every counter and stamp a new reset time.
    pub fn reset(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.successful.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.rate_limited.store(0, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        *self.last_reset.lock().expect("stats lock poisoned") = chrono::Utc::now();
        tracing::debug!("call statistics reset");
    }
}
