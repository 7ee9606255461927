//! Idle-sleep staggering across worker threads.
//!
//! Workers that find the queue empty all want to sleep for the same interval.
//! Left alone they drift into lockstep and poll the backend in bursts. Each
//! sleeping worker swaps a shared "last wake" timestamp; when it finds that
//! another worker woke less than `interval / workers` ago, it stretches its
//! own sleep slightly. Repeated over idle cycles the wake-ups spread out to
//! roughly even spacing.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::Utc;

/// Fraction of the spacing error corrected per cycle is `1 / DEFAULT_DAMPING`.
pub const DEFAULT_DAMPING: f64 = 5.0;

/// Largest correction, as a fraction of the requested interval.
pub const DEFAULT_MAX_CORRECTION: f64 = 0.1;

static SHARED: LazyLock<Arc<AdaptiveBackoff>> = LazyLock::new(|| Arc::new(AdaptiveBackoff::new()));

/// Computes staggered idle sleeps for concurrently polling workers.
#[derive(Debug)]
pub struct AdaptiveBackoff {
    last_wake_ms: AtomicI64,
    damping: f64,
    max_correction: f64,
}

impl Default for AdaptiveBackoff {
    fn default() -> Self {
        Self::new()
    }
}

impl AdaptiveBackoff {
    pub fn new() -> Self {
        Self::with_tuning(DEFAULT_DAMPING, DEFAULT_MAX_CORRECTION)
    }

    /// Calculator with custom damping and correction cap.
    pub fn with_tuning(damping: f64, max_correction: f64) -> Self {
        Self {
            last_wake_ms: AtomicI64::new(0),
            damping: damping.max(1.0),
            max_correction: max_correction.max(0.0),
        }
    }

    /// The calculator shared by every worker in the process.
    pub fn shared() -> Arc<AdaptiveBackoff> {
        Arc::clone(&SHARED)
    }

    /// How long a worker should sleep when it asked for `requested` and
    /// `active_workers` workers are polling.
    pub fn sleep_for(&self, requested: Duration, active_workers: usize) -> Duration {
        self.sleep_for_at(requested, active_workers, Utc::now().timestamp_millis())
    }

    /// [`sleep_for`](Self::sleep_for) with an explicit clock reading in epoch milliseconds.
    pub fn sleep_for_at(&self, requested: Duration, active_workers: usize, now_ms: i64) -> Duration {
        if active_workers <= 1 || requested.is_zero() {
            return requested;
        }

        let last = self.last_wake_ms.swap(now_ms, Ordering::AcqRel);
        let elapsed_ms = now_ms.saturating_sub(last).max(0);
        let requested_ms = i64::try_from(requested.as_millis()).unwrap_or(i64::MAX);
        if elapsed_ms > requested_ms {
            return requested;
        }

        let ideal_ms = requested_ms as f64 / active_workers as f64;
        let diff_ms = ideal_ms - elapsed_ms as f64;
        if diff_ms <= 0.0 {
            return requested;
        }

        let correction_ms = (diff_ms / self.damping).min(requested_ms as f64 * self.max_correction);
        requested + Duration::from_millis(correction_ms as u64)
    }
}
