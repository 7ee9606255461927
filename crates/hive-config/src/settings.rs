//! Worker tuning settings and their process-wide defaults.

use std::sync::LazyLock;
use std::time::Duration;

use hive_core::{HiveError, Result};
use parking_lot::RwLock;

/// Default idle sleep between empty polls.
pub const DEFAULT_SLEEP_DELAY: Duration = Duration::from_secs(5);

/// Default number of jobs reserved per poll cycle.
pub const DEFAULT_READ_AHEAD: u32 = 5;

/// Effective tuning for one worker.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSettings {
    /// Lowest priority value the worker will reserve (lower runs first)
    pub min_priority: Option<i32>,
    /// Highest priority value the worker will reserve
    pub max_priority: Option<i32>,
    /// Base idle sleep after a poll that found no work
    pub sleep_delay: Duration,
    /// Jobs reserved and performed per poll cycle
    pub read_ahead: u32,
    /// Queues to reserve from; empty means all queues
    pub queues: Vec<String>,
    /// Stop after the first poll that finds no work
    pub exit_on_complete: Option<bool>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            min_priority: None,
            max_priority: None,
            sleep_delay: DEFAULT_SLEEP_DELAY,
            read_ahead: DEFAULT_READ_AHEAD,
            queues: Vec::new(),
            exit_on_complete: None,
        }
    }
}

impl WorkerSettings {
    /// Set the sleep delay.
    pub fn with_sleep_delay(mut self, sleep_delay: Duration) -> Self {
        self.sleep_delay = sleep_delay;
        self
    }

    /// Set the queues to work.
    pub fn with_queues<I, S>(mut self, queues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.queues = queues.into_iter().map(Into::into).collect();
        self
    }

    /// Set the accepted priority range.
    pub fn with_priority_range(mut self, min: Option<i32>, max: Option<i32>) -> Self {
        self.min_priority = min;
        self.max_priority = max;
        self
    }

    /// Set the read-ahead count.
    pub fn with_read_ahead(mut self, read_ahead: u32) -> Self {
        self.read_ahead = read_ahead;
        self
    }

    /// Set the exit-on-complete flag.
    pub fn with_exit_on_complete(mut self, exit: bool) -> Self {
        self.exit_on_complete = Some(exit);
        self
    }

    /// Whether a job with `priority` falls inside the configured range.
    pub fn accepts_priority(&self, priority: i32) -> bool {
        self.min_priority.is_none_or(|min| priority >= min)
            && self.max_priority.is_none_or(|max| priority <= max)
    }

    /// Whether a job on `queue` should be worked.
    pub fn accepts_queue(&self, queue: &str) -> bool {
        self.queues.is_empty() || self.queues.iter().any(|q| q == queue)
    }

    /// Check the settings for contradictions.
    pub fn validate(&self) -> Result<()> {
        if let (Some(min), Some(max)) = (self.min_priority, self.max_priority) {
            if min > max {
                return Err(HiveError::config_validation(
                    "min_priority",
                    format!("min_priority {min} is greater than max_priority {max}"),
                ));
            }
        }
        if self.read_ahead == 0 {
            return Err(HiveError::config_validation("read_ahead", "must be at least 1"));
        }
        Ok(())
    }
}

static DEFAULTS: LazyLock<RwLock<WorkerSettings>> =
    LazyLock::new(|| RwLock::new(WorkerSettings::default()));

/// Snapshot of the process-wide defaults.
pub fn defaults() -> WorkerSettings {
    DEFAULTS.read().clone()
}

/// Replace the process-wide defaults.
pub fn set_defaults(settings: WorkerSettings) {
    tracing::debug!(?settings, "worker defaults updated");
    *DEFAULTS.write() = settings;
}

/// Restore the built-in defaults.
pub fn reset_defaults() {
    *DEFAULTS.write() = WorkerSettings::default();
}
