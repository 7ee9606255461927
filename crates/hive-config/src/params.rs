//! Parameter resolution: explicit parameters first, then the environment.
//!
//! A host may hand the manager a set of named parameters (for example the
//! init params of a container). Lookups consult that map, then the process
//! environment, and remember the answer so every worker sees the same value.

use std::collections::HashMap;
use std::time::Duration;

use hive_core::{HiveError, Result};
use parking_lot::Mutex;

pub const THREAD_COUNT_KEY: &str = "HIVE_THREAD_COUNT";
pub const THREAD_PREFIX_KEY: &str = "HIVE_THREAD_PREFIX";
pub const SKIP_KEY: &str = "HIVE_SKIP";
pub const QUEUES_KEY: &str = "QUEUES";
pub const QUEUE_KEY: &str = "QUEUE";
pub const MIN_PRIORITY_KEY: &str = "MIN_PRIORITY";
pub const MAX_PRIORITY_KEY: &str = "MAX_PRIORITY";
pub const SLEEP_DELAY_KEY: &str = "SLEEP_DELAY";
pub const READ_AHEAD_KEY: &str = "READ_AHEAD";
pub const EXIT_ON_COMPLETE_KEY: &str = "EXIT_ON_COMPLETE";

/// Named parameters with an environment fallback.
#[derive(Debug, Default)]
pub struct Parameters {
    explicit: HashMap<String, String>,
    resolved: Mutex<HashMap<String, Option<String>>>,
}

impl Parameters {
    /// Parameters backed only by the environment.
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Add an explicit parameter, which wins over the environment.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.explicit.insert(key.into(), value.into());
        self
    }

    /// Resolve `key`, caching the result (including absence).
    pub fn get(&self, key: &str) -> Option<String> {
        let mut resolved = self.resolved.lock();
        if let Some(value) = resolved.get(key) {
            return value.clone();
        }
        let value = self
            .explicit
            .get(key)
            .cloned()
            .or_else(|| std::env::var(key).ok());
        resolved.insert(key.to_string(), value.clone());
        value
    }

    /// Resolve `key` and parse it, naming the key on failure.
    pub fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map(|raw| {
                raw.trim()
                    .parse::<T>()
                    .map_err(|e| HiveError::config_validation(key, format!("{raw:?}: {e}")))
            })
            .transpose()
    }

    /// Resolve a boolean; accepts `true/false/1/0/yes/no`.
    pub fn flag(&self, key: &str) -> Result<Option<bool>> {
        self.get(key)
            .map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(true),
                "false" | "0" | "no" | "" => Ok(false),
                other => Err(HiveError::config_validation(key, format!("{other:?} is not a boolean"))),
            })
            .transpose()
    }

    /// Queue list from `QUEUES`, falling back to `QUEUE`.
    pub fn queues(&self) -> Option<Vec<String>> {
        self.get(QUEUES_KEY)
            .or_else(|| self.get(QUEUE_KEY))
            .map(|raw| split_queues(&raw))
    }
}

/// Split a comma separated queue list, dropping blanks.
pub fn split_queues(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(String::from)
        .collect()
}

/// Parse `"2.5"` (seconds) or `"500ms"` / `"1m 30s"` into a duration.
pub fn parse_sleep_delay(raw: &str) -> std::result::Result<Duration, String> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<f64>() {
        return Duration::try_from_secs_f64(secs).map_err(|e| format!("{raw:?}: {e}"));
    }
    humantime::parse_duration(raw).map_err(|e| format!("{raw:?}: {e}"))
}
