//! Process-wide registry of active worker identities.
//!
//! The registry is a single comma-delimited slot in a [`GlobalStore`]. Every
//! read-modify-write happens under the store's global lock, so registrations
//! from any number of worker threads are linearized.

use std::sync::Arc;

use hive_core::types::REGISTRY_DELIMITER;
use hive_core::{HiveError, Result};
use tracing::{debug, error};

use crate::store::{GlobalStore, SystemProperties};

/// Slot holding the registered worker identities.
pub const WORKERS_KEY: &str = "hive.workers";

/// Registry of active workers.
#[derive(Clone)]
pub struct GlobalRegistry {
    store: Arc<dyn GlobalStore>,
    key: String,
}

impl std::fmt::Debug for GlobalRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalRegistry").field("key", &self.key).finish_non_exhaustive()
    }
}

impl GlobalRegistry {
    /// Registry over the given store.
    pub fn new(store: Arc<dyn GlobalStore>) -> Self {
        Self {
            store,
            key: WORKERS_KEY.to_string(),
        }
    }

    /// Registry over the process-wide [`SystemProperties`] table.
    pub fn system() -> Self {
        Self::new(SystemProperties::shared())
    }

    /// Use a different slot key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Run `f` while holding the process-wide lock.
    ///
    /// Registry operations called from inside `f` reuse the held lock.
    pub fn with_global_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.store.global_lock().lock();
        f()
    }

    /// All registered identities.
    pub fn list(&self) -> Result<Vec<String>> {
        self.with_global_lock(|| self.load())
            .map_err(|e| self.failure("list", &self.key, e))
    }

    /// Number of registered identities.
    pub fn len(&self) -> Result<usize> {
        self.list().map(|workers| workers.len())
    }

    /// Whether no identity is registered.
    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|len| len == 0)
    }

    /// Whether `identity` is registered.
    pub fn contains(&self, identity: &str) -> Result<bool> {
        self.list().map(|workers| workers.iter().any(|w| w == identity))
    }

    /// Add `identity`; registering twice leaves a single entry.
    pub fn register(&self, identity: &str) -> Result<()> {
        validate(identity)?;
        self.with_global_lock(|| {
            let mut workers = self.load()?;
            if workers.iter().any(|w| w == identity) {
                debug!(worker = identity, "already registered");
                return Ok(());
            }
            workers.push(identity.to_string());
            self.save(&workers)
        })
        .map_err(|e| self.failure("register", identity, e))
    }

    /// Remove `identity`, returning whether it was present.
    pub fn unregister(&self, identity: &str) -> Result<bool> {
        self.with_global_lock(|| {
            let mut workers = self.load()?;
            let before = workers.len();
            workers.retain(|w| w != identity);
            if workers.len() == before {
                return Ok(false);
            }
            self.save(&workers)?;
            Ok(true)
        })
        .map_err(|e| self.failure("unregister", identity, e))
    }

    fn load(&self) -> Result<Vec<String>> {
        let raw = self.store.get(&self.key)?.unwrap_or_default();
        let mut workers: Vec<String> = Vec::new();
        for worker in raw.split(REGISTRY_DELIMITER).filter(|w| !w.is_empty()) {
            if !workers.iter().any(|w| w == worker) {
                workers.push(worker.to_string());
            }
        }
        Ok(workers)
    }

    fn save(&self, workers: &[String]) -> Result<()> {
        if workers.is_empty() {
            self.store.clear(&self.key)
        } else {
            let delimiter = REGISTRY_DELIMITER.to_string();
            self.store.set(&self.key, &workers.join(&delimiter))
        }
    }

    fn failure(&self, operation: &str, identity: &str, source: HiveError) -> HiveError {
        // already wrapped by an inner call made under the same lock
        if matches!(source, HiveError::Registry { .. }) {
            return source;
        }
        error!(operation, worker = identity, key = %self.key, error = %source, "registry operation failed");
        HiveError::registry(operation, identity, source)
    }
}

fn validate(identity: &str) -> Result<()> {
    if identity.is_empty() {
        return Err(HiveError::invalid_identity(identity, "empty identity"));
    }
    if identity.contains(REGISTRY_DELIMITER) {
        return Err(HiveError::invalid_identity(
            identity,
            format!("contains registry delimiter {REGISTRY_DELIMITER:?}"),
        ));
    }
    Ok(())
}
