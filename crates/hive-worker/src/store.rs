//! Process-wide key/value slots backing the worker registry.
//!
//! Anything that hosts workers in one process must expose a slot table that
//! every worker sees, plus a process-wide lock for read-modify-write
//! sequences. [`SystemProperties`] is the built-in table; hosts with their own
//! shared attribute map implement [`GlobalStore`] over it.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use hive_core::Result;
use parking_lot::{Mutex, ReentrantMutex};

/// A process-wide key/value slot table with a global lock.
pub trait GlobalStore: Send + Sync {
    /// Read a slot.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a slot.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a slot.
    fn clear(&self, key: &str) -> Result<()>;

    /// Lock serializing composite operations across the whole process.
    ///
    /// Reentrant, so a holder may call operations that take it again.
    fn global_lock(&self) -> &ReentrantMutex<()>;
}

/// In-process slot table.
#[derive(Debug)]
pub struct SystemProperties {
    values: Mutex<HashMap<String, String>>,
    lock: ReentrantMutex<()>,
}

static SYSTEM: LazyLock<Arc<SystemProperties>> = LazyLock::new(|| Arc::new(SystemProperties::new()));

impl SystemProperties {
    /// A private table, detached from the process-wide one.
    pub fn new() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            lock: ReentrantMutex::new(()),
        }
    }

    /// The table shared by the whole process.
    pub fn shared() -> Arc<SystemProperties> {
        Arc::clone(&SYSTEM)
    }
}

impl Default for SystemProperties {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalStore for SystemProperties {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<()> {
        self.values.lock().remove(key);
        Ok(())
    }

    fn global_lock(&self) -> &ReentrantMutex<()> {
        &self.lock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_clear() {
        let store = SystemProperties::new();
        assert_eq!(store.get("k").unwrap(), None);

        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));

        store.clear("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_shared_table_is_one_instance() {
        assert!(Arc::ptr_eq(&SystemProperties::shared(), &SystemProperties::shared()));
        assert!(!Arc::ptr_eq(&SystemProperties::shared(), &Arc::new(SystemProperties::new())));
    }

    #[test]
    fn test_global_lock_is_reentrant() {
        let store = SystemProperties::new();
        let _outer = store.global_lock().lock();
        let _inner = store.global_lock().lock();
        store.set("k", "v").unwrap();
    }
}
