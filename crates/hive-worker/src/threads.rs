//! Worker threads and the process-wide record of which ones are alive.
//!
//! Threads can only be enumerated from inside their own process, so hive
//! keeps its own set: every thread started by [`WorkerThreadFactory`] adds its
//! label on start and a drop guard removes it when the thread exits, panics
//! included.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use hive_core::{HiveError, Result};
use parking_lot::Mutex;
use tracing::debug;

use crate::identity::current_thread_label;

/// Marker contained in the name of every thread the factory creates.
pub const NAME_ID: &str = "hive-worker#";

static THREAD_COUNTER: AtomicUsize = AtomicUsize::new(1);

static LIVE_THREADS: LazyLock<Mutex<HashMap<String, usize>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Process-wide set of live, tracked thread labels.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadTracker;

impl ThreadTracker {
    /// Labels of every tracked thread that is still running.
    pub fn live_threads() -> HashSet<String> {
        LIVE_THREADS.lock().keys().cloned().collect()
    }

    /// Whether a tracked thread with `label` is running.
    pub fn is_live(label: &str) -> bool {
        LIVE_THREADS.lock().contains_key(label)
    }

    /// Track the calling thread until the returned guard drops.
    pub fn track_current() -> TrackedThread {
        let label = current_thread_label();
        *LIVE_THREADS.lock().entry(label.clone()).or_insert(0) += 1;
        TrackedThread { label }
    }
}

/// Keeps a thread in the live set while held.
#[derive(Debug)]
pub struct TrackedThread {
    label: String,
}

impl TrackedThread {
    /// The tracked thread's label.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Drop for TrackedThread {
    fn drop(&mut self) {
        let mut live = LIVE_THREADS.lock();
        if let Some(count) = live.get_mut(&self.label) {
            *count -= 1;
            if *count == 0 {
                live.remove(&self.label);
            }
        }
    }
}

/// Creates named, tracked worker threads.
#[derive(Debug, Clone, Default)]
pub struct WorkerThreadFactory {
    prefix: String,
}

impl WorkerThreadFactory {
    /// Factory naming threads `"<prefix>-hive-worker#<n>"` (no dash without a prefix).
    pub fn new(prefix: Option<&str>) -> Self {
        let prefix = match prefix {
            Some(p) if !p.is_empty() => format!("{p}-"),
            _ => String::new(),
        };
        Self { prefix }
    }

    /// Name for the next thread; the counter is shared by all factories.
    pub fn next_name(&self) -> String {
        format!("{}{NAME_ID}{}", self.prefix, THREAD_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Spawn `f` on a new tracked thread.
    pub fn spawn<F, T>(&self, f: F) -> Result<JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let name = self.next_name();
        debug!(thread = %name, "spawning worker thread");
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let _tracked = ThreadTracker::track_current();
                f()
            })
            .map_err(|source| HiveError::ThreadSpawn {
                thread_name: name,
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_thread_names_carry_prefix_and_marker() {
        let factory = WorkerThreadFactory::new(Some("mail"));
        let name = factory.next_name();
        assert!(name.starts_with("mail-hive-worker#"), "{name}");

        let bare = WorkerThreadFactory::new(None).next_name();
        assert!(bare.starts_with(NAME_ID), "{bare}");

        let empty = WorkerThreadFactory::new(Some("")).next_name();
        assert!(empty.starts_with(NAME_ID), "{empty}");
    }

    #[test]
    fn test_counter_is_monotonic() {
        let factory = WorkerThreadFactory::new(None);
        let n = |name: String| name.trim_start_matches(NAME_ID).parse::<usize>().unwrap();
        let first = n(factory.next_name());
        let second = n(factory.next_name());
        assert!(second > first);
    }

    #[test]
    fn test_spawned_thread_is_live_until_it_exits() {
        let factory = WorkerThreadFactory::new(Some("tracked"));
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (label_tx, label_rx) = mpsc::channel();

        let handle = factory
            .spawn(move || {
                label_tx.send(current_thread_label()).unwrap();
                release_rx.recv().unwrap();
            })
            .unwrap();

        let label = label_rx.recv().unwrap();
        assert!(ThreadTracker::is_live(&label));
        assert!(ThreadTracker::live_threads().contains(&label));

        release_tx.send(()).unwrap();
        handle.join().unwrap();
        assert!(!ThreadTracker::is_live(&label));
    }

    #[test]
    fn test_panicking_thread_is_untracked() {
        let factory = WorkerThreadFactory::new(Some("panics"));
        let (label_tx, label_rx) = mpsc::channel();
        let handle = factory
            .spawn(move || {
                label_tx.send(current_thread_label()).unwrap();
                panic!("worker blew up");
            })
            .unwrap();
        let label = label_rx.recv().unwrap();
        assert!(handle.join().is_err());
        assert!(!ThreadTracker::is_live(&label));
    }

    #[test]
    fn test_track_current_guard() {
        let label = std::thread::Builder::new()
            .name("host-thread-xyz".into())
            .spawn(|| {
                let guard = ThreadTracker::track_current();
                assert!(ThreadTracker::is_live(guard.label()));
                let label = guard.label().to_string();
                drop(guard);
                assert!(!ThreadTracker::is_live(&label));
                label
            })
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(label, "host-thread-xyz");
    }
}
