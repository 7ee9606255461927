//! Pruning of registry entries left behind by dead workers.
//!
//! Each entry is parsed back into host, pid and thread. Entries of other hosts
//! are never touched. An entry of this process whose thread is not in the live
//! thread set is dead: threads can only be enumerated locally, so absence is
//! conclusive. An entry of another process on this host is removed only when
//! that pid is no longer running; a live foreign pid may be a legitimate
//! sibling worker process.

use std::collections::HashSet;
use std::sync::Arc;

use hive_core::Result;
use sysinfo::{ProcessesToUpdate, System};
use tracing::{debug, info};

use crate::identity::{ParsedIdentity, local_host};
use crate::registry::GlobalRegistry;
use crate::threads::ThreadTracker;

/// Enumerates live thread labels of this process.
pub trait LiveThreads: Send + Sync {
    fn live_threads(&self) -> HashSet<String>;
}

impl LiveThreads for ThreadTracker {
    fn live_threads(&self) -> HashSet<String> {
        ThreadTracker::live_threads()
    }
}

/// Enumerates live OS process ids on this host.
pub trait LiveProcesses: Send + Sync {
    fn live_pids(&self) -> HashSet<u32>;
}

/// Process table read through `sysinfo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcesses;

impl LiveProcesses for SystemProcesses {
    fn live_pids(&self) -> HashSet<u32> {
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);
        system.processes().keys().map(|pid| pid.as_u32()).collect()
    }
}

/// Removes registry entries of workers that are no longer alive.
#[derive(Clone)]
pub struct DeadWorkerReconciler {
    registry: GlobalRegistry,
    host: Option<String>,
    pid: u32,
    threads: Arc<dyn LiveThreads>,
    processes: Arc<dyn LiveProcesses>,
}

impl DeadWorkerReconciler {
    /// Reconciler for this host and process.
    pub fn new(registry: GlobalRegistry) -> Self {
        Self {
            registry,
            host: local_host(),
            pid: std::process::id(),
            threads: Arc::new(ThreadTracker),
            processes: Arc::new(SystemProcesses),
        }
    }

    /// Treat `host` as the local host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Treat `pid` as this process.
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    /// Use a different live-thread source.
    pub fn with_threads(mut self, threads: Arc<dyn LiveThreads>) -> Self {
        self.threads = threads;
        self
    }

    /// Use a different live-process source.
    pub fn with_processes(mut self, processes: Arc<dyn LiveProcesses>) -> Self {
        self.processes = processes;
        self
    }

    /// Prune using the configured live-thread and live-process sources.
    ///
    /// Returns the identities removed.
    pub fn prune_dead_workers(&self) -> Result<Vec<String>> {
        self.registry.with_global_lock(|| {
            if self.registry.is_empty()? {
                return Ok(Vec::new());
            }
            let live_threads = self.threads.live_threads();
            let live_pids = self.processes.live_pids();
            self.prune(&live_threads, &live_pids)
        })
    }

    /// Prune against explicit live sets.
    pub fn prune(&self, live_threads: &HashSet<String>, live_pids: &HashSet<u32>) -> Result<Vec<String>> {
        let Some(host) = self.host.as_deref() else {
            debug!("local host unknown, skipping prune");
            return Ok(Vec::new());
        };

        self.registry.with_global_lock(|| {
            let mut pruned = Vec::new();
            for worker in self.registry.list()? {
                let Some(parsed) = ParsedIdentity::parse(&worker) else {
                    debug!(worker = %worker, "unparseable registry entry left in place");
                    continue;
                };
                if parsed.host != host {
                    continue;
                }
                if self.is_dead(&parsed, live_threads, live_pids) {
                    info!(worker = %worker, "Pruning dead worker");
                    self.registry.unregister(&worker)?;
                    pruned.push(worker);
                }
            }
            Ok(pruned)
        })
    }

    fn is_dead(&self, parsed: &ParsedIdentity, live_threads: &HashSet<String>, live_pids: &HashSet<u32>) -> bool {
        if parsed.pid == self.pid {
            !live_threads.contains(&parsed.thread)
        } else {
            !live_pids.contains(&parsed.pid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::compose;
    use crate::store::SystemProperties;

    const HOST: &str = "box";
    const OWN_PID: u32 = 100;
    const SIBLING_PID: u32 = 200;
    const DEAD_PID: u32 = 99_999;

    struct FixedThreads(HashSet<String>);
    impl LiveThreads for FixedThreads {
        fn live_threads(&self) -> HashSet<String> {
            self.0.clone()
        }
    }

    struct FixedPids(HashSet<u32>);
    impl LiveProcesses for FixedPids {
        fn live_pids(&self) -> HashSet<u32> {
            self.0.clone()
        }
    }

    fn setup() -> (GlobalRegistry, DeadWorkerReconciler) {
        let registry = GlobalRegistry::new(Arc::new(SystemProperties::new()));
        let reconciler = DeadWorkerReconciler::new(registry.clone())
            .with_host(HOST)
            .with_pid(OWN_PID)
            .with_threads(Arc::new(FixedThreads(["hive-worker#1".to_string()].into())))
            .with_processes(Arc::new(FixedPids([OWN_PID, SIBLING_PID].into())));
        (registry, reconciler)
    }

    #[test]
    fn test_prunes_local_entry_with_dead_thread() {
        let (registry, reconciler) = setup();
        let dead = compose("", Some(HOST), OWN_PID, "hive-worker#666");
        let live = compose("", Some(HOST), OWN_PID, "hive-worker#1");
        registry.register(&dead).unwrap();
        registry.register(&live).unwrap();

        let pruned = reconciler.prune_dead_workers().unwrap();
        assert_eq!(pruned, vec![dead]);
        assert_eq!(registry.list().unwrap(), vec![live]);
    }

    #[test]
    fn test_prunes_entry_of_dead_process() {
        let (registry, reconciler) = setup();
        let dead = compose("", Some(HOST), DEAD_PID, "main");
        registry.register(&dead).unwrap();

        assert_eq!(reconciler.prune_dead_workers().unwrap(), vec![dead]);
        assert!(registry.is_empty().unwrap());
    }

    #[test]
    fn test_keeps_entry_of_live_sibling_process() {
        let (registry, reconciler) = setup();
        // thread unknown locally, but the pid is someone else's live process
        let sibling = compose("", Some(HOST), SIBLING_PID, "hive-worker#666");
        registry.register(&sibling).unwrap();

        assert!(reconciler.prune_dead_workers().unwrap().is_empty());
        assert_eq!(registry.list().unwrap(), vec![sibling]);
    }

    #[test]
    fn test_never_touches_other_hosts() {
        let (registry, reconciler) = setup();
        let remote = compose("", Some("SomeHostName"), DEAD_PID, "gone");
        registry.register(&remote).unwrap();

        assert!(reconciler.prune_dead_workers().unwrap().is_empty());
        assert!(registry.contains(&remote).unwrap());
    }

    #[test]
    fn test_keeps_unparseable_entries() {
        let (registry, reconciler) = setup();
        registry.register("foo-bar").unwrap();
        registry.register(&compose("", None, OWN_PID, "gone")).unwrap();

        assert!(reconciler.prune_dead_workers().unwrap().is_empty());
        assert_eq!(registry.len().unwrap(), 2);
    }

    #[test]
    fn test_prune_with_explicit_sets() {
        let (registry, reconciler) = setup();
        let a = compose("PREFIX ", Some(HOST), OWN_PID, "a");
        let b = compose("", Some(HOST), OWN_PID, "b");
        registry.register(&a).unwrap();
        registry.register(&b).unwrap();

        let pruned = reconciler.prune(&["a".to_string()].into(), &HashSet::new()).unwrap();
        assert_eq!(pruned, vec![b]);
        assert_eq!(registry.list().unwrap(), vec![a]);
    }

    #[test]
    fn test_unknown_local_host_prunes_nothing() {
        let (registry, reconciler) = setup();
        let reconciler = DeadWorkerReconciler {
            host: None,
            ..reconciler
        };
        registry.register(&compose("", Some(HOST), DEAD_PID, "t")).unwrap();
        assert!(reconciler.prune_dead_workers().unwrap().is_empty());
    }

    #[test]
    fn test_system_processes_includes_self() {
        assert!(SystemProcesses.live_pids().contains(&std::process::id()));
    }
}
