//! Integration tests for workers sharing one process.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hive_config::{ManagerConfig, OptionValue, WorkerOption};
use hive_worker::identity::{compose, local_host};
use hive_worker::{
    DeadWorkerReconciler, GlobalRegistry, Lifecycle, LifecycleEvent, LiveProcesses, MemoryQueue, SystemProperties,
    Worker, WorkerControl, WorkerManager,
};
use parking_lot::Mutex;
use proptest::prelude::*;
use rand::Rng;

fn isolated_registry() -> GlobalRegistry {
    GlobalRegistry::new(Arc::new(SystemProperties::new()))
}

struct NoProcesses;

impl LiveProcesses for NoProcesses {
    fn live_pids(&self) -> HashSet<u32> {
        HashSet::new()
    }
}

#[test]
fn test_registry_size_over_worker_life() {
    let registry = isolated_registry();
    let sizes = Arc::new(Mutex::new(vec![registry.len().unwrap()]));
    let control: Arc<Mutex<Option<WorkerControl>>> = Arc::new(Mutex::new(None));

    let lifecycle = Arc::new(Lifecycle::new());
    let (reg, log) = (registry.clone(), Arc::clone(&sizes));
    lifecycle.before(LifecycleEvent::Execute, move |_| log.lock().push(reg.len().unwrap()));

    let (reg, log, stop) = (registry.clone(), Arc::clone(&sizes), Arc::clone(&control));
    let queue = Arc::new(MemoryQueue::new(move |_| {
        log.lock().push(reg.len().unwrap());
        if let Some(control) = stop.lock().as_ref() {
            control.stop();
        }
        Ok(())
    }));
    queue.enqueue("default", 0, "only job");

    let mut worker = Worker::new(Arc::clone(&queue))
        .with_registry(registry.clone())
        .with_lifecycle(lifecycle);
    *control.lock() = Some(worker.control());

    let summary = worker.run().unwrap();
    sizes.lock().push(registry.len().unwrap());

    assert_eq!(summary.jobs.succeeded, 1);
    assert_eq!(*sizes.lock(), vec![0, 1, 1, 0]);
}

#[test]
fn test_startup_prunes_dead_local_workers() {
    let host = local_host().expect("test host has a name");
    let pid = std::process::id();
    let registry = isolated_registry();

    let dead_thread = compose("", Some(&host), pid, "hive-worker#999999");
    let dead_process = compose("", Some(&host), u32::MAX, "main");
    let remote = compose("", Some("elsewhere.example"), u32::MAX, "main");
    for entry in [&dead_thread, &dead_process, &remote] {
        registry.register(entry).unwrap();
    }

    let reconciler = DeadWorkerReconciler::new(registry.clone()).with_processes(Arc::new(NoProcesses));
    let mut worker = Worker::new(MemoryQueue::default())
        .with_registry(registry.clone())
        .with_reconciler(reconciler)
        .with_lifecycle(Arc::new(Lifecycle::new()))
        .with_override(WorkerOption::ExitOnComplete, OptionValue::Flag(Some(true)));

    worker.run().unwrap();
    assert_eq!(registry.list().unwrap(), vec![remote]);
}

#[test]
fn test_overrides_stay_on_their_worker_thread() {
    let queue_names = ["mail", "video", "reports"];
    let seen: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&seen);
    let queue = Arc::new(MemoryQueue::new(move |job| {
        let thread = thread::current().name().unwrap_or_default().to_string();
        log.lock().push((thread, job.queue.clone()));
        Ok(())
    }));
    for name in queue_names {
        for i in 0..4 {
            queue.enqueue(name, i, format!("{name} {i}"));
        }
    }

    let registry = isolated_registry();
    let mut manager = WorkerManager::new(ManagerConfig {
        thread_count: queue_names.len(),
        thread_prefix: Some("overlay".into()),
        skip: false,
    });
    manager
        .startup(|index| {
            Worker::new(Arc::clone(&queue))
                .with_registry(registry.clone())
                .with_lifecycle(Arc::new(Lifecycle::new()))
                .with_override(WorkerOption::Queues, OptionValue::Queues(vec![queue_names[index].into()]))
                .with_override(WorkerOption::ExitOnComplete, OptionValue::Flag(Some(true)))
        })
        .unwrap();

    let expected: HashMap<String, &str> = manager.thread_names().into_iter().zip(queue_names).collect();
    manager.shutdown().unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 12);
    for (thread, queue) in seen.iter() {
        assert_eq!(expected[thread], queue.as_str(), "{thread} worked {queue}");
    }
    assert!(hive_config::defaults().queues.is_empty());
    assert!(registry.is_empty().unwrap());
}

#[test]
fn test_stop_is_idempotent_across_handles() {
    let registry = isolated_registry();
    let mut worker = Worker::new(MemoryQueue::default())
        .with_registry(registry.clone())
        .with_lifecycle(Arc::new(Lifecycle::new()))
        .with_override(WorkerOption::SleepDelay, OptionValue::Duration(Duration::from_secs(30)));
    let first = worker.control();
    let second = worker.control();

    let handle = thread::spawn(move || worker.run());
    while registry.is_empty().unwrap() {
        thread::sleep(Duration::from_millis(5));
    }
    first.stop();
    second.stop();
    first.stop();

    let summary = handle.join().unwrap().unwrap();
    assert_eq!(summary.jobs.total(), 0);
    assert!(registry.is_empty().unwrap());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_concurrent_registration_keeps_every_entry(threads in 2usize..24) {
        let registry = isolated_registry();
        let handles: Vec<_> = (0..threads)
            .map(|i| {
                let registry = registry.clone();
                thread::spawn(move || {
                    let delay = rand::rng().random_range(0..3);
                    thread::sleep(Duration::from_millis(delay));
                    registry.register(&format!("host:box pid:1 thread:t{i}")).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let workers = registry.list().unwrap();
        prop_assert_eq!(workers.len(), threads);
        let unique: HashSet<_> = workers.iter().collect();
        prop_assert_eq!(unique.len(), threads);
    }
}
