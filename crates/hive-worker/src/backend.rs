//! Job backends polled by workers.
//!
//! A backend hands out jobs one at a time to a named worker, runs them, and
//! releases whatever that worker still holds when it stops.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use hive_config::WorkerSettings;
use hive_core::types::JobId;
use hive_core::{HiveError, Result};
use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// A queue of jobs that workers reserve and perform.
pub trait JobBackend: Send + Sync + 'static {
    type Job: Send + fmt::Debug;

    /// Lock the next job `worker` may run under `settings`, if any.
    fn reserve(&self, worker: &str, settings: &WorkerSettings) -> Result<Option<Self::Job>>;

    /// Run a reserved job.
    fn perform(&self, worker: &str, job: Self::Job) -> Result<()>;

    /// Release every job still locked by `worker`.
    fn clear_locks(&self, _worker: &str) -> Result<()> {
        Ok(())
    }
}

impl<B: JobBackend> JobBackend for Arc<B> {
    type Job = B::Job;

    fn reserve(&self, worker: &str, settings: &WorkerSettings) -> Result<Option<Self::Job>> {
        (**self).reserve(worker, settings)
    }

    fn perform(&self, worker: &str, job: Self::Job) -> Result<()> {
        (**self).perform(worker, job)
    }

    fn clear_locks(&self, worker: &str) -> Result<()> {
        (**self).clear_locks(worker)
    }
}

/// A job held by [`MemoryQueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryJob {
    pub id: JobId,
    pub queue: String,
    /// Lower runs first.
    pub priority: i32,
    pub payload: String,
}

/// Runs a [`MemoryJob`]; an `Err` marks the job failed.
pub type JobHandler = Arc<dyn Fn(&MemoryJob) -> std::result::Result<(), String> + Send + Sync>;

#[derive(Debug)]
struct QueuedJob {
    job: MemoryJob,
    seq: u64,
    locked_by: Option<String>,
}

/// In-process job queue.
///
/// Jobs are ordered by priority, then by enqueue order. Finished jobs,
/// failed or not, leave the queue.
pub struct MemoryQueue {
    jobs: Mutex<Vec<QueuedJob>>,
    next_seq: AtomicU64,
    handler: JobHandler,
    performed: AtomicUsize,
    failed: AtomicUsize,
}

impl fmt::Debug for MemoryQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryQueue")
            .field("jobs", &self.jobs.lock().len())
            .field("performed", &self.performed())
            .field("failed", &self.failed())
            .finish()
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(|_| Ok(()))
    }
}

impl MemoryQueue {
    /// Queue running jobs with `handler`.
    pub fn new(handler: impl Fn(&MemoryJob) -> std::result::Result<(), String> + Send + Sync + 'static) -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            next_seq: AtomicU64::new(0),
            handler: Arc::new(handler),
            performed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    /// Add a job and return its id.
    pub fn enqueue(&self, queue: impl Into<String>, priority: i32, payload: impl Into<String>) -> JobId {
        let job = MemoryJob {
            id: Uuid::new_v4().to_string(),
            queue: queue.into(),
            priority,
            payload: payload.into(),
        };
        let id = job.id.clone();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.jobs.lock().push(QueuedJob {
            job,
            seq,
            locked_by: None,
        });
        id
    }

    /// Jobs waiting to be reserved.
    pub fn pending(&self) -> usize {
        self.jobs.lock().iter().filter(|q| q.locked_by.is_none()).count()
    }

    /// Jobs reserved but not yet finished.
    pub fn locked(&self) -> usize {
        self.jobs.lock().iter().filter(|q| q.locked_by.is_some()).count()
    }

    /// Jobs that finished successfully.
    pub fn performed(&self) -> usize {
        self.performed.load(Ordering::Relaxed)
    }

    /// Jobs whose handler returned an error.
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    fn finish(&self, id: &str) {
        self.jobs.lock().retain(|q| q.job.id != id);
    }
}

impl JobBackend for MemoryQueue {
    type Job = MemoryJob;

    fn reserve(&self, worker: &str, settings: &WorkerSettings) -> Result<Option<MemoryJob>> {
        let mut jobs = self.jobs.lock();
        let next = jobs
            .iter_mut()
            .filter(|q| q.locked_by.is_none())
            .filter(|q| settings.accepts_queue(&q.job.queue) && settings.accepts_priority(q.job.priority))
            .min_by_key(|q| (q.job.priority, q.seq));

        Ok(next.map(|q| {
            q.locked_by = Some(worker.to_string());
            debug!(worker, job = %q.job.id, queue = %q.job.queue, "reserved job");
            q.job.clone()
        }))
    }

    fn perform(&self, worker: &str, job: MemoryJob) -> Result<()> {
        let outcome = (self.handler)(&job);
        self.finish(&job.id);
        match outcome {
            Ok(()) => {
                self.performed.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(message) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(worker, job = %job.id, error = %message, "job failed");
                Err(HiveError::job_failed(job.id, message))
            }
        }
    }

    fn clear_locks(&self, worker: &str) -> Result<()> {
        let mut released = 0;
        for queued in self.jobs.lock().iter_mut() {
            if queued.locked_by.as_deref() == Some(worker) {
                queued.locked_by = None;
                released += 1;
            }
        }
        if released > 0 {
            debug!(worker, released, "released job locks");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> WorkerSettings {
        WorkerSettings::default()
    }

    #[test]
    fn test_reserve_orders_by_priority_then_fifo() {
        let queue = MemoryQueue::default();
        let low = queue.enqueue("default", 10, "low");
        let first = queue.enqueue("default", 0, "first");
        let second = queue.enqueue("default", 0, "second");

        let order: Vec<String> = (0..3)
            .map(|_| queue.reserve("w", &settings()).unwrap().unwrap().id)
            .collect();
        assert_eq!(order, vec![first, second, low]);
        assert!(queue.reserve("w", &settings()).unwrap().is_none());
    }

    #[test]
    fn test_reserve_honors_queues_and_priority_range() {
        let queue = MemoryQueue::default();
        queue.enqueue("mail", 1, "m");
        queue.enqueue("video", 50, "v");
        let tracked = queue.enqueue("video", 5, "v2");

        let settings = settings().with_queues(["video"]).with_priority_range(Some(0), Some(10));
        let job = queue.reserve("w", &settings).unwrap().unwrap();
        assert_eq!(job.id, tracked);
        assert!(queue.reserve("w", &settings).unwrap().is_none());
    }

    #[test]
    fn test_reserved_jobs_are_not_handed_out_twice() {
        let queue = MemoryQueue::default();
        queue.enqueue("default", 0, "only");
        assert!(queue.reserve("a", &settings()).unwrap().is_some());
        assert!(queue.reserve("b", &settings()).unwrap().is_none());
        assert_eq!(queue.locked(), 1);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_perform_counts_outcomes() {
        let queue = MemoryQueue::new(|job| {
            if job.payload == "boom" {
                Err("exploded".to_string())
            } else {
                Ok(())
            }
        });
        queue.enqueue("default", 0, "ok");
        queue.enqueue("default", 1, "boom");

        let ok = queue.reserve("w", &settings()).unwrap().unwrap();
        queue.perform("w", ok).unwrap();
        let bad = queue.reserve("w", &settings()).unwrap().unwrap();
        let err = queue.perform("w", bad).unwrap_err();

        assert!(matches!(err, HiveError::JobFailed { .. }));
        assert_eq!((queue.performed(), queue.failed()), (1, 1));
        assert_eq!(queue.pending() + queue.locked(), 0);
    }

    #[test]
    fn test_clear_locks_releases_only_that_worker() {
        let queue = MemoryQueue::default();
        queue.enqueue("default", 0, "a");
        queue.enqueue("default", 0, "b");
        queue.reserve("w1", &settings()).unwrap();
        queue.reserve("w2", &settings()).unwrap();

        queue.clear_locks("w1").unwrap();
        assert_eq!(queue.pending(), 1);
        assert_eq!(queue.locked(), 1);
    }

    #[test]
    fn test_job_ids_are_unique() {
        let queue = MemoryQueue::default();
        let a = queue.enqueue("q", 0, "");
        let b = queue.enqueue("q", 0, "");
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }
}
