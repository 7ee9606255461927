//! Starting and stopping a pool of worker threads.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;

use hive_config::ManagerConfig;
use hive_core::{HiveError, Result};
use tracing::{error, info, warn};

use crate::backend::JobBackend;
use crate::threads::WorkerThreadFactory;
use crate::worker::{WorkSummary, Worker, WorkerControl};

/// Gives back one active-worker slot when dropped, unwinding included.
struct ActiveSlot(Arc<AtomicUsize>);

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct RunningWorker {
    thread_name: String,
    control: WorkerControl,
    handle: JoinHandle<Result<WorkSummary>>,
}

/// Runs `thread_count` workers on named, tracked threads.
pub struct WorkerManager {
    config: ManagerConfig,
    factory: WorkerThreadFactory,
    active: Arc<AtomicUsize>,
    workers: Vec<RunningWorker>,
}

impl std::fmt::Debug for WorkerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerManager")
            .field("config", &self.config)
            .field("running", &self.workers.len())
            .field("active", &self.active.load(Ordering::Relaxed))
            .finish()
    }
}

impl WorkerManager {
    pub fn new(config: ManagerConfig) -> Self {
        let factory = WorkerThreadFactory::new(config.thread_prefix.as_deref());
        Self {
            config,
            factory,
            active: Arc::new(AtomicUsize::new(0)),
            workers: Vec::new(),
        }
    }

    /// Configured number of worker threads.
    pub fn thread_count(&self) -> usize {
        self.config.thread_count
    }

    /// Workers whose `run` has not returned yet.
    pub fn active_workers(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Stop handles of the started workers.
    pub fn controls(&self) -> Vec<WorkerControl> {
        self.workers.iter().map(|w| w.control.clone()).collect()
    }

    /// Thread names of the started workers.
    pub fn thread_names(&self) -> Vec<String> {
        self.workers.iter().map(|w| w.thread_name.clone()).collect()
    }

    /// Spawn one thread per configured worker; `make_worker` receives the
    /// worker's index. Returns how many were started.
    pub fn startup<B, F>(&mut self, mut make_worker: F) -> Result<usize>
    where
        B: JobBackend,
        F: FnMut(usize) -> Worker<B>,
    {
        if self.config.skip {
            info!("worker startup skipped");
            return Ok(0);
        }

        let count = self.config.thread_count;
        // every worker must see the full count from its first idle sleep
        self.active.fetch_add(count, Ordering::SeqCst);

        for index in 0..count {
            let mut worker = make_worker(index).with_active_workers(Arc::clone(&self.active));
            let control = worker.control();
            let slot = ActiveSlot(Arc::clone(&self.active));

            let spawned = self.factory.spawn(move || {
                let _slot = slot;
                worker.run()
            });
            let handle = match spawned {
                Ok(handle) => handle,
                Err(e) => {
                    // the unspawned closure already dropped its own slot
                    self.active.fetch_sub(count - index - 1, Ordering::SeqCst);
                    error!(error = %e, "failed to start worker thread");
                    return Err(e);
                }
            };

            let thread_name = handle.thread().name().unwrap_or_default().to_string();
            self.workers.push(RunningWorker {
                thread_name,
                control,
                handle,
            });
        }

        info!(count, prefix = ?self.config.thread_prefix, "started worker threads");
        Ok(count)
    }

    /// Stop every worker and wait for its thread.
    ///
    /// All threads are joined even if some fail. The first fatal failure is
    /// returned, or else the first failure.
    pub fn shutdown(&mut self) -> Result<Vec<WorkSummary>> {
        let workers = std::mem::take(&mut self.workers);
        info!(count = workers.len(), "stopping worker threads");
        for worker in &workers {
            worker.control.stop();
        }

        let mut summaries = Vec::with_capacity(workers.len());
        let mut first_error: Option<HiveError> = None;
        for worker in workers {
            let failure = match worker.handle.join() {
                Ok(Ok(summary)) => {
                    summaries.push(summary);
                    continue;
                }
                Ok(Err(e)) => e,
                Err(_) => HiveError::WorkerPanicked {
                    thread_name: worker.thread_name.clone(),
                },
            };
            log_failure(&worker.thread_name, &failure);
            let replace = match &first_error {
                None => true,
                Some(held) => failure.is_fatal() && !held.is_fatal(),
            };
            if replace {
                first_error = Some(failure);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(summaries),
        }
    }
}

fn log_failure(thread: &str, e: &HiveError) {
    let hint = e.guidance().unwrap_or_default();
    if e.is_fatal() {
        error!(thread, error = %e, hint, "worker failed");
    } else {
        warn!(thread, error = %e, hint, "worker stopped with error");
    }
}

impl Drop for WorkerManager {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.control.stop();
        }
    }
}
