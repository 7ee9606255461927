//! The worker poll loop.
//!
//! A worker moves through
//! `Created → Registered → Polling ⇄ Sleeping → Unregistering → Stopped`.
//! It prunes dead entries and registers itself on startup, then repeatedly
//! reserves and performs batches of jobs, sleeping a staggered interval
//! whenever a poll comes back empty. A stop request is honored right after
//! waking and right after each batch; the job in flight always finishes.

use std::fmt;
use std::ops::AddAssign;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use hive_config::{OptionValue, WorkerOption, WorkerSettings, overlay};
use hive_core::{Result, log_worker_event, logging};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::backend::JobBackend;
use crate::backoff::AdaptiveBackoff;
use crate::identity::WorkerIdentity;
use crate::lifecycle::{self, Lifecycle, LifecycleEvent};
use crate::reconcile::DeadWorkerReconciler;
use crate::registry::GlobalRegistry;
use crate::threads::ThreadTracker;

/// Where a worker is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Registered,
    Polling,
    Sleeping,
    Unregistering,
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Registered => "registered",
            Self::Polling => "polling",
            Self::Sleeping => "sleeping",
            Self::Unregistering => "unregistering",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// One-shot stop flag that also interrupts a sleeping worker.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Returns `true` only for the first request.
    pub fn stop(&self) -> bool {
        let mut stopped = self.stopped.lock();
        if *stopped {
            return false;
        }
        *stopped = true;
        self.wake.notify_all();
        true
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    /// Sleep for `timeout` or until stopped. Returns whether a stop was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.wake.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}

/// Handle for observing and stopping a worker from another thread.
#[derive(Debug, Clone)]
pub struct WorkerControl {
    stop: Arc<StopSignal>,
    state: Arc<Mutex<WorkerState>>,
}

impl Default for WorkerControl {
    fn default() -> Self {
        Self {
            stop: Arc::new(StopSignal::new()),
            state: Arc::new(Mutex::new(WorkerState::Created)),
        }
    }
}

impl WorkerControl {
    /// Ask the worker to stop. Repeated calls have no further effect.
    pub fn stop(&self) {
        if self.stop.stop() {
            debug!(state = %self.state(), "stop requested");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.lock() = state;
    }
}

/// Outcome of one batch of jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkOff {
    pub succeeded: usize,
    pub failed: usize,
}

impl WorkOff {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl AddAssign for WorkOff {
    fn add_assign(&mut self, rhs: Self) {
        self.succeeded += rhs.succeeded;
        self.failed += rhs.failed;
    }
}

/// What a finished worker did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkSummary {
    pub name: String,
    pub jobs: WorkOff,
    pub cycles: usize,
}

/// A job worker bound to a backend.
pub struct Worker<B: JobBackend> {
    backend: B,
    identity: WorkerIdentity,
    registry: GlobalRegistry,
    reconciler: DeadWorkerReconciler,
    backoff: Arc<AdaptiveBackoff>,
    lifecycle: Option<Arc<Lifecycle>>,
    overrides: Vec<(WorkerOption, OptionValue)>,
    active_workers: Arc<AtomicUsize>,
    control: WorkerControl,
}

impl<B: JobBackend> fmt::Debug for Worker<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("identity", &self.identity)
            .field("registry", &self.registry)
            .field("overrides", &self.overrides)
            .field("state", &self.control.state())
            .finish_non_exhaustive()
    }
}

impl<B: JobBackend> Worker<B> {
    /// Worker using the process-wide registry, backoff and lifecycle.
    pub fn new(backend: B) -> Self {
        let registry = GlobalRegistry::system();
        Self {
            backend,
            identity: WorkerIdentity::new(),
            reconciler: DeadWorkerReconciler::new(registry.clone()),
            registry,
            backoff: AdaptiveBackoff::shared(),
            lifecycle: None,
            overrides: Vec::new(),
            active_workers: Arc::new(AtomicUsize::new(1)),
            control: WorkerControl::default(),
        }
    }

    /// Prefix for the computed name.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.identity.set_prefix(Some(prefix.into()));
        self
    }

    /// Use a fixed name instead of the computed one.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.identity.set_name(Some(name.into()));
        self
    }

    /// Register in `registry`; pruning follows unless a reconciler is set afterwards.
    pub fn with_registry(mut self, registry: GlobalRegistry) -> Self {
        self.reconciler = DeadWorkerReconciler::new(registry.clone());
        self.registry = registry;
        self
    }

    pub fn with_reconciler(mut self, reconciler: DeadWorkerReconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    pub fn with_backoff(mut self, backoff: Arc<AdaptiveBackoff>) -> Self {
        self.backoff = backoff;
        self
    }

    /// Use `lifecycle` instead of the process-wide one.
    pub fn with_lifecycle(mut self, lifecycle: Arc<Lifecycle>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Override `option` on this worker's thread once it runs.
    pub fn with_override(mut self, option: WorkerOption, value: OptionValue) -> Self {
        self.overrides.push((option, value));
        self
    }

    /// Shared count of running workers, used to stagger idle sleeps.
    pub fn with_active_workers(mut self, active: Arc<AtomicUsize>) -> Self {
        self.active_workers = active;
        self
    }

    /// Handle for stopping this worker from elsewhere.
    pub fn control(&self) -> WorkerControl {
        self.control.clone()
    }

    pub fn state(&self) -> WorkerState {
        self.control.state()
    }

    /// The worker's name. Computed on the first call, on the calling thread.
    pub fn name(&self) -> &str {
        self.identity.name()
    }

    /// Run until stopped, or until the queue drains with `exit_on_complete`.
    ///
    /// The calling thread is tracked as live for the whole run, so sibling
    /// workers never prune this worker's entry. Startup and shutdown registry
    /// failures are returned after being logged. Overrides the calling thread
    /// held before the run are back in place afterwards.
    pub fn run(&mut self) -> Result<WorkSummary> {
        let name = self.identity.name().to_string();
        let span = logging::worker_span(&name);
        let _entered = span.enter();
        let _tracked = ThreadTracker::track_current();

        let prior = self.prior_overrides();
        if let Err(e) = overlay::apply(self.overrides.iter().cloned()) {
            restore_overrides(prior);
            return Err(e);
        }

        let lifecycle = self.lifecycle.clone().unwrap_or_else(lifecycle::global);
        if let Err(e) = self.start(&name) {
            self.control.set_state(WorkerState::Stopped);
            restore_overrides(prior);
            return Err(e);
        }

        let worked = lifecycle.run(LifecycleEvent::Execute, &name, || self.work_loop(&name, &lifecycle));
        let stopped = self.shutdown(&name);
        restore_overrides(prior);

        let (jobs, cycles) = worked?;
        stopped?;
        Ok(WorkSummary { name, jobs, cycles })
    }

    fn start(&self, name: &str) -> Result<()> {
        log_worker_event!(name, "starting");
        let pruned = self.reconciler.prune_dead_workers()?;
        if !pruned.is_empty() {
            info!(worker = name, count = pruned.len(), "pruned dead workers");
        }
        self.registry.register(name)?;
        self.control.set_state(WorkerState::Registered);
        log_worker_event!(name, "registered");
        Ok(())
    }

    fn work_loop(&self, name: &str, lifecycle: &Lifecycle) -> Result<(WorkOff, usize)> {
        let mut totals = WorkOff::default();
        let mut cycles = 0;
        self.control.set_state(WorkerState::Polling);

        while !self.control.is_stopped() {
            let settings = overlay::effective();
            let started = Instant::now();
            let batch = lifecycle.run(LifecycleEvent::Loop, name, || self.work_off(name, &settings, lifecycle))?;
            cycles += 1;
            totals += batch;

            if !batch.is_empty() {
                let secs = started.elapsed().as_secs_f64().max(f64::EPSILON);
                info!(
                    worker = name,
                    "{} jobs processed at {:.4} j/s, {} failed",
                    batch.total(),
                    batch.total() as f64 / secs,
                    batch.failed
                );
            }

            if self.control.is_stopped() {
                break;
            }
            if !batch.is_empty() {
                continue;
            }

            if settings.exit_on_complete == Some(true) {
                info!(worker = name, "No more jobs available. Exiting");
                break;
            }

            self.control.set_state(WorkerState::Sleeping);
            let delay = self.backoff.sleep_for(settings.sleep_delay, self.active_workers());
            debug!(worker = name, delay_ms = delay.as_millis() as u64, "idle");
            if self.control.stop.wait_timeout(delay) {
                break;
            }
            self.control.set_state(WorkerState::Polling);
        }

        Ok((totals, cycles))
    }

    /// Reserve and perform up to `read_ahead` jobs.
    fn work_off(&self, name: &str, settings: &WorkerSettings, lifecycle: &Lifecycle) -> Result<WorkOff> {
        let mut batch = WorkOff::default();
        for _ in 0..settings.read_ahead {
            if self.control.is_stopped() {
                break;
            }
            let job = match self.backend.reserve(name, settings) {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(e) => {
                    error!(worker = name, error = %e, "error while reserving job");
                    return Err(e);
                }
            };

            debug!(worker = name, ?job, "performing job");
            match lifecycle.run(LifecycleEvent::Perform, name, || self.backend.perform(name, job)) {
                Ok(()) => batch.succeeded += 1,
                Err(e) => {
                    warn!(worker = name, error = %e, "job failed");
                    batch.failed += 1;
                }
            }
        }
        Ok(batch)
    }

    fn shutdown(&self, name: &str) -> Result<()> {
        self.control.set_state(WorkerState::Unregistering);
        let unregistered = self.registry.unregister(name);
        let cleared = self.backend.clear_locks(name);
        self.control.set_state(WorkerState::Stopped);
        log_worker_event!(name, "stopped");
        unregistered?;
        cleared
    }

    fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::Relaxed)
    }

    /// The calling thread's own value for each overridden option, if any.
    fn prior_overrides(&self) -> Vec<(WorkerOption, Option<OptionValue>)> {
        self.overrides
            .iter()
            .map(|(option, _)| (*option, overlay::has(*option).then(|| overlay::get(*option))))
            .collect()
    }
}

fn restore_overrides(prior: Vec<(WorkerOption, Option<OptionValue>)>) {
    for (option, value) in prior {
        match value {
            Some(value) => {
                if let Err(e) = overlay::set(option, value) {
                    warn!(option = option.as_str(), error = %e, "could not restore thread override");
                }
            }
            None => overlay::unset(option),
        }
    }
}
