//! Thread-hosted job workers for hive.
//!
//! This crate lets many job workers share one process, each on its own OS
//! thread, without stepping on each other.
//!
//! # Overview
//!
//! - [`WorkerIdentity`] names a worker after its host, process and thread
//! - [`GlobalRegistry`] records the active workers in a process-wide [`GlobalStore`]
//! - [`DeadWorkerReconciler`] prunes registry entries of workers that died
//! - [`AdaptiveBackoff`] staggers idle sleeps so workers do not poll in lockstep
//! - [`LifecycleGuard`] builds the shared [`Lifecycle`] hooks exactly once
//! - [`Worker`] runs the poll loop against a [`JobBackend`]
//! - [`WorkerManager`] starts and stops a pool of workers on tracked threads
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │    WorkerManager     │
//! │ (startup, shutdown)  │
//! └──────────┬───────────┘
//!            │ one thread each
//!            ▼
//! ┌──────────────────────┐      ┌──────────────────────┐
//! │       Worker         │─────▶│   GlobalRegistry     │
//! │ (poll, perform,      │      │ (prune, register)    │
//! │  sleep)              │      └──────────────────────┘
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │     JobBackend       │
//! │ (reserve, perform)   │
//! └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hive_config::ManagerConfig;
//! use hive_worker::{MemoryQueue, Worker, WorkerManager};
//!
//! fn main() -> hive_core::Result<()> {
//!     let queue = Arc::new(MemoryQueue::new(|job| {
//!         println!("running {}", job.payload);
//!         Ok(())
//!     }));
//!     queue.enqueue("default", 0, "hello");
//!
//!     let mut manager = WorkerManager::new(ManagerConfig {
//!         thread_count: 4,
//!         ..ManagerConfig::default()
//!     });
//!     manager.startup(|_| Worker::new(Arc::clone(&queue)))?;
//!
//!     // ... later
//!     manager.shutdown()?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod backoff;
pub mod identity;
pub mod lifecycle;
pub mod manager;
pub mod reconcile;
pub mod registry;
pub mod store;
pub mod threads;
pub mod worker;

pub use backend::{JobBackend, MemoryJob, MemoryQueue};
pub use backoff::AdaptiveBackoff;
pub use identity::{ParsedIdentity, WorkerIdentity};
pub use lifecycle::{Lifecycle, LifecycleEvent, LifecycleGuard};
pub use manager::WorkerManager;
pub use reconcile::{DeadWorkerReconciler, LiveProcesses, LiveThreads, SystemProcesses};
pub use registry::GlobalRegistry;
pub use store::{GlobalStore, SystemProperties};
pub use threads::{ThreadTracker, WorkerThreadFactory};
pub use worker::{StopSignal, WorkOff, WorkSummary, Worker, WorkerControl, WorkerState};
