//! Logging for hive.
//!
//! Every worker thread logs through one subscriber. A worker enters its
//! [`worker_span`] for the whole of its run, so each event it emits, down to
//! the job backend, carries the worker's registry identity. Thread names are
//! left out of the output: the identity already ends in the thread label.
//!
//! Output goes to a daily-rolling `hive.log` of JSON lines and to a compact
//! stderr layer. `RUST_LOG` replaces the [`default_filter`] directives.
//!
//! ## Example
//!
//! ```no_run
//! use hive_core::logging;
//!
//! let _guard = logging::init_logging(None, false).expect("logging init");
//!
//! let span = logging::worker_span("host:box pid:1 thread:hive-worker#1");
//! let _entered = span.enter();
//! tracing::info!("registered");
//! ```

use std::path::PathBuf;

use tracing::Span;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{HiveError, Result};

/// Crates whose events pass the default filter.
const HIVE_TARGETS: [&str; 4] = ["hive", "hive_core", "hive_config", "hive_worker"];

/// Flushes the log file when dropped; hold it until `main` returns.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Filter directives used when `RUST_LOG` is unset.
///
/// Hive crates log at `info`, or `debug` when `verbose`; everything else at `warn`.
pub fn default_filter(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    std::iter::once("warn".to_string())
        .chain(HIVE_TARGETS.iter().map(|target| format!("{target}={level}")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Span entered by a worker for its whole run.
pub fn worker_span(name: &str) -> Span {
    tracing::info_span!(target: "hive::worker", "worker", worker = %name)
}

/// Install the process-wide subscriber.
///
/// Logs go to `<log_dir>/hive.log` (defaults to `~/.hive/logs/`) and to
/// stderr. Fails if a subscriber is already installed.
pub fn init_logging(log_dir: Option<PathBuf>, verbose: bool) -> Result<LogGuard> {
    let log_dir = match log_dir {
        Some(dir) => dir,
        None => default_log_dir()?,
    };
    std::fs::create_dir_all(&log_dir).map_err(|e| HiveError::DirectoryCreation {
        path: log_dir.clone(),
        source: e,
    })?;

    let (file_writer, file_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, "hive.log"));
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    // the worker span sits at the root of every worker event, so the
    // current span alone names the worker
    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .json()
        .with_current_span(true)
        .with_span_list(false);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_thread_names(false)
        .with_file(verbose)
        .with_line_number(verbose)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| HiveError::internal(format!("logging already initialized: {e}")))?;

    tracing::debug!(log_dir = %log_dir.display(), verbose, "logging initialized");
    Ok(LogGuard {
        _file_guard: Some(file_guard),
    })
}

/// Get the default log directory path.
///
/// Returns `~/.hive/logs/`
pub fn default_log_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").map_err(|_| HiveError::Internal {
        message: "HOME environment variable not set".into(),
    })?;

    Ok(PathBuf::from(home).join(".hive").join("logs"))
}

/// Convenience macro for logging worker lifecycle events.
///
/// # Example
///
/// ```ignore
/// log_worker_event!(worker.name(), "registered");
/// log_worker_event!(worker.name(), "stopped", processed = 12);
/// ```
#[macro_export]
macro_rules! log_worker_event {
    ($worker:expr, $event:expr) => {
        tracing::info!(
            target: "hive::worker",
            worker = %$worker,
            event = $event,
            "worker event"
        )
    };
    ($worker:expr, $event:expr, $($field:tt)*) => {
        tracing::info!(
            target: "hive::worker",
            worker = %$worker,
            event = $event,
            $($field)*,
            "worker event"
        )
    };
}
