//! hive - run job-queue workers as threads in one process
//!
//! ## Usage
//!
//! ```bash
//! # Four workers over an in-memory demo queue with 100 jobs
//! hive --threads 4 --jobs 100
//!
//! # Work two queues, stop once they are empty
//! hive --queues mail,reports --jobs 20 --exit-on-complete
//!
//! # Custom config file and verbose logging
//! hive --config ./hive.yaml -v
//! ```
//!
//! Settings come from the config file (`~/.hive/config.yaml` by default),
//! then environment parameters (`HIVE_THREAD_COUNT`, `QUEUES`, `SLEEP_DELAY`, ...),
//! then the flags below.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use hive_config::{HiveConfig, Parameters};
use hive_core::{HiveError, LogGuard, init_logging};
use hive_worker::{MemoryQueue, Worker, WorkerManager};
use tracing::{error, info};

/// Run job-queue workers as threads inside one process
#[derive(Parser, Debug)]
#[command(name = "hive")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of worker threads
    #[arg(short, long)]
    threads: Option<usize>,

    /// Prefix for worker thread names
    #[arg(long)]
    prefix: Option<String>,

    /// Idle sleep between empty polls, in seconds or as a duration like `500ms`
    #[arg(long)]
    sleep_delay: Option<String>,

    /// Queues to work (comma separated); all queues when omitted
    #[arg(long, value_delimiter = ',')]
    queues: Vec<String>,

    /// Demo jobs to enqueue before starting
    #[arg(long, default_value_t = 0)]
    jobs: usize,

    /// Stop each worker once the queue is empty
    #[arg(long)]
    exit_on_complete: bool,

    /// Config file (defaults to ~/.hive/config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for log files (defaults to ~/.hive/logs/)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Enable verbose logging (increases log level)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match setup_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::from(1);
        }
    };

    match run(&cli) {
        Ok(()) => {
            info!("hive exited normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("hive error: {:#}", e);
            eprintln!("Error: {:#}", e);
            if let Some(hint) = e.downcast_ref::<HiveError>().and_then(HiveError::guidance) {
                eprintln!("Hint: {hint}");
            }
            ExitCode::from(1)
        }
    }
}

fn setup_logging(cli: &Cli) -> hive_core::Result<LogGuard> {
    init_logging(cli.log_dir.clone(), cli.verbose > 0)
}

/// File, then environment, then flags.
fn load_config(cli: &Cli) -> anyhow::Result<HiveConfig> {
    let mut config = match &cli.config {
        Some(path) => HiveConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => HiveConfig::load_or_default().context("loading default config")?,
    };
    config
        .apply_parameters(&Parameters::from_env())
        .context("reading environment parameters")?;

    if let Some(threads) = cli.threads {
        config.manager.thread_count = threads;
    }
    if let Some(prefix) = &cli.prefix {
        config.manager.thread_prefix = Some(prefix.clone());
    }
    if let Some(delay) = &cli.sleep_delay {
        config.worker.sleep_delay = Some(delay.clone());
    }
    if !cli.queues.is_empty() {
        config.worker.queues = Some(cli.queues.clone());
    }
    if cli.exit_on_complete {
        config.worker.exit_on_complete = Some(true);
    }
    Ok(config)
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let settings = config.worker_settings()?;
    info!(
        threads = config.manager.thread_count,
        sleep_delay = %humantime::format_duration(settings.sleep_delay),
        queues = ?settings.queues,
        read_ahead = settings.read_ahead,
        "starting hive"
    );
    hive_config::set_defaults(settings.clone());

    let queue = Arc::new(MemoryQueue::new(|job| {
        info!(job = %job.id, queue = %job.queue, payload = %job.payload, "performing demo job");
        Ok(())
    }));
    let queue_names = if settings.queues.is_empty() {
        vec!["default".to_string()]
    } else {
        settings.queues.clone()
    };
    let priority = settings.min_priority.unwrap_or(0);
    for i in 0..cli.jobs {
        queue.enqueue(&queue_names[i % queue_names.len()], priority, format!("demo job {i}"));
    }

    let mut manager = WorkerManager::new(config.manager.clone());
    let started = manager.startup(|_| Worker::new(Arc::clone(&queue)))?;
    if started == 0 {
        info!("no workers started");
        return Ok(());
    }

    wait_for_exit(&manager)?;

    let summaries = manager.shutdown()?;
    let performed: usize = summaries.iter().map(|s| s.jobs.succeeded).sum();
    let failed: usize = summaries.iter().map(|s| s.jobs.failed).sum();
    info!(workers = summaries.len(), performed, failed, pending = queue.pending(), "workers stopped");
    Ok(())
}

/// Block until Ctrl-C or until every worker has finished on its own.
fn wait_for_exit(manager: &WorkerManager) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building signal runtime")?;
    runtime.block_on(watch(manager))
}

async fn watch(manager: &WorkerManager) -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut tick = tokio::time::interval(Duration::from_millis(200));

    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                signal.context("listening for Ctrl-C")?;
                info!("interrupt received, stopping workers");
                return Ok(());
            }
            _ = tick.tick() => {
                if manager.active_workers() == 0 {
                    info!("all workers finished");
                    return Ok(());
                }
            }
        }
    }
}
