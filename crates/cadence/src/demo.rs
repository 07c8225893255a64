//! Demonstration task set.
//!
//! Registers a handful of tasks that exercise each scheduler path (steady
//! success, fail-then-recover, retry exhaustion, contained panic) and drives
//! them with the tick driver.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use miette::Result;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use cadence_scheduler::{
    DriverConfig, Scheduler, SchedulerConfig, SchedulerError, Task, TaskSummary, driver,
};

/// Errors raised by the demo tasks.
#[derive(Debug, Error)]
enum DemoError {
    #[error("flaky task failed on attempt {0}")]
    Flaky(usize),

    #[error("upstream {0} unavailable")]
    Unavailable(&'static str),
}

/// Options for the `demo` subcommand.
#[derive(Debug, Clone)]
pub struct DemoOptions {
    pub ticks: u64,
    pub interval_ms: u64,
    pub max_sleep_ms: u64,
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub json: bool,
}

/// Register the demo tasks on `scheduler`.
fn register(scheduler: &Scheduler, interval: Duration) -> Result<(), SchedulerError> {
    scheduler.add(
        Task::new("heartbeat", "Heartbeat", interval).with_run(|| {
            info!(at = %Utc::now(), "heartbeat");
            Ok(())
        }),
    )?;

    let attempts = Arc::new(AtomicUsize::new(0));
    scheduler.add(
        Task::new("flaky-sync", "Sync inventory (flaky)", interval).with_run(move || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= 2 {
                return Err(DemoError::Flaky(attempt).into());
            }
            Ok(())
        }),
    )?;

    scheduler.add(
        Task::new("report", "Generate report", interval)
            .with_run(|| Err(DemoError::Unavailable("report-service").into())),
    )?;

    scheduler.add(
        Task::new("resize", "Resize images", interval)
            .with_max_retries(1)
            .with_run(|| panic!("image decoder crashed")),
    )?;

    Ok(())
}

/// Run the demo until the tick budget is spent or Ctrl-C.
pub async fn run(options: DemoOptions) -> Result<()> {
    let config = SchedulerConfig::new()
        .with_default_max_retries(options.max_retries)
        .with_default_backoff_base(Duration::from_millis(options.backoff_ms));
    let scheduler = Arc::new(Scheduler::with_config(config));

    scheduler.set_error_handler(|task, err| {
        warn!(
            task_id = %task.id,
            retry_count = task.retry_count,
            exhausted = task.is_exhausted(),
            error = %err,
            "task failure reported"
        );
    });

    register(&scheduler, Duration::from_millis(options.interval_ms))
        .map_err(|e| miette::miette!("failed to register demo tasks: {}", e))?;
    info!(tasks = scheduler.task_count(), "demo tasks registered");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let driver_config = DriverConfig::new()
        .with_max_sleep(Duration::from_millis(options.max_sleep_ms))
        .with_max_ticks(options.ticks);
    let report = driver::run(Arc::clone(&scheduler), driver_config, shutdown_rx).await;

    let mut summaries: Vec<TaskSummary> = scheduler.list().iter().map(Task::summary).collect();
    summaries.sort_by(|a, b| a.id.cmp(&b.id));

    if options.json {
        let rendered = serde_json::to_string_pretty(&summaries)
            .map_err(|e| miette::miette!("failed to render task table: {}", e))?;
        println!("{rendered}");
    } else {
        println!(
            "ticks: {}  runs: {}  pending: {}  exhausted: {}",
            report.ticks,
            report.executions,
            scheduler.pending_count(),
            scheduler.exhausted_count()
        );
        for s in &summaries {
            println!(
                "{:<12} {:<8} retries {}/{}  next {}",
                s.id,
                s.status.to_string(),
                s.retry_count,
                s.max_retries,
                s.next_run.format("%H:%M:%S%.3f")
            );
        }
    }

    Ok(())
}
