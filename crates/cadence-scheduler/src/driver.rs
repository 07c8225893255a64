//! Async tick driver.
//!
//! The scheduler never ticks on its own. This loop is one way to drive it:
//! tick, sleep until the next task is due (clamped to the configured
//! bounds), repeat until shutdown.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::Scheduler;
use crate::config::DriverConfig;

/// Counters from a finished driver run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverReport {
    /// Ticks performed.
    pub ticks: u64,
    /// Task runs across all ticks, successful or not.
    pub executions: u64,
}

/// Drive `scheduler` until `shutdown_rx` turns true, its sender is dropped,
/// or `config.max_ticks` ticks have run.
///
/// Ticks run on the blocking pool so slow task functions do not stall the
/// async runtime.
pub async fn run(
    scheduler: Arc<Scheduler>,
    config: DriverConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> DriverReport {
    info!(?config, "tick driver starting");
    let mut report = DriverReport::default();

    loop {
        if *shutdown_rx.borrow() {
            info!("tick driver shutting down");
            break;
        }
        if config.max_ticks.is_some_and(|max| report.ticks >= max) {
            info!(ticks = report.ticks, "tick limit reached");
            break;
        }

        let ticking = Arc::clone(&scheduler);
        match tokio::task::spawn_blocking(move || ticking.tick()).await {
            Ok(executed) => {
                report.executions += executed.len() as u64;
                if !executed.is_empty() {
                    debug!(tick = report.ticks, ids = ?executed, "tick ran tasks");
                }
            }
            Err(e) => error!(error = %e, "tick aborted"),
        }
        report.ticks += 1;

        let sleep_duration = sleep_duration(&scheduler, &config, Utc::now());

        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    info!("shutdown sender dropped, stopping tick driver");
                    break;
                }
                if *shutdown_rx.borrow() {
                    info!("tick driver received shutdown signal");
                }
            }
            _ = sleep(sleep_duration) => {}
        }
    }

    info!(
        ticks = report.ticks,
        executions = report.executions,
        "tick driver stopped"
    );
    report
}

/// How long to wait before the next tick.
pub fn sleep_duration(
    scheduler: &Scheduler,
    config: &DriverConfig,
    now: DateTime<Utc>,
) -> Duration {
    let wanted = match scheduler.next_due() {
        // Already due (or overdue) maps to zero
        Some(at) => (at - now).to_std().unwrap_or(Duration::ZERO),
        None => config.max_sleep,
    };
    config.clamp_sleep(wanted)
}
