//! Scheduler types.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BoxError;

/// The unit of work a task runs.
pub type RunFn = Arc<dyn Fn() -> Result<(), BoxError> + Send + Sync>;

/// A recurring task.
///
/// Build one with [`Task::new`] and the `with_*` setters, then hand it to
/// [`Scheduler::add`](crate::Scheduler::add). Registration fills in the
/// retry defaults and the first `next_run`.
#[derive(Clone)]
pub struct Task {
    /// Unique identifier, the registry key.
    pub id: String,
    /// Human-readable label.
    pub name: String,
    /// Delay between a successful run and the next one.
    pub interval: Duration,
    /// Earliest instant at which the task may run.
    pub next_run: DateTime<Utc>,
    /// When the task was last attempted.
    pub last_run: Option<DateTime<Utc>>,
    /// Consecutive failures since the last success.
    pub retry_count: u32,
    /// Failures after which the task is no longer retried.
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub backoff_base: Duration,
    /// Current status.
    pub status: TaskStatus,
    /// Work to run. Required at registration.
    pub run_func: Option<RunFn>,
}

/// Current status of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for its first or next scheduled run.
    #[default]
    Pending,
    /// Executing inside a tick.
    Running,
    /// Last run succeeded, waiting for the next interval.
    Done,
    /// Last run failed, waiting for backoff (or exhausted).
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Serializable view of a task, without its work function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: String,
    pub name: String,
    pub status: TaskStatus,
    pub interval_ms: u64,
    pub backoff_base_ms: u64,
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: DateTime<Utc>,
    /// True once a failed task has used up its retries.
    pub exhausted: bool,
}

impl Task {
    /// Create an unregistered task with no work function.
    pub fn new(id: impl Into<String>, name: impl Into<String>, interval: Duration) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            interval,
            next_run: Utc::now(),
            last_run: None,
            retry_count: 0,
            max_retries: 0,
            backoff_base: Duration::ZERO,
            status: TaskStatus::Pending,
            run_func: None,
        }
    }

    /// Set the work function.
    pub fn with_run<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.run_func = Some(Arc::new(f));
        self
    }

    /// Set the retry ceiling. Zero means "use the scheduler default".
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the backoff base. Zero means "use the scheduler default".
    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    /// Backoff delay after `retries` consecutive failures.
    pub fn backoff(&self, retries: u32) -> Duration {
        backoff_delay(self.backoff_base, retries)
    }

    /// Whether a failed task has used up its retries.
    pub fn is_exhausted(&self) -> bool {
        self.status == TaskStatus::Failed && self.retry_count >= self.max_retries
    }

    /// Earliest instant at which this task becomes eligible to run.
    ///
    /// `None` while running, and for exhausted tasks, which never run again
    /// unless reset.
    pub fn due_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            TaskStatus::Running => None,
            TaskStatus::Failed if self.is_exhausted() => None,
            TaskStatus::Failed => {
                let base = self.last_run.unwrap_or(self.next_run);
                Some(offset(base, self.backoff(self.retry_count)))
            }
            TaskStatus::Pending | TaskStatus::Done => Some(self.next_run),
        }
    }

    /// Check if this task should run at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at().is_some_and(|at| now >= at)
    }

    /// Serializable snapshot of this task.
    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            status: self.status,
            interval_ms: millis(self.interval),
            backoff_base_ms: millis(self.backoff_base),
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            last_run: self.last_run,
            next_run: self.next_run,
            exhausted: self.is_exhausted(),
        }
    }

    pub(crate) fn mark_running(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Running;
        self.last_run = Some(now);
    }

    pub(crate) fn mark_succeeded(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Done;
        self.retry_count = 0;
        self.next_run = offset(now, self.interval);
    }

    pub(crate) fn mark_failed(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Failed;
        self.retry_count = self.retry_count.saturating_add(1);
        self.next_run = offset(now, self.backoff(self.retry_count));
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("next_run", &self.next_run)
            .field("last_run", &self.last_run)
            .field("retry_count", &self.retry_count)
            .field("max_retries", &self.max_retries)
            .field("backoff_base", &self.backoff_base)
            .field("status", &self.status)
            .field("run_func", &self.run_func.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// `base * 2^retries`, saturating at `Duration::MAX`.
pub fn backoff_delay(base: Duration, retries: u32) -> Duration {
    2u32.checked_pow(retries)
        .and_then(|factor| base.checked_mul(factor))
        .unwrap_or(Duration::MAX)
}

/// `at + delay`, saturating at the largest representable instant.
pub(crate) fn offset(at: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(delay)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
