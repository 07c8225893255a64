//! Task registry and tick evaluation.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::error::{ExecutionError, SchedulerError};
use crate::types::{Task, TaskStatus, offset};

/// Observer called with every failed task run.
///
/// Runs inside the tick, with the scheduler lock held. It must not call back
/// into the same scheduler.
pub type ErrorHandler = Box<dyn Fn(&Task, &ExecutionError) + Send + Sync>;

/// State guarded by the scheduler lock.
#[derive(Default)]
struct Registry {
    tasks: HashMap<String, Task>,
    on_error: Option<ErrorHandler>,
}

/// The task scheduler.
///
/// Holds the registry behind a single mutex. Every operation, including the
/// whole scan-and-execute pass of a tick, runs under that lock, so task runs
/// never overlap and a slow task delays everything else.
pub struct Scheduler {
    config: SchedulerConfig,
    inner: Mutex<Registry>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Create a scheduler with default retry settings.
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Create a scheduler with the given registration defaults.
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Registry::default()),
        }
    }

    // Task and handler panics are caught inside the tick, so the registry is
    // still consistent if the lock was ever poisoned.
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install the failure observer, replacing any previous one.
    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(&Task, &ExecutionError) + Send + Sync + 'static,
    {
        self.lock().on_error = Some(Box::new(handler));
    }

    /// Remove the failure observer.
    pub fn clear_error_handler(&self) {
        self.lock().on_error = None;
    }

    /// Register a task, first eligible one `interval` from now.
    ///
    /// The clock is read once the lock is held, so a task added while a tick
    /// is running is timed from when it actually enters the registry.
    pub fn add(&self, task: Task) -> Result<(), SchedulerError> {
        let mut registry = self.lock();
        self.register(&mut registry, task, Utc::now())
    }

    /// Register a task as of `now`.
    ///
    /// Fills in the retry defaults, resets the status to pending and replaces
    /// any task already registered under the same id. `retry_count` and
    /// `last_run` are kept as given, so re-adding a snapshot of an exhausted
    /// task leaves it one failure from exhaustion; build a fresh `Task` or
    /// call [`Scheduler::reset`] instead.
    pub fn add_at(&self, task: Task, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        let mut registry = self.lock();
        self.register(&mut registry, task, now)
    }

    #[tracing::instrument(skip(self, registry, task), fields(task_id = %task.id, name = %task.name))]
    fn register(
        &self,
        registry: &mut Registry,
        mut task: Task,
        now: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        if task.id.is_empty() {
            return Err(SchedulerError::InvalidTask(
                "task id cannot be empty".to_string(),
            ));
        }
        if task.run_func.is_none() {
            return Err(SchedulerError::InvalidTask(format!(
                "task {} has no run function",
                task.id
            )));
        }

        if task.max_retries == 0 {
            task.max_retries = self.config.max_retries();
        }
        if task.backoff_base.is_zero() {
            task.backoff_base = self.config.backoff_base();
        }
        task.status = TaskStatus::Pending;
        task.next_run = offset(now, task.interval);

        let next_run = task.next_run;
        let replaced = registry.tasks.insert(task.id.clone(), task).is_some();
        info!(%next_run, replaced, "registered task");
        Ok(())
    }

    /// Remove a task. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.lock().tasks.remove(id);
        if let Some(task) = &removed {
            info!(task_id = id, name = %task.name, "removed task");
        }
        removed.is_some()
    }

    /// Get a snapshot of a task.
    pub fn get(&self, id: &str) -> Option<Task> {
        self.lock().tasks.get(id).cloned()
    }

    /// Snapshot of every registered task, in no particular order.
    pub fn list(&self) -> Vec<Task> {
        self.lock().tasks.values().cloned().collect()
    }

    /// Number of registered tasks.
    pub fn task_count(&self) -> usize {
        self.lock().tasks.len()
    }

    /// Number of tasks that are pending or failed.
    pub fn pending_count(&self) -> usize {
        self.lock()
            .tasks
            .values()
            .filter(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::Failed))
            .count()
    }

    /// Number of failed tasks that have used up their retries.
    pub fn exhausted_count(&self) -> usize {
        self.lock()
            .tasks
            .values()
            .filter(|t| t.is_exhausted())
            .count()
    }

    /// Earliest instant at which any task becomes eligible.
    ///
    /// `None` when no task can run again without a reset.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.lock().tasks.values().filter_map(Task::due_at).min()
    }

    /// Reset a failed task to pending, due immediately.
    pub fn reset(&self, id: &str) -> Result<bool, SchedulerError> {
        self.reset_at(id, Utc::now())
    }

    /// Reset a failed task to pending, due at `now`.
    ///
    /// Returns `Ok(false)` when the task exists but is not failed. This is
    /// the only way an exhausted task runs again.
    pub fn reset_at(&self, id: &str, now: DateTime<Utc>) -> Result<bool, SchedulerError> {
        let mut registry = self.lock();
        let task = registry
            .tasks
            .get_mut(id)
            .ok_or_else(|| SchedulerError::TaskNotFound(id.to_string()))?;

        if task.status != TaskStatus::Failed {
            return Ok(false);
        }

        let was_exhausted = task.is_exhausted();
        task.status = TaskStatus::Pending;
        task.retry_count = 0;
        task.next_run = now;
        info!(task_id = id, was_exhausted, "reset task to pending");
        Ok(true)
    }

    /// Run one scheduling pass at the current time.
    ///
    /// Returns the ids of the tasks that ran, whatever their outcome.
    pub fn tick(&self) -> Vec<String> {
        self.tick_at(Utc::now())
    }

    /// Run one scheduling pass as of `now`.
    pub fn tick_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut guard = self.lock();
        let registry = &mut *guard;
        let mut executed = Vec::new();

        for (id, task) in registry.tasks.iter_mut() {
            if !task.is_due(now) {
                continue;
            }

            task.mark_running(now);

            match invoke(task) {
                Ok(()) => {
                    task.mark_succeeded(now);
                    debug!(task_id = %id, next_run = %task.next_run, "task succeeded");
                }
                Err(err) => {
                    task.mark_failed(now);
                    if let ExecutionError::Panicked(message) = &err {
                        error!(task_id = %id, panic = %message, "task panicked");
                    }
                    warn!(
                        task_id = %id,
                        retry_count = task.retry_count,
                        max_retries = task.max_retries,
                        next_run = %task.next_run,
                        error = %err,
                        "task failed"
                    );
                    if task.is_exhausted() {
                        warn!(task_id = %id, "task exhausted its retries, no further automatic runs");
                    }
                    if let Some(handler) = &registry.on_error {
                        notify(handler, task, &err);
                    }
                }
            }

            executed.push(id.clone());
        }

        debug!(count = executed.len(), "tick complete");
        executed
    }
}

/// Run a task's work function, turning a panic into an execution error.
fn invoke(task: &Task) -> Result<(), ExecutionError> {
    let Some(run) = task.run_func.as_ref() else {
        return Err(ExecutionError::Failed("task has no run function".into()));
    };

    match panic::catch_unwind(AssertUnwindSafe(|| run())) {
        Ok(result) => result.map_err(ExecutionError::Failed),
        Err(payload) => Err(ExecutionError::from_panic(payload)),
    }
}

/// Call the failure observer; a panicking observer must not abort the tick.
fn notify(handler: &ErrorHandler, task: &Task, err: &ExecutionError) {
    if panic::catch_unwind(AssertUnwindSafe(|| handler(task, err))).is_err() {
        error!(task_id = %task.id, "error handler panicked");
    }
}
