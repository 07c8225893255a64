//! Error types for the scheduler.

use thiserror::Error;

/// Boxed error returned by task functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur in scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Invalid task configuration, rejected at registration.
    #[error("invalid task: {0}")]
    InvalidTask(String),

    /// Task not found.
    #[error("task not found: {0}")]
    TaskNotFound(String),
}

/// Failure of a single task run.
///
/// Never returned from a tick. It reaches the caller only through the
/// error handler installed with [`Scheduler::set_error_handler`].
///
/// [`Scheduler::set_error_handler`]: crate::Scheduler::set_error_handler
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The task function returned an error.
    #[error("task failed: {0}")]
    Failed(#[source] BoxError),

    /// The task function panicked.
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl ExecutionError {
    /// Build a `Panicked` error from a `catch_unwind` payload.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::Panicked(message)
    }
}
