//! Recurring task scheduler for Cadence.
//!
//! This crate provides an in-process scheduler that:
//! - Keeps a registry of named tasks, each with its own run interval
//! - Runs every due task synchronously, one pass per tick
//! - Retries failed tasks with exponential backoff, up to a retry ceiling
//! - Reports failures to an optional observer
//!
//! Ticks are driven from outside, either by calling [`Scheduler::tick`]
//! directly or through the async loop in [`driver`].

pub mod config;
pub mod driver;
mod error;
mod scheduler;
mod types;

pub use config::{DriverConfig, SchedulerConfig};
pub use driver::DriverReport;
pub use error::{BoxError, ExecutionError, SchedulerError};
pub use scheduler::{ErrorHandler, Scheduler};
pub use types::{RunFn, Task, TaskStatus, TaskSummary, backoff_delay};
