//! Scheduler and driver configuration.

use std::time::Duration;

/// Retry ceiling applied to tasks registered without one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Backoff base applied to tasks registered without one.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Registration defaults for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Retry ceiling for tasks whose `max_retries` is zero.
    pub default_max_retries: u32,
    /// Backoff base for tasks whose `backoff_base` is zero.
    pub default_backoff_base: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_max_retries: DEFAULT_MAX_RETRIES,
            default_backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }
}

impl SchedulerConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default maximum retries. Zero keeps the built-in default.
    pub fn with_default_max_retries(mut self, retries: u32) -> Self {
        self.default_max_retries = retries;
        self
    }

    /// Set the default backoff base. Zero keeps the built-in default.
    pub fn with_default_backoff_base(mut self, base: Duration) -> Self {
        self.default_backoff_base = base;
        self
    }

    /// Retry ceiling actually applied; never zero.
    pub(crate) fn max_retries(&self) -> u32 {
        if self.default_max_retries == 0 {
            DEFAULT_MAX_RETRIES
        } else {
            self.default_max_retries
        }
    }

    /// Backoff base actually applied; never zero.
    pub(crate) fn backoff_base(&self) -> Duration {
        if self.default_backoff_base.is_zero() {
            DEFAULT_BACKOFF_BASE
        } else {
            self.default_backoff_base
        }
    }
}

/// Cadence of the tick driver.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Shortest sleep between ticks.
    pub min_sleep: Duration,
    /// Longest sleep between ticks, even when nothing is due.
    pub max_sleep: Duration,
    /// Stop after this many ticks. `None` runs until shutdown.
    pub max_ticks: Option<u64>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            min_sleep: Duration::from_millis(10),
            max_sleep: Duration::from_secs(1),
            max_ticks: None,
        }
    }
}

impl DriverConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum sleep between ticks.
    pub fn with_min_sleep(mut self, min_sleep: Duration) -> Self {
        self.min_sleep = min_sleep;
        self
    }

    /// Set the maximum sleep between ticks.
    pub fn with_max_sleep(mut self, max_sleep: Duration) -> Self {
        self.max_sleep = max_sleep;
        self
    }

    /// Stop the driver after `ticks` ticks.
    pub fn with_max_ticks(mut self, ticks: u64) -> Self {
        self.max_ticks = Some(ticks);
        self
    }

    /// Clamp a wanted sleep into `[min_sleep, max_sleep]`.
    ///
    /// A `max_sleep` below `min_sleep` wins.
    pub fn clamp_sleep(&self, wanted: Duration) -> Duration {
        wanted.max(self.min_sleep).min(self.max_sleep)
    }
}
