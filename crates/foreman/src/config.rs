use std::sync::Arc;
use std::time::Duration;

use errand::{ErrorHandler, RejectionHandler};
use workpool::PoolConfig;

/// A cron schedule: an extended (seconds-and-year) cron expression plus an IANA timezone name.
/// Empty string or `"Local"` resolves to the host's zone.
#[derive(Debug, Clone)]
pub struct CronRule {
    /// The cron expression, e.g. `"*/1 * * * * * *"`.
    pub expr: String,
    /// An IANA zone name, `""`, or `"Local"`.
    pub timezone: String,
}

impl CronRule {
    /// Builds a rule from an expression and timezone.
    #[must_use]
    pub fn new(expr: impl Into<String>, timezone: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            timezone: timezone.into(),
        }
    }
}

/// Builds a [`crate::PoolExecutor`] or [`crate::ScheduledPoolExecutor`] from the configuration
/// recognised by the pool (mirrors [`workpool::PoolConfig`]'s fields).
#[derive(Clone, Default)]
pub struct PoolBuilder {
    config: PoolConfig,
}

impl std::fmt::Debug for PoolBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolBuilder").finish_non_exhaustive()
    }
}

impl PoolBuilder {
    /// Starts from the library's defaults (`max_concurrent = 10`, no blocking queue, no
    /// per-task deadline, reject-on-saturation, log-on-panic).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of worker permits. Default `10`.
    #[must_use]
    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.config.max_concurrent = n;
        self
    }

    /// Sets the capacity of the admission-blocked submitter queue. Default `0`.
    #[must_use]
    pub fn max_blocking_tasks(mut self, n: usize) -> Self {
        self.config.max_blocking_tasks = n;
        self
    }

    /// Sets a per-task deadline attached to each worker's context. Default: none.
    #[must_use]
    pub fn execute_timeout(mut self, timeout: Duration) -> Self {
        self.config.execute_timeout = Some(timeout);
        self
    }

    /// Sets the policy invoked when the pool is saturated. Default: return `Rejected`.
    #[must_use]
    pub fn rejection_handler(mut self, handler: Arc<dyn RejectionHandler>) -> Self {
        self.config.rejection_handler = handler;
        self
    }

    /// Sets the sink for panics and post-admission errors. Default: log via `tracing`.
    #[must_use]
    pub fn error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.config.error_handler = handler;
        self
    }

    /// Builds a plain [`crate::PoolExecutor`] with no scheduling capability.
    #[must_use]
    pub fn build(self) -> crate::PoolExecutor {
        crate::PoolExecutor::new(self.config)
    }

    /// Builds a [`crate::ScheduledPoolExecutor`] composing the pool with a timer wheel and a
    /// cron dispatcher.
    #[must_use]
    pub fn build_scheduled(self) -> crate::ScheduledPoolExecutor {
        crate::ScheduledPoolExecutor::new(self.config)
    }
}
