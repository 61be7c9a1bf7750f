use std::sync::Arc;
use std::time::Duration;

use errand::{ErrorHandler, LoggingErrorHandler, RejectedPolicy, RejectionHandler};

/// Configuration recognised by [`crate::WorkerPool`].
///
/// Constructed directly or via `foreman::PoolBuilder`, which lives in the crate that composes
/// the worker pool with the timer/cron scheduling layers.
#[derive(Clone)]
pub struct PoolConfig {
    /// Number of worker permits. Default `10`.
    pub max_concurrent: usize,
    /// Capacity of the admission-blocked submitter queue. Default `0` (no blocking queue; a
    /// saturated pool goes straight to the rejection handler).
    pub max_blocking_tasks: usize,
    /// Per-task deadline attached to the worker's context. `None` means no deadline.
    pub execute_timeout: Option<Duration>,
    /// Policy invoked when both worker permits and the blocking queue are exhausted.
    pub rejection_handler: Arc<dyn RejectionHandler>,
    /// Sink for panics trapped inside the worker wrapper.
    pub error_handler: Arc<dyn ErrorHandler>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            max_blocking_tasks: 0,
            execute_timeout: None,
            rejection_handler: Arc::new(RejectedPolicy),
            error_handler: Arc::new(LoggingErrorHandler),
        }
    }
}

impl std::fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolConfig")
            .field("max_concurrent", &self.max_concurrent)
            .field("max_blocking_tasks", &self.max_blocking_tasks)
            .field("execute_timeout", &self.execute_timeout)
            .finish_non_exhaustive()
    }
}
