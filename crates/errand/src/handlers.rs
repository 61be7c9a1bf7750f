use std::fmt;
use std::sync::Arc;

use crate::{Context, ExecutorError, Runnable, WorkError};

/// The minimal surface every executor in this library implements.
pub trait Executor: Send + Sync {
    /// Submits `runnable` for execution, subject to the executor's admission policy.
    fn execute(&self, runnable: Arc<dyn Runnable>) -> Result<(), ExecutorError>;
}

/// Decides what happens to a [`Runnable`] that arrives when the pool's worker permits and
/// blocking queue are both exhausted.
pub trait RejectionHandler: Send + Sync + fmt::Debug {
    /// Handles a rejected submission. May run it, drop it, or report the rejection.
    fn reject(&self, runnable: Arc<dyn Runnable>, pool: &dyn Executor) -> Result<(), ExecutorError>;
}

/// Returns [`ExecutorError::Rejected`] unchanged. The default policy.
#[derive(Debug, Default, Clone, Copy)]
pub struct RejectedPolicy;

impl RejectionHandler for RejectedPolicy {
    fn reject(&self, _runnable: Arc<dyn Runnable>, _pool: &dyn Executor) -> Result<(), ExecutorError> {
        Err(ExecutorError::Rejected)
    }
}

/// Silently drops the submission and reports success.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardPolicy;

impl RejectionHandler for DiscardPolicy {
    fn reject(&self, _runnable: Arc<dyn Runnable>, _pool: &dyn Executor) -> Result<(), ExecutorError> {
        Ok(())
    }
}

/// Runs the submission synchronously on the calling thread instead of queueing it.
#[derive(Debug, Default, Clone, Copy)]
pub struct CallerRunsPolicy;

impl RejectionHandler for CallerRunsPolicy {
    fn reject(&self, runnable: Arc<dyn Runnable>, _pool: &dyn Executor) -> Result<(), ExecutorError> {
        runnable.run(&Context::background());
        Ok(())
    }
}

/// Sink for faults observed after a unit of work was admitted: panics trapped by the worker
/// wrapper, and non-`Shutdown` errors forwarded by the timer/cron schedulers.
pub trait ErrorHandler: Send + Sync + fmt::Debug {
    /// Handles a post-admission failure.
    fn handle(&self, error: WorkError);
}

/// Logs the error via `tracing::error!` and otherwise ignores it. The default handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingErrorHandler;

impl ErrorHandler for LoggingErrorHandler {
    fn handle(&self, error: WorkError) {
        tracing::error!(error = %error, "unit of work failed after admission");
    }
}

/// Drops the error without logging it.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardErrorHandler;

impl ErrorHandler for DiscardErrorHandler {
    fn handle(&self, _error: WorkError) {}
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::runnable;

    use super::*;

    struct NeverCalled;
    impl Executor for NeverCalled {
        fn execute(&self, _runnable: Arc<dyn Runnable>) -> Result<(), ExecutorError> {
            panic!("should not be called by a rejection policy under test")
        }
    }

    #[test]
    fn rejected_policy_returns_rejected() {
        let r = runnable(|_ctx| {});
        let err = RejectedPolicy.reject(r, &NeverCalled).unwrap_err();
        assert_eq!(err, ExecutorError::Rejected);
    }

    #[test]
    fn discard_policy_drops_silently() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = Arc::clone(&ran);
        let r = runnable(move |_ctx| ran2.store(true, Ordering::SeqCst));
        DiscardPolicy.reject(r, &NeverCalled).unwrap();
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn caller_runs_policy_runs_inline() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = Arc::clone(&ran);
        let r = runnable(move |_ctx| ran2.store(true, Ordering::SeqCst));
        CallerRunsPolicy.reject(r, &NeverCalled).unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }
}
