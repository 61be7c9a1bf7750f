use std::sync::Arc;

use errand::{Callable, Executor, ExecutorError, Runnable};
use taskfuture::TaskFuture;

use crate::CronRule;

/// A handle returned by a schedule call; dropping it does *not* cancel anything, call
/// [`ScheduleHandle::cancel`] explicitly.
pub struct ScheduleHandle(Box<dyn Fn() + Send + Sync>);

impl ScheduleHandle {
    pub(crate) fn new<F>(cancel: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self(Box::new(cancel))
    }

    /// Cancels the scheduled firing (or, for a cron rule, removes the task). Idempotent.
    pub fn cancel(&self) {
        (self.0)();
    }
}

impl std::fmt::Debug for ScheduleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduleHandle").finish_non_exhaustive()
    }
}

/// The reason a `schedule_at_cron_rate` registration failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ScheduleCronError {
    /// The cron expression or timezone was malformed.
    #[error(transparent)]
    Cron(#[from] almanac::CronError),
    /// The executor could not admit the cron registration (e.g. already shut down).
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

/// An [`Executor`] that also hands back a [`TaskFuture`] for result-producing work.
pub trait ExecutorService: Executor {
    /// Submits `callable`, returning a future for its eventual value or error.
    fn submit<T>(&self, callable: Arc<dyn Callable<T>>) -> Result<Arc<TaskFuture<T>>, ExecutorError>
    where
        T: Send + 'static;
}

/// An [`Executor`] that can also schedule work for later: once after a delay, repeatedly at a
/// fixed period, or on a cron rule.
pub trait ScheduledExecutor: Executor {
    /// Submits `runnable` to run once, after `delay`.
    fn schedule(
        &self,
        runnable: Arc<dyn Runnable>,
        delay: std::time::Duration,
    ) -> Result<ScheduleHandle, ExecutorError>;

    /// Submits `runnable` to run repeatedly, every `period`, coalescing ticks under backpressure
    /// rather than catching them up.
    fn schedule_at_fixed_rate(
        &self,
        runnable: Arc<dyn Runnable>,
        period: std::time::Duration,
    ) -> Result<ScheduleHandle, ExecutorError>;

    /// Registers `runnable` on the cron schedule described by `rule`.
    fn schedule_at_cron_rate(
        &self,
        runnable: Arc<dyn Runnable>,
        rule: CronRule,
    ) -> Result<ScheduleHandle, ScheduleCronError>;
}
