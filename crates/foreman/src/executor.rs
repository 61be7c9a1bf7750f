use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use errand::{Callable, Context, ContextError, ErrorHandler, Executor, ExecutorError, Runnable, WorkError};
use taskfuture::TaskFuture;
use workpool::PoolConfig;

use crate::traits::{ExecutorService, ScheduleHandle, ScheduledExecutor};
use crate::ScheduleCronError;
use crate::config::CronRule;

/// A bounded worker pool with no scheduling capability. A thin, named alias over
/// [`workpool::WorkerPool`]: the pool crate already implements [`errand::Executor`] and its own
/// `submit`, this just gives callers the name the external interface describes.
pub type PoolExecutor = workpool::WorkerPool;

impl ExecutorService for PoolExecutor {
    fn submit<T>(&self, callable: Arc<dyn Callable<T>>) -> Result<Arc<TaskFuture<T>>, ExecutorError>
    where
        T: Send + 'static,
    {
        workpool::WorkerPool::submit(self, callable)
    }
}

/// A pool plus a timer-wheel (delay/fixed-rate) and a cron dispatcher, behind one
/// [`ScheduledExecutor`] API.
///
/// Ready cron firings are pumped into the pool by one dedicated consumer thread, started lazily
/// on the first `schedule_at_cron_rate` call.
pub struct ScheduledPoolExecutor {
    pool: workpool::WorkerPool,
    chime: chime::Chime,
    dispatcher: almanac::Dispatcher,
    error_handler: Arc<dyn ErrorHandler>,
    pump: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ScheduledPoolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledPoolExecutor").finish_non_exhaustive()
    }
}

impl ScheduledPoolExecutor {
    pub(crate) fn new(config: PoolConfig) -> Self {
        let error_handler = Arc::clone(&config.error_handler);
        Self {
            pool: workpool::WorkerPool::new(config),
            chime: chime::Chime::new(Arc::clone(&error_handler)),
            dispatcher: almanac::Dispatcher::new(),
            error_handler,
            pump: parking_lot::Mutex::new(None),
        }
    }

    /// Submits `callable`, returning a future for its eventual value or error.
    pub fn submit<T>(&self, callable: Arc<dyn Callable<T>>) -> Result<Arc<TaskFuture<T>>, ExecutorError>
    where
        T: Send + 'static,
    {
        self.pool.submit(callable)
    }

    /// Starts the consumer thread that drains the cron dispatcher's ready channel into the pool,
    /// if it is not already running.
    fn ensure_pump_started(&self) {
        let mut pump = self.pump.lock();
        if pump.is_some() {
            return;
        }

        let ready = self.dispatcher.ready_channel();
        let pool = self.pool.clone();
        let error_handler = Arc::clone(&self.error_handler);

        *pump = Some(std::thread::spawn(move || {
            for unit in ready.iter() {
                match pool.execute(unit) {
                    Ok(()) => {}
                    Err(ExecutorError::Shutdown) => {
                        tracing::debug!("dropped a cron firing: pool is shut down");
                    }
                    Err(err) => error_handler.handle(WorkError::Executor(err)),
                }
            }
        }));
    }

    /// Shuts down in the order spec'd: drain the pool, then stop the dispatcher, then pump one
    /// tick through the timer wheel and close it.
    pub fn shutdown(&self, ctx: &Context) -> Result<(), ContextError> {
        let result = self.pool.shutdown(ctx);

        self.dispatcher.shutdown();
        if let Some(handle) = self.pump.lock().take() {
            let _ = handle.join();
        }

        self.chime.shutdown();

        result
    }
}

impl Executor for ScheduledPoolExecutor {
    fn execute(&self, runnable: Arc<dyn Runnable>) -> Result<(), ExecutorError> {
        self.pool.execute(runnable)
    }
}

impl ExecutorService for ScheduledPoolExecutor {
    fn submit<T>(&self, callable: Arc<dyn Callable<T>>) -> Result<Arc<TaskFuture<T>>, ExecutorError>
    where
        T: Send + 'static,
    {
        ScheduledPoolExecutor::submit(self, callable)
    }
}

impl ScheduledExecutor for ScheduledPoolExecutor {
    fn schedule(&self, runnable: Arc<dyn Runnable>, delay: Duration) -> Result<ScheduleHandle, ExecutorError> {
        let executor: Arc<dyn Executor> = Arc::new(self.pool.clone());
        let handle = self.chime.schedule(executor, runnable, delay)?;
        Ok(ScheduleHandle::new(move || handle.cancel()))
    }

    fn schedule_at_fixed_rate(
        &self,
        runnable: Arc<dyn Runnable>,
        period: Duration,
    ) -> Result<ScheduleHandle, ExecutorError> {
        let executor: Arc<dyn Executor> = Arc::new(self.pool.clone());
        let handle = self.chime.schedule_fixed(executor, runnable, period)?;
        Ok(ScheduleHandle::new(move || handle.cancel()))
    }

    fn schedule_at_cron_rate(
        &self,
        runnable: Arc<dyn Runnable>,
        rule: CronRule,
    ) -> Result<ScheduleHandle, ScheduleCronError> {
        let handle = self
            .dispatcher
            .add_task(runnable, &rule.expr, &rule.timezone)?;
        self.ensure_pump_started();
        Ok(ScheduleHandle::new(move || handle.remove()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use errand::{callable, runnable};

    use super::*;

    #[test]
    fn pool_executor_runs_submitted_work() {
        let pool: PoolExecutor = workpool::WorkerPool::new(PoolConfig::default());
        let future = ExecutorService::submit(&pool, callable(|_ctx| Ok::<_, errand::CallError>(7)))
            .unwrap();
        assert_eq!(future.get(&Context::background()).unwrap(), 7);
    }

    #[test]
    fn scheduled_executor_runs_a_delayed_task() {
        let scheduled = crate::PoolBuilder::new().build_scheduled();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);

        ScheduledExecutor::schedule(
            &scheduled,
            runnable(move |_ctx| {
                count2.fetch_add(1, Ordering::SeqCst);
            }),
            Duration::from_millis(20),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(100));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        scheduled.shutdown(&Context::with_timeout(Duration::from_secs(5))).unwrap();
    }

    #[test]
    fn scheduled_executor_runs_a_cron_task() {
        let scheduled = crate::PoolBuilder::new().build_scheduled();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);

        let _handle = ScheduledExecutor::schedule_at_cron_rate(
            &scheduled,
            runnable(move |_ctx| {
                count2.fetch_add(1, Ordering::SeqCst);
            }),
            CronRule::new("* * * * * * *", "UTC"),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(2500));
        assert!(count.load(Ordering::SeqCst) >= 2);

        scheduled.shutdown(&Context::with_timeout(Duration::from_secs(5))).unwrap();
    }

    #[test]
    fn invalid_cron_rule_is_rejected_without_starting_the_pump() {
        let scheduled = crate::PoolBuilder::new().build_scheduled();
        let err = ScheduledExecutor::schedule_at_cron_rate(
            &scheduled,
            runnable(|_ctx| {}),
            CronRule::new("garbage", "UTC"),
        )
        .unwrap_err();
        assert_eq!(err, ScheduleCronError::Cron(almanac::CronError::InvalidCronExpr));
        assert!(scheduled.pump.lock().is_none());

        scheduled.shutdown(&Context::with_timeout(Duration::from_secs(5))).unwrap();
    }

    #[test]
    fn assert_send_sync() {
        static_assertions::assert_impl_all!(ScheduledPoolExecutor: Send, Sync);
    }
}
