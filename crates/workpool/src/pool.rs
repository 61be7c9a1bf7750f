use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use errand::{
    Callable, Context, ContextError, ExecutorError, PanicCause, Runnable, WorkError,
};
use parking_lot::{Condvar, Mutex};
use taskfuture::TaskFuture;

use crate::PoolConfig;

const RUNNING: u8 = 0;
const CLOSED: u8 = 1;

/// How often [`WorkerPool::shutdown`] re-checks its context while waiting for in-flight work to
/// drain. See [`taskfuture::TaskFuture::get`]'s equivalent constant for the same rationale.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(20);

struct Admission {
    free_permits: usize,
    queued_waiters: usize,
}

struct Inner {
    threads: threadpool::ThreadPool,
    state: AtomicU8,
    admission: Mutex<Admission>,
    permit_freed: Condvar,
    config: PoolConfig,
    inflight: AtomicUsize,
    drain_lock: Mutex<()>,
    drain: Condvar,
}

/// A bounded worker pool: `max_concurrent` OS worker threads, an optional bounded admission
/// queue, and a configurable rejection policy for overflow.
///
/// Cheap to clone (an `Arc` internally); every clone shares the same threads and admission state.
/// Implements [`errand::Executor`] and the generic [`ExecutorService`] submit extension.
pub struct WorkerPool {
    inner: Arc<Inner>,
}

impl Clone for WorkerPool {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("state", &self.inner.state.load(Ordering::Relaxed))
            .field("inflight", &self.inner.inflight.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Builds a pool with `config.max_concurrent` worker threads, at least one.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        let thread_count = config.max_concurrent.max(1);
        let threads = threadpool::Builder::new()
            .num_threads(thread_count)
            .thread_name("workpool-worker".to_string())
            .build();

        Self {
            inner: Arc::new(Inner {
                threads,
                state: AtomicU8::new(RUNNING),
                admission: Mutex::new(Admission {
                    free_permits: config.max_concurrent,
                    queued_waiters: 0,
                }),
                permit_freed: Condvar::new(),
                config,
                inflight: AtomicUsize::new(0),
                drain_lock: Mutex::new(()),
                drain: Condvar::new(),
            }),
        }
    }

    /// Submits `callable` wrapped in a [`TaskFuture`], then admits it exactly like [`execute`].
    ///
    /// [`execute`]: errand::Executor::execute
    pub fn submit<T>(
        &self,
        callable: Arc<dyn Callable<T>>,
    ) -> Result<Arc<TaskFuture<T>>, ExecutorError>
    where
        T: Send + 'static,
    {
        let future = TaskFuture::new(callable);
        errand::Executor::execute(self, future.clone())?;
        Ok(future)
    }

    /// Stops accepting new work and blocks until every in-flight and queued invocation drains,
    /// honouring `ctx`'s deadline/cancellation.
    ///
    /// If `ctx` is cancelled before the drain completes, this returns the context's error
    /// immediately; draining continues in the background regardless.
    pub fn shutdown(&self, ctx: &Context) -> Result<(), ContextError> {
        self.inner.state.store(CLOSED, Ordering::Release);
        self.inner.permit_freed.notify_all();

        let mut guard = self.inner.drain_lock.lock();
        loop {
            if self.inner.inflight.load(Ordering::SeqCst) == 0 {
                return Ok(());
            }
            if let Some(err) = ctx.err() {
                return Err(err);
            }

            let wait = match ctx.deadline() {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        Duration::ZERO
                    } else {
                        DRAIN_POLL_INTERVAL.min(deadline - now)
                    }
                }
                None => DRAIN_POLL_INTERVAL,
            };
            self.inner.drain.wait_for(&mut guard, wait);
        }
    }

    fn dispatch(&self, runnable: Arc<dyn Runnable>) {
        self.inner.inflight.fetch_add(1, Ordering::SeqCst);
        let pool = self.clone();
        let deadline = self.inner.config.execute_timeout;

        self.inner.threads.execute(move || {
            let ctx = match deadline {
                Some(timeout) => Context::with_timeout(timeout),
                None => Context::background(),
            };

            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| runnable.run(&ctx)));
            if let Err(payload) = outcome {
                let cause = PanicCause::from_payload(payload.as_ref());
                tracing::warn!(cause = %cause, "recovered panic in worker pool task");
                pool.inner
                    .config
                    .error_handler
                    .handle(WorkError::Panic { cause });
            }

            pool.release_permit();
        });
    }

    fn release_permit(&self) {
        {
            let mut admission = self.inner.admission.lock();
            admission.free_permits += 1;
        }
        self.inner.permit_freed.notify_one();

        if self.inner.inflight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.drain.notify_all();
        }
    }
}

impl errand::Executor for WorkerPool {
    fn execute(&self, runnable: Arc<dyn Runnable>) -> Result<(), ExecutorError> {
        if self.inner.state.load(Ordering::Acquire) == CLOSED {
            return Err(ExecutorError::Shutdown);
        }

        let mut admission = self.inner.admission.lock();

        if admission.free_permits > 0 {
            admission.free_permits -= 1;
            drop(admission);
            self.dispatch(runnable);
            tracing::debug!("admitted task onto a free worker permit");
            return Ok(());
        }

        if admission.queued_waiters < self.inner.config.max_blocking_tasks {
            admission.queued_waiters += 1;
            loop {
                if self.inner.state.load(Ordering::Acquire) == CLOSED {
                    admission.queued_waiters -= 1;
                    return Err(ExecutorError::Shutdown);
                }
                if admission.free_permits > 0 {
                    admission.free_permits -= 1;
                    admission.queued_waiters -= 1;
                    drop(admission);
                    self.dispatch(runnable);
                    tracing::debug!("admitted task after blocking for a permit");
                    return Ok(());
                }
                self.inner.permit_freed.wait(&mut admission);
            }
        }

        drop(admission);
        tracing::debug!("pool saturated, invoking rejection handler");
        self.inner.config.rejection_handler.reject(runnable, self)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::thread;
    use std::time::Duration;

    use errand::{DiscardErrorHandler, ErrorHandler, Executor, callable, runnable};

    use super::*;

    #[derive(Debug, Default)]
    struct RecordingErrorHandler {
        count: AtomicUsize,
        last_message: Mutex<Option<String>>,
    }

    impl ErrorHandler for RecordingErrorHandler {
        fn handle(&self, error: WorkError) {
            self.count.fetch_add(1, AtomicOrdering::SeqCst);
            *self.last_message.lock() = Some(error.to_string());
        }
    }

    #[test]
    fn execute_runs_the_runnable() {
        let pool = WorkerPool::new(PoolConfig {
            max_concurrent: 2,
            ..Default::default()
        });
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = Arc::clone(&ran);
        pool.execute(runnable(move |_ctx| {
            ran2.fetch_add(1, AtomicOrdering::SeqCst);
        }))
        .unwrap();

        thread::sleep(Duration::from_millis(50));
        assert_eq!(ran.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn submit_returns_a_future_with_the_result() {
        let pool = WorkerPool::new(PoolConfig::default());
        let future = pool
            .submit(callable(|_ctx| Ok::<_, errand::CallError>(42)))
            .unwrap();
        assert_eq!(future.get(&Context::background()).unwrap(), 42);
    }

    #[test]
    fn bounded_concurrency_never_exceeded() {
        let max_concurrent = 3;
        let pool = WorkerPool::new(PoolConfig {
            max_concurrent,
            max_blocking_tasks: 50,
            ..Default::default()
        });

        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let active2 = Arc::clone(&active);
            let peak2 = Arc::clone(&peak);
            pool.execute(runnable(move |_ctx| {
                let now = active2.fetch_add(1, AtomicOrdering::SeqCst) + 1;
                peak2.fetch_max(now, AtomicOrdering::SeqCst);
                thread::sleep(Duration::from_millis(20));
                active2.fetch_sub(1, AtomicOrdering::SeqCst);
            }))
            .unwrap();
        }

        let ctx = Context::with_timeout(Duration::from_secs(5));
        pool.shutdown(&ctx).unwrap();
        assert!(peak.load(AtomicOrdering::SeqCst) <= max_concurrent);
    }

    #[test]
    fn panic_is_trapped_and_reported_once() {
        let handler = Arc::new(RecordingErrorHandler::default());
        let pool = WorkerPool::new(PoolConfig {
            error_handler: handler.clone(),
            ..Default::default()
        });

        pool.execute(runnable(|_ctx| panic!("test")))
            .expect("submission itself should succeed");

        let ctx = Context::with_timeout(Duration::from_secs(5));
        pool.shutdown(&ctx).unwrap();

        assert_eq!(handler.count.load(AtomicOrdering::SeqCst), 1);
        assert!(
            handler
                .last_message
                .lock()
                .as_ref()
                .unwrap()
                .contains("test")
        );

        // Further submissions to a now-closed pool are rejected, but the handler was not
        // touched again by the first panic.
        let err = pool.execute(runnable(|_ctx| {})).unwrap_err();
        assert_eq!(err, ExecutorError::Shutdown);
    }

    #[test]
    fn saturated_pool_with_no_queue_is_rejected() {
        let pool = WorkerPool::new(PoolConfig {
            max_concurrent: 1,
            max_blocking_tasks: 0,
            error_handler: Arc::new(DiscardErrorHandler),
            ..Default::default()
        });

        let gate = Arc::new(std::sync::Barrier::new(2));
        let gate2 = Arc::clone(&gate);
        pool.execute(runnable(move |_ctx| {
            gate2.wait();
        }))
        .unwrap();

        // Give the first task a chance to claim the only permit before we saturate further.
        thread::sleep(Duration::from_millis(20));

        let err = pool.execute(runnable(|_ctx| {})).unwrap_err();
        assert_eq!(err, ExecutorError::Rejected);

        gate.wait();
    }

    #[test]
    fn shutdown_waits_for_in_flight_work_to_drain() {
        let pool = WorkerPool::new(PoolConfig {
            max_concurrent: 4,
            ..Default::default()
        });
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            let done2 = Arc::clone(&done);
            pool.execute(runnable(move |_ctx| {
                thread::sleep(Duration::from_millis(40));
                done2.fetch_add(1, AtomicOrdering::SeqCst);
            }))
            .unwrap();
        }

        pool.shutdown(&Context::with_timeout(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(done.load(AtomicOrdering::SeqCst), 4);
    }

    #[test]
    fn cancelled_shutdown_context_returns_its_error_without_waiting_forever() {
        let pool = WorkerPool::new(PoolConfig::default());
        pool.execute(runnable(|_ctx| thread::sleep(Duration::from_secs(5))))
            .unwrap();

        let ctx = Context::background();
        ctx.cancel();
        let err = pool.shutdown(&ctx).unwrap_err();
        assert_eq!(err, ContextError::Canceled);
    }

    #[test]
    fn assert_send_sync() {
        static_assertions::assert_impl_all!(WorkerPool: Send, Sync, Clone);
    }
}
