//! A timer-wheel adapter: schedules one-shot and fixed-rate firings that submit a
//! [`errand::Runnable`] into an [`errand::Executor`].
//!
//! Wraps the [`timer`] crate's hashed timing wheel (`timer::Timer` runs its own background
//! thread). The wheel is constructed lazily on first use and never re-armed after
//! [`Chime::shutdown`] — scheduling after shutdown returns [`errand::ExecutorError::Shutdown`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use errand::{Context, ErrorHandler, Executor, ExecutorError, Runnable, WorkError};
use parking_lot::Mutex;

struct State {
    timer: Option<timer::Timer>,
    guards: HashMap<u64, timer::Guard>,
    closed: bool,
}

struct Inner {
    state: Mutex<State>,
    error_handler: Arc<dyn ErrorHandler>,
    next_id: AtomicU64,
}

/// See the [module docs](self) for the contract. Cheap to clone; clones share the same wheel.
#[derive(Clone)]
pub struct Chime {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Chime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Chime")
            .field("armed", &state.guards.len())
            .field("closed", &state.closed)
            .finish()
    }
}

/// A handle that cancels the firing it was returned for.
pub struct CancelHandle {
    chime: Chime,
    id: u64,
}

impl CancelHandle {
    /// Cancels the scheduled firing. Idempotent; canceling twice or after the wheel shut down is
    /// a no-op.
    pub fn cancel(&self) {
        self.chime.inner.state.lock().guards.remove(&self.id);
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle").field("id", &self.id).finish()
    }
}

impl Chime {
    /// Builds a `Chime` reporting forwarded errors to `error_handler`.
    #[must_use]
    pub fn new(error_handler: Arc<dyn ErrorHandler>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    timer: None,
                    guards: HashMap::new(),
                    closed: false,
                }),
                error_handler,
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Schedules `runnable` to be submitted to `executor` once, after `delay`.
    pub fn schedule(
        &self,
        executor: Arc<dyn Executor>,
        runnable: Arc<dyn Runnable>,
        delay: Duration,
    ) -> Result<CancelHandle, ExecutorError> {
        let chrono_delay =
            chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        let error_handler = Arc::clone(&self.inner.error_handler);
        self.arm(move |timer| {
            timer.schedule_with_delay(chrono_delay, move || {
                fire(&executor, &runnable, &error_handler);
            })
        })
    }

    /// Schedules `runnable` to be submitted to `executor` every `period`, first firing at
    /// `now + period`.
    ///
    /// Ticks are coalesced, not caught up: if the consumer falls behind, the next tick simply
    /// arrives late rather than firing multiple times back-to-back.
    pub fn schedule_fixed(
        &self,
        executor: Arc<dyn Executor>,
        runnable: Arc<dyn Runnable>,
        period: Duration,
    ) -> Result<CancelHandle, ExecutorError> {
        let chrono_period =
            chrono::Duration::from_std(period).unwrap_or_else(|_| chrono::Duration::zero());
        let error_handler = Arc::clone(&self.inner.error_handler);
        self.arm(move |timer| {
            timer.schedule_repeating(chrono_period, move || {
                fire(&executor, &runnable, &error_handler);
            })
        })
    }

    fn arm<F>(&self, schedule: F) -> Result<CancelHandle, ExecutorError>
    where
        F: FnOnce(&timer::Timer) -> timer::Guard,
    {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(ExecutorError::Shutdown);
        }

        let timer = state.timer.get_or_insert_with(timer::Timer::new);
        let guard = schedule(timer);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        state.guards.insert(id, guard);

        Ok(CancelHandle {
            chime: self.clone(),
            id,
        })
    }

    /// Stops accepting new schedules and drops the wheel, canceling every outstanding firing.
    ///
    /// Does not attempt to let in-flight firings (already submitted to the pool) finish; that is
    /// the owning executor's job.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        state.closed = true;
        state.guards.clear();
        state.timer = None;
    }
}

fn fire(executor: &Arc<dyn Executor>, runnable: &Arc<dyn Runnable>, error_handler: &Arc<dyn ErrorHandler>) {
    match executor.execute(Arc::clone(runnable)) {
        Ok(()) => {}
        Err(ExecutorError::Shutdown) => {
            tracing::debug!("dropped a timer firing: executor is shut down");
        }
        Err(err) => {
            error_handler.handle(WorkError::Executor(err));
        }
    }
}
