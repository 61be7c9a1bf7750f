//! A cancellable future/result handle layered on top of [`errand::Callable`].
//!
//! [`TaskFuture<T>`] is a `Runnable` that wraps a `Callable<T>`: a worker pool submits it exactly
//! like any other unit of work, and callers hold onto the `Arc<TaskFuture<T>>` to block for the
//! result, attach completion callbacks, or cancel it before it starts.
//!
//! The state machine is the five states `future.go`/`future_task.go` use: `NEW`, the transient
//! `COMPLETING` latch, and the terminal `NORMAL` / `CANCELED` / `ERROR` states. A future moves
//! `NEW -> COMPLETING -> {NORMAL, ERROR}` when its callable returns, or `NEW -> CANCELED` directly
//! when [`TaskFuture::cancel`] wins the race before the callable runs to completion. At most one
//! of those terminal transitions ever succeeds.
//!
//! The value/error slots are published by the store that lands on a terminal state (`Release`)
//! and only read by threads that first observe that terminal state (`Acquire`); the completion
//! signal is an [`event_listener::Event`] fired exactly once.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use errand::{CallError, Callable, Context, ContextError, Runnable};
use event_listener::Event;
use parking_lot::Mutex;

const NEW: u8 = 0;
const COMPLETING: u8 = 1;
const NORMAL: u8 = 2;
const CANCELED: u8 = 3;
const ERROR: u8 = 4;

/// How long [`TaskFuture::get`] sleeps between checks of the caller's context for cancellation.
///
/// `get` has no single primitive to wait on both "this future completed" and "the caller's
/// context was canceled" at once, so it polls the caller's context at this granularity while
/// parked on the future's own completion event. Short enough that cancellation latency is
/// unnoticeable in practice, long enough to not spin.
const CONTEXT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// The outcome reported by [`TaskFuture::get`] and delivered to `catch` callbacks.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum GetError {
    /// The wrapped [`Callable`] returned an error.
    #[error(transparent)]
    Call(Arc<CallError>),
    /// The future was canceled before it completed.
    #[error("future was canceled")]
    Canceled,
    /// The caller's context was canceled or its deadline passed while waiting.
    #[error(transparent)]
    Context(#[from] ContextError),
}

#[derive(Default)]
struct CallbackRegistry<T> {
    then_cbs: Vec<Box<dyn Fn(&T) + Send + Sync>>,
    catch_cbs: Vec<Box<dyn Fn(&GetError) + Send + Sync>>,
    drained: bool,
}

/// A cancellable handle to the eventual result of a [`Callable<T>`].
///
/// Construct with [`TaskFuture::new`] and hand the returned `Arc` to an
/// [`errand::Executor`][errand::Executor] — `TaskFuture` implements [`Runnable`] itself. The same
/// `Arc` is the caller's handle for [`TaskFuture::get`], [`TaskFuture::cancel`], and the `then`/
/// `catch` callbacks.
pub struct TaskFuture<T> {
    state: AtomicU8,
    value: Mutex<Option<Arc<T>>>,
    error: Mutex<Option<GetError>>,
    callable: Arc<dyn Callable<T>>,
    run_ctx: Mutex<Option<Context>>,
    done: Event,
    callbacks: Mutex<CallbackRegistry<T>>,
}

impl<T> std::fmt::Debug for TaskFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskFuture")
            .field("state", &self.state.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> TaskFuture<T> {
    /// Wraps `callable` in a new, not-yet-run future.
    #[must_use]
    pub fn new(callable: Arc<dyn Callable<T>>) -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(NEW),
            value: Mutex::new(None),
            error: Mutex::new(None),
            callable,
            run_ctx: Mutex::new(None),
            done: Event::new(),
            callbacks: Mutex::new(CallbackRegistry::default()),
        })
    }

    /// Whether the future has reached any terminal state.
    #[must_use]
    pub fn completed(&self) -> bool {
        self.state.load(Ordering::Acquire) >= NORMAL
    }

    /// Whether the future was canceled.
    #[must_use]
    pub fn canceled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELED
    }

    /// Whether the future completed with an error (including cancellation).
    #[must_use]
    pub fn completed_with_error(&self) -> bool {
        matches!(self.state.load(Ordering::Acquire), CANCELED | ERROR)
    }

    /// Attempts to cancel the future.
    ///
    /// Succeeds only if the future has not yet reached a terminal state, i.e. `NEW -> CANCELED`.
    /// If a run is already in flight, the context handle it was given is also canceled as a
    /// best-effort attempt to stop the callable; the callable itself must still observe
    /// `ctx.is_cancelled()` to actually stop early. Returns whether the cancellation took effect.
    pub fn cancel(&self) -> bool {
        if self
            .state
            .compare_exchange(NEW, CANCELED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        if let Some(handle) = self.run_ctx.lock().clone() {
            handle.cancel();
        }
        *self.error.lock() = Some(GetError::Canceled);
        self.done.notify(usize::MAX);
        self.fire_callbacks();
        true
    }

    fn complete_value(&self, value: T) {
        if self
            .state
            .compare_exchange(NEW, COMPLETING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        *self.value.lock() = Some(Arc::new(value));
        self.state.store(NORMAL, Ordering::Release);
        self.done.notify(usize::MAX);
        self.fire_callbacks();
    }

    fn complete_error(&self, err: GetError) {
        if self
            .state
            .compare_exchange(NEW, COMPLETING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        *self.error.lock() = Some(err);
        self.state.store(ERROR, Ordering::Release);
        self.done.notify(usize::MAX);
        self.fire_callbacks();
    }

    fn fire_callbacks(&self) {
        let (then_cbs, catch_cbs) = {
            let mut reg = self.callbacks.lock();
            reg.drained = true;
            (
                std::mem::take(&mut reg.then_cbs),
                std::mem::take(&mut reg.catch_cbs),
            )
        };

        match self.state.load(Ordering::Acquire) {
            NORMAL => {
                // Snapshot the Arc and release the lock before invoking callbacks, so a callback
                // that re-enters this future (e.g. calls `get`) can't deadlock on this mutex.
                let value = self.value.lock().clone();
                if let Some(value) = value {
                    for cb in &then_cbs {
                        cb(&value);
                    }
                }
            }
            CANCELED | ERROR => {
                let err = self.error.lock().clone();
                if let Some(err) = err {
                    for cb in &catch_cbs {
                        cb(&err);
                    }
                }
            }
            _ => tracing::error!("fire_callbacks invoked before a terminal transition"),
        }
    }

    /// Registers a callback invoked exactly once, when the future completes successfully.
    ///
    /// If the future already completed successfully, `f` runs synchronously on the calling
    /// thread before this call returns. If the future already completed with an error or was
    /// canceled, `f` is dropped without running. Never runs more than once.
    pub fn then<F>(&self, f: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut reg = self.callbacks.lock();
        if reg.drained {
            drop(reg);
            let value = self.value.lock().clone();
            if let Some(value) = value {
                f(&value);
            }
        } else {
            reg.then_cbs.push(Box::new(f));
        }
    }

    /// Registers a callback invoked exactly once, when the future completes with an error or is
    /// canceled. See [`TaskFuture::then`] for the late-registration contract.
    pub fn catch<F>(&self, f: F)
    where
        F: Fn(&GetError) + Send + Sync + 'static,
    {
        let mut reg = self.callbacks.lock();
        if reg.drained {
            drop(reg);
            let err = self.error.lock().clone();
            if let Some(err) = err {
                f(&err);
            }
        } else {
            reg.catch_cbs.push(Box::new(f));
        }
    }
}

impl<T: Clone + Send + 'static> TaskFuture<T> {
    /// Blocks until the future completes, is canceled, or `ctx` is canceled/its deadline passes.
    ///
    /// Returns a clone of the completed value, or the recorded error. If `ctx` stops the wait
    /// before the future completes, this also cancels the context the in-flight callable (if any)
    /// was given, as a best-effort attempt to stop it.
    pub fn get(&self, ctx: &Context) -> Result<T, GetError> {
        loop {
            if let Some(result) = self.report() {
                return result;
            }

            if let Some(err) = ctx.err() {
                if let Some(handle) = self.run_ctx.lock().clone() {
                    handle.cancel();
                }
                return Err(GetError::Context(err));
            }

            let listener = self.done.listen();

            if let Some(result) = self.report() {
                return result;
            }

            let wait = match ctx.deadline() {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        Duration::ZERO
                    } else {
                        CONTEXT_POLL_INTERVAL.min(deadline - now)
                    }
                }
                None => CONTEXT_POLL_INTERVAL,
            };
            listener.wait_timeout(wait);
        }
    }

    fn report(&self) -> Option<Result<T, GetError>> {
        match self.state.load(Ordering::Acquire) {
            NORMAL => {
                let value = self.value.lock().clone().expect("value set before NORMAL");
                Some(Ok((*value).clone()))
            }
            CANCELED | ERROR => Some(Err(self
                .error
                .lock()
                .clone()
                .expect("error set before a terminal error state"))),
            _ => None,
        }
    }
}

impl<T: Send + 'static> Runnable for TaskFuture<T> {
    /// Runs the wrapped callable, unless the future already left `NEW` (e.g. it was canceled).
    ///
    /// Must be called at most once per future; a second call after completion is a silent no-op,
    /// and a second call racing the first has no effect beyond the first's outcome winning.
    fn run(&self, ctx: &Context) {
        if self.state.load(Ordering::Acquire) != NEW {
            return;
        }

        let child = ctx.clone();
        *self.run_ctx.lock() = Some(child.clone());

        match self.callable.call(&child) {
            Ok(value) => self.complete_value(value),
            Err(err) => self.complete_error(GetError::Call(Arc::new(err))),
        }
    }
}
