use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use event_listener::Event;

/// The reason a [`Context`] stopped being usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ContextError {
    /// [`Context::cancel`] was called.
    #[error("context canceled")]
    Canceled,
    /// The context's deadline elapsed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug)]
struct Inner {
    canceled: AtomicBool,
    deadline: Option<Instant>,
    done: Event,
}

/// A cancellable, optionally deadline-bound handle passed to every [`Runnable`][crate::Runnable]
/// and [`Callable`][crate::Callable] invocation.
///
/// `Context` is the Rust stand-in for the cancellation/deadline plumbing that the source
/// implementation threads through `context.Context`. It is cheap to clone (an `Arc` internally)
/// and every clone observes the same cancellation state.
#[derive(Debug, Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    /// A context that never cancels on its own.
    #[must_use]
    pub fn background() -> Self {
        Self {
            inner: Arc::new(Inner {
                canceled: AtomicBool::new(false),
                deadline: None,
                done: Event::new(),
            }),
        }
    }

    /// A context whose deadline is `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                canceled: AtomicBool::new(false),
                deadline: Some(Instant::now() + timeout),
                done: Event::new(),
            }),
        }
    }

    /// The deadline, if any, attached to this context.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Whether the context has been canceled or its deadline has passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.canceled.load(Ordering::Acquire) || self.deadline_elapsed()
    }

    fn deadline_elapsed(&self) -> bool {
        self.inner.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Returns the reason the context is done, or `None` if it is still live.
    #[must_use]
    pub fn err(&self) -> Option<ContextError> {
        if self.inner.canceled.load(Ordering::Acquire) {
            Some(ContextError::Canceled)
        } else if self.deadline_elapsed() {
            Some(ContextError::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Cancels the context and wakes every thread blocked in [`Context::wait_done`].
    ///
    /// Idempotent: canceling an already-done context is a no-op beyond the wakeup.
    pub fn cancel(&self) {
        self.inner.canceled.store(true, Ordering::Release);
        self.inner.done.notify(usize::MAX);
    }

    /// Blocks the calling thread until the context is canceled or its deadline passes.
    ///
    /// A context with neither an explicit cancellation nor a deadline blocks forever, matching
    /// a `Background` Go context whose `Done()` channel is never closed.
    pub fn wait_done(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }

            let listener = self.inner.done.listen();

            if self.is_cancelled() {
                return;
            }

            match self.inner.deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return;
                    }
                    // Spurious wakeups just loop back around and re-check is_cancelled().
                    listener.wait_timeout(deadline - now);
                }
                None => listener.wait(),
            }
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}
