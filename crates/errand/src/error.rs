use std::fmt;

/// An error returned synchronously from [`Executor::execute`]/`submit` admission.
///
/// Execution faults (panics, post-run errors) never surface here — they are routed to the
/// configured [`ErrorHandler`][crate::ErrorHandler] instead, per the library's no-error-crosses-
/// a-worker-boundary-implicitly policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ExecutorError {
    /// The pool could not accept more work under its current rejection policy.
    #[error("execution rejected")]
    Rejected,
    /// The pool has been shut down and accepts no further work.
    #[error("executor is shut down")]
    Shutdown,
}

/// The payload recovered from a panicking [`Runnable`][crate::Runnable]/[`Callable`][crate::Callable].
#[derive(Clone)]
pub struct PanicCause(pub(crate) std::sync::Arc<str>);

impl PanicCause {
    /// Builds a `PanicCause` from a `std::panic::catch_unwind` payload.
    #[must_use]
    pub fn from_payload(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self(std::sync::Arc::from(message))
    }

    /// The panic message, downcast from `&str`/`String` where possible.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PanicCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PanicCause").field(&self.0).finish()
    }
}

impl fmt::Display for PanicCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An error observed after a unit of work was already admitted and started running.
///
/// These never flow back through `execute`/`submit`; they are delivered to an
/// [`ErrorHandler`][crate::ErrorHandler].
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum WorkError {
    /// The unit of work panicked; execution was trapped and isolated by the worker wrapper.
    #[error("task panicked: {cause}")]
    Panic {
        /// The recovered panic payload.
        cause: PanicCause,
    },
    /// A downstream admission call (e.g. a timer firing into a shutting-down pool) failed.
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}
