//! Shared contracts for the task execution library: the cancellation [`Context`], the
//! [`Runnable`]/[`Callable`] unit-of-work traits, the [`Executor`] surface, and the
//! admission/error-handling policies every other crate in this workspace builds on.

mod context;
mod error;
mod handlers;
mod unit;

pub use context::{Context, ContextError};
pub use error::{ExecutorError, PanicCause, WorkError};
pub use handlers::{
    CallerRunsPolicy, DiscardErrorHandler, DiscardPolicy, ErrorHandler, Executor,
    LoggingErrorHandler, RejectedPolicy, RejectionHandler,
};
pub use unit::{Callable, CallError, Runnable, callable, runnable};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assert_send_sync() {
        static_assertions::assert_impl_all!(Context: Send, Sync, Clone);
        static_assertions::assert_impl_all!(ExecutorError: Send, Sync);
    }
}
