use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use crate::Context;

/// A unit of work that produces no result.
///
/// Implementors should observe `ctx` cooperatively: if [`Context::is_cancelled`] becomes true
/// mid-run (e.g. an `execute_timeout` deadline passed), a well-behaved `Runnable` returns
/// promptly instead of continuing to do work.
pub trait Runnable: Send + Sync {
    /// Runs the unit of work.
    fn run(&self, ctx: &Context);
}

/// Adapts a plain closure into a [`Runnable`].
struct RunnableFn<F>(F);

impl<F> Runnable for RunnableFn<F>
where
    F: Fn(&Context) + Send + Sync,
{
    fn run(&self, ctx: &Context) {
        (self.0)(ctx);
    }
}

impl<F> fmt::Debug for RunnableFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnableFn").finish_non_exhaustive()
    }
}

/// Wraps a closure as a reference-counted [`Runnable`], ready to hand to an executor.
#[must_use]
pub fn runnable<F>(f: F) -> Arc<dyn Runnable>
where
    F: Fn(&Context) + Send + Sync + 'static,
{
    Arc::new(RunnableFn(f))
}

/// The error a [`Callable`] reports when it fails to produce a value.
///
/// This wraps the caller-supplied failure; it is distinct from [`crate::ExecutorError`], which
/// describes admission-time failures, and from a future's cancellation outcome, which the
/// `taskfuture` crate layers on top.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct CallError(#[from] Box<dyn StdError + Send + Sync>);

impl CallError {
    /// Wraps any boxable error as a `CallError`.
    pub fn new<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self(Box::new(err))
    }
}

/// A unit of work that produces a typed result.
pub trait Callable<T>: Send + Sync {
    /// Runs the unit of work to completion, or fails with a [`CallError`].
    fn call(&self, ctx: &Context) -> Result<T, CallError>;
}

struct CallableFn<F>(F);

impl<F, T> Callable<T> for CallableFn<F>
where
    F: Fn(&Context) -> Result<T, CallError> + Send + Sync,
{
    fn call(&self, ctx: &Context) -> Result<T, CallError> {
        (self.0)(ctx)
    }
}

impl<F> fmt::Debug for CallableFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallableFn").finish_non_exhaustive()
    }
}

/// Wraps a closure as a reference-counted [`Callable`].
#[must_use]
pub fn callable<F, T>(f: F) -> Arc<dyn Callable<T>>
where
    F: Fn(&Context) -> Result<T, CallError> + Send + Sync + 'static,
    T: 'static,
{
    Arc::new(CallableFn(f))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runnable_closure_runs() {
        let flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag2 = Arc::clone(&flag);
        let r = runnable(move |_ctx| flag2.store(true, std::sync::atomic::Ordering::SeqCst));
        r.run(&Context::background());
        assert!(flag.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn callable_closure_returns_value() {
        let c: Arc<dyn Callable<i32>> = callable(|_ctx| Ok(42));
        assert_eq!(c.call(&Context::background()).unwrap(), 42);
    }

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    #[test]
    fn callable_closure_returns_error() {
        let c: Arc<dyn Callable<i32>> = callable(|_ctx| Err(CallError::new(Boom)));
        let err = c.call(&Context::background()).unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
