//! A bounded worker pool: `max_concurrent` permits, an optional bounded admission queue, a
//! configurable rejection policy, panic-isolated workers, and graceful shutdown.
//!
//! [`WorkerPool`] implements [`errand::Executor`] directly; [`WorkerPool::submit`] additionally
//! wraps a [`errand::Callable`] in a [`taskfuture::TaskFuture`] before admitting it, giving the
//! caller a handle to block on or attach callbacks to.

mod config;
mod pool;

pub use config::PoolConfig;
pub use pool::WorkerPool;
