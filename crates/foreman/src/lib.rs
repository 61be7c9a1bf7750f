//! A scheduled executor: composes a bounded worker pool ([`workpool`]), a timer-wheel adapter
//! ([`chime`]) and a cron dispatcher ([`almanac`]) behind one [`ScheduledExecutor`] API.
//!
//! [`PoolBuilder`] is the entry point: `PoolBuilder::new().build()` for a plain pool, or
//! `.build_scheduled()` for one that also understands `schedule`/`schedule_at_fixed_rate`/
//! `schedule_at_cron_rate`.

mod config;
mod executor;
mod traits;

pub use config::{CronRule, PoolBuilder};
pub use executor::{PoolExecutor, ScheduledPoolExecutor};
pub use traits::{ExecutorService, ScheduleCronError, ScheduleHandle, ScheduledExecutor};
