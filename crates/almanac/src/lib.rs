//! A cron dispatcher: parses 7-field (seconds-and-year) cron expressions, keeps scheduled
//! entries on a min-heap ordered by next-run time, and hands ready units to a single consumer
//! over a bounded ready channel.
//!
//! Time zones follow IANA names via [`chrono_tz`]; `""`/`"Local"` resolve to the host's zone.
//! The dispatch loop itself runs on one supervised background thread (started lazily on first
//! [`Dispatcher::ready_channel`] call) that restarts itself if a registered unit's `run` panics
//! while being picked up — though in practice units are handed off rather than run inline, so a
//! panic here would only come from the heap bookkeeping itself.

mod dispatcher;
mod task;

pub use dispatcher::{Dispatcher, RemoveHandle};
pub use task::{resolve_timezone, Clock, CronError, SystemClock};
