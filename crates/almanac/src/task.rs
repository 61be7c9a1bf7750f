use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, DurationRound, Utc};
use chrono_tz::Tz;
use errand::Runnable;

/// The reason a cron registration was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum CronError {
    /// The cron expression failed to parse.
    #[error("invalid cron expression")]
    InvalidCronExpr,
    /// The timezone name is not a recognised IANA zone (or the host's local zone could not be
    /// resolved when `""`/`"Local"` was requested).
    #[error("invalid cron timezone")]
    InvalidCronTimezone,
}

/// Where the current time comes from. Abstracted so dispatcher tests can pin "now" instead of
/// racing the system clock.
pub trait Clock: Send + Sync {
    /// The current instant, in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// The default [`Clock`], backed by [`chrono::Utc::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Resolves a cron timezone name. Empty string or `"Local"` (case-insensitive) resolves to the
/// host's IANA zone via [`iana_time_zone`], falling back to UTC if the platform can't report one.
pub fn resolve_timezone(name: &str) -> Result<Tz, CronError> {
    let resolved = if name.is_empty() || name.eq_ignore_ascii_case("local") {
        iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string())
    } else {
        name.to_string()
    };
    Tz::from_str(&resolved).map_err(|_| CronError::InvalidCronTimezone)
}

/// A registered cron entry: the parsed schedule, the runnable it fires, and its last/next run
/// times in its own timezone.
pub(crate) struct CronTask {
    pub(crate) id: u64,
    pub(crate) unit: Arc<dyn Runnable>,
    pub(crate) tz: Tz,
    expr: cron::Schedule,
    pub(crate) next_run: DateTime<Tz>,
    last_run: DateTime<Tz>,
}

impl CronTask {
    /// Builds a task whose `next_run` starts at `now`, then immediately advances it once so the
    /// first real fire time is `expr.after(now)` truncated to the second.
    pub(crate) fn new(
        id: u64,
        unit: Arc<dyn Runnable>,
        expr_src: &str,
        tz: Tz,
        now: DateTime<Tz>,
    ) -> Result<Self, CronError> {
        let expr = cron::Schedule::from_str(expr_src).map_err(|_| CronError::InvalidCronExpr)?;
        let mut task = Self {
            id,
            unit,
            tz,
            expr,
            next_run: now,
            last_run: now,
        };
        task.schedule_next_run();
        Ok(task)
    }

    pub(crate) fn ready(&self, now: DateTime<Tz>) -> bool {
        self.next_run <= now
    }

    pub(crate) fn until_next_run(&self, now: DateTime<Tz>) -> Duration {
        if self.ready(now) {
            return Duration::ZERO;
        }
        (self.next_run - now).to_std().unwrap_or(Duration::ZERO)
    }

    pub(crate) fn schedule_next_run(&mut self) {
        self.last_run = self.next_run;
        self.next_run = self
            .expr
            .after(&self.last_run)
            .next()
            .map(|t| t.duration_trunc(chrono::Duration::seconds(1)).unwrap_or(t))
            .unwrap_or(self.last_run);
    }
}
