//! A one-shot, interruptible sleep primitive.
//!
//! `Sleeper` mirrors the `sleeper` package of the library this was distilled from: a single
//! pending wakeup collapses any number of concurrent [`Sleeper::wakeup`] calls into one consumed
//! wake, and [`Sleeper::sleep`] returns as soon as either the requested duration elapses or a
//! wakeup lands.
//!
//! Not safe for concurrent sleepers: at most one thread should call [`Sleeper::sleep`] at a time
//! (the cron dispatch loop in `almanac` is the only intended caller). Calling [`Sleeper::wakeup`]
//! from any number of threads is fine.

use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError, TrySendError};
use std::time::Duration;

/// See the [module docs](self) for the contract.
#[derive(Debug)]
pub struct Sleeper {
    tx: SyncSender<()>,
    rx: Receiver<()>,
}

impl Sleeper {
    /// Creates a new sleeper with no pending wakeup.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::sync_channel(1);
        Self { tx, rx }
    }

    /// Wakes up the sleeper.
    ///
    /// Non-blocking and idempotent: if a wakeup is already pending, this call is a no-op rather
    /// than blocking or queuing a second one.
    pub fn wakeup(&self) {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                unreachable!("Sleeper owns both ends of its channel")
            }
        }
    }

    /// Sleeps for `duration`, returning early if a wakeup arrived since the last call to `sleep`.
    pub fn sleep(&self, duration: Duration) {
        // Drain any stale wakeup that arrived before this call so we don't return instantly for
        // a wakeup that a previous `sleep` should have consumed (defensive; the normal calling
        // pattern never leaves one behind).
        match self.rx.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => unreachable!("Sleeper owns both ends"),
        }

        let _ = self.rx.recv_timeout(duration);
    }
}

impl Default for Sleeper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::Sleeper;

    #[test]
    fn sleep_returns_after_duration_without_wakeup() {
        let sleeper = Sleeper::new();
        let start = Instant::now();
        sleeper.sleep(Duration::from_millis(30));
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn wakeup_before_sleep_is_consumed_immediately() {
        let sleeper = Sleeper::new();
        sleeper.wakeup();
        let start = Instant::now();
        sleeper.sleep(Duration::from_secs(10));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn multiple_wakeups_collapse_into_one() {
        let sleeper = Sleeper::new();
        sleeper.wakeup();
        sleeper.wakeup();
        sleeper.wakeup();

        // Consumes the single collapsed wakeup.
        sleeper.sleep(Duration::from_secs(10));

        // No wakeup remains pending, so this call should honor the full duration.
        let start = Instant::now();
        sleeper.sleep(Duration::from_millis(30));
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn wakeup_during_sleep_interrupts_it() {
        let sleeper = Arc::new(Sleeper::new());
        let waker = Arc::clone(&sleeper);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            waker.wakeup();
        });

        let start = Instant::now();
        sleeper.sleep(Duration::from_secs(10));
        assert!(start.elapsed() < Duration::from_secs(1));

        handle.join().unwrap();
    }

    #[test]
    fn assert_send_sync() {
        static_assertions::assert_impl_all!(Sleeper: Send, Sync);
    }
}
