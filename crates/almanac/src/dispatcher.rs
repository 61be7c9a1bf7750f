use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Once};
use std::thread;
use std::time::Duration;

use chrono::TimeZone;
use errand::{PanicCause, Runnable};
use parking_lot::Mutex;
use sleeper::Sleeper;

use crate::task::{resolve_timezone, Clock, CronError, CronTask, SystemClock};

/// Upper bound on how long the dispatch loop sleeps between checks of the heap's head, even if
/// the head's next run is further out (or the heap is empty). Caps worst-case drift if the
/// system clock jumps forward. The reference implementation this was adapted from uses one
/// minute for this bound.
const MAX_YIELD: Duration = Duration::from_secs(60);

struct HeapEntry(CronTask);

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.next_run == other.0.next_run
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.next_run.cmp(&other.0.next_run)
    }
}

struct State {
    heap: BinaryHeap<Reverse<HeapEntry>>,
    closed: bool,
}

struct Inner {
    state: Mutex<State>,
    sleeper: Sleeper,
    ready_tx: Mutex<Option<SyncSender<Arc<dyn Runnable>>>>,
    ready_rx: Mutex<Option<Receiver<Arc<dyn Runnable>>>>,
    loop_started: Once,
    next_id: AtomicU64,
    clock: Arc<dyn Clock>,
}

/// A cron dispatcher: a min-heap of scheduled tasks keyed by next-run time, drained by a single
/// supervised background thread into a bounded (capacity 1) ready channel.
///
/// Cheap to clone; every clone shares the same heap, loop, and ready channel.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Dispatcher")
            .field("pending", &state.heap.len())
            .field("closed", &state.closed)
            .finish()
    }
}

/// A handle that removes the task it was returned for from the dispatcher's heap.
pub struct RemoveHandle {
    dispatcher: Dispatcher,
    id: u64,
}

impl RemoveHandle {
    /// Removes the associated task. A task already fired-and-rescheduled, or already removed, is
    /// simply not found; this is not an error.
    pub fn remove(&self) {
        let mut state = self.dispatcher.inner.state.lock();
        let remaining: Vec<HeapEntry> = std::mem::take(&mut state.heap)
            .into_iter()
            .map(|Reverse(entry)| entry)
            .filter(|entry| entry.0.id != self.id)
            .collect();
        state.heap = remaining.into_iter().map(Reverse).collect();
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Builds a dispatcher backed by the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Builds a dispatcher backed by a custom [`Clock`], useful for deterministic tests.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    heap: BinaryHeap::new(),
                    closed: false,
                }),
                sleeper: Sleeper::new(),
                ready_tx: Mutex::new(Some(ready_tx)),
                ready_rx: Mutex::new(Some(ready_rx)),
                loop_started: Once::new(),
                next_id: AtomicU64::new(0),
                clock,
            }),
        }
    }

    /// Registers `unit` on the cron schedule `expr`, interpreted in `timezone` (empty or
    /// `"Local"` resolves to the host's IANA zone). Returns a handle to remove it later.
    pub fn add_task(
        &self,
        unit: Arc<dyn Runnable>,
        expr: &str,
        timezone: &str,
    ) -> Result<RemoveHandle, CronError> {
        let tz = resolve_timezone(timezone)?;
        let now = self.inner.clock.now().with_timezone(&tz);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let task = CronTask::new(id, unit, expr, tz, now)?;

        self.inner.state.lock().heap.push(Reverse(HeapEntry(task)));
        self.inner.sleeper.wakeup();

        Ok(RemoveHandle {
            dispatcher: self.clone(),
            id,
        })
    }

    /// Returns the ready-task receiver, starting the dispatch loop on first call.
    ///
    /// The dispatcher has exactly one intended consumer (the scheduled executor's pump thread);
    /// calling this more than once panics.
    pub fn ready_channel(&self) -> Receiver<Arc<dyn Runnable>> {
        self.inner.loop_started.call_once(|| {
            let inner = Arc::clone(&self.inner);
            run_supervised(move || dispatch_loop(&inner));
        });

        self.inner
            .ready_rx
            .lock()
            .take()
            .expect("ready_channel must be called exactly once")
    }

    /// Signals the dispatch loop to stop after its current iteration.
    pub fn shutdown(&self) {
        self.inner.state.lock().closed = true;
        self.inner.sleeper.wakeup();
    }
}

fn dispatch_loop(inner: &Arc<Inner>) {
    loop {
        if inner.state.lock().closed {
            // Dropping the sender disconnects the receiver, so the consumer's `recv`/iteration
            // ends on its own instead of blocking forever on a channel nothing will send on again.
            inner.ready_tx.lock().take();
            tracing::debug!("cron dispatcher loop exiting");
            return;
        }

        let (yield_for, fired) = take_ready_task(inner);
        if !fired {
            inner.sleeper.sleep(yield_for);
        }
    }
}

/// Returns `(yield_duration, fired)`. `yield_duration` is meaningful only when `fired` is
/// `false`: how long the caller should sleep before checking again.
fn take_ready_task(inner: &Arc<Inner>) -> (Duration, bool) {
    let mut state = inner.state.lock();

    match state.heap.peek() {
        None => return (MAX_YIELD, false),
        Some(Reverse(HeapEntry(task))) => {
            let now = inner.clock.now().with_timezone(&task.tz);
            if !task.ready(now) {
                return (task.until_next_run(now).min(MAX_YIELD), false);
            }
        }
    }

    let Reverse(HeapEntry(mut task)) = state.heap.pop().expect("just peeked a ready task");
    let unit = Arc::clone(&task.unit);
    task.schedule_next_run();
    state.heap.push(Reverse(HeapEntry(task)));
    drop(state);

    if let Some(tx) = inner.ready_tx.lock().as_ref() {
        match tx.try_send(unit) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("ready-channel receiver is gone; dropping cron firing");
            }
        }
    }

    (Duration::ZERO, true)
}

/// Runs `body` on a dedicated thread; if it panics, logs the cause and relaunches it. `body`
/// returning normally (rather than panicking) ends the supervision loop.
fn run_supervised<F>(body: F)
where
    F: Fn() + Send + 'static,
{
    thread::spawn(move || loop {
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(&body));
        match outcome {
            Ok(()) => return,
            Err(payload) => {
                let cause = PanicCause::from_payload(payload.as_ref());
                tracing::error!(cause = %cause, "cron dispatch loop panicked, restarting");
            }
        }
    });
}
