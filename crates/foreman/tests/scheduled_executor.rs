use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use errand::{callable, runnable, CallError, Context, ExecutorError};
use foreman::{CronRule, PoolBuilder, ScheduledExecutor};

#[test]
fn future_value_is_observed_by_many_concurrent_getters() {
    let pool = PoolBuilder::new().max_concurrent(4).build();
    let future = pool
        .submit(callable(|_ctx| Ok::<_, CallError>("future".to_string())))
        .unwrap();

    let handles: Vec<_> = (0..100)
        .map(|_| {
            let future = Arc::clone(&future);
            thread::spawn(move || future.get(&Context::background()).unwrap())
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), "future");
    }
}

#[test]
fn future_error_is_observed_by_many_concurrent_getters() {
    #[derive(Debug, thiserror::Error)]
    #[error("e")]
    struct Boom;

    let pool = PoolBuilder::new().build();
    let future = pool.submit(callable(|_ctx| Err::<i32, _>(CallError::new(Boom)))).unwrap();

    let handles: Vec<_> = (0..100)
        .map(|_| {
            let future = Arc::clone(&future);
            thread::spawn(move || future.get(&Context::background()).unwrap_err().to_string())
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap().contains('e'));
    }
}

#[test]
fn cancelling_a_sleeping_task_is_observed_by_concurrent_getters() {
    let pool = PoolBuilder::new().max_concurrent(2).build();
    let future = pool
        .submit(callable(|_ctx| {
            thread::sleep(Duration::from_secs(1));
            Ok::<_, CallError>(())
        }))
        .unwrap();

    thread::sleep(Duration::from_millis(50));
    assert!(future.cancel());

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let future = Arc::clone(&future);
            thread::spawn(move || future.get(&Context::background()))
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap().is_err());
    }
}

#[test]
fn a_scheduled_executor_composes_pool_timer_and_cron() {
    let scheduled = PoolBuilder::new().max_concurrent(4).build_scheduled();

    let delayed = Arc::new(AtomicUsize::new(0));
    let delayed2 = Arc::clone(&delayed);
    scheduled
        .schedule(
            runnable(move |_ctx| {
                delayed2.fetch_add(1, Ordering::SeqCst);
            }),
            Duration::from_millis(20),
        )
        .unwrap();

    let ticked = Arc::new(AtomicUsize::new(0));
    let ticked2 = Arc::clone(&ticked);
    let fixed_handle = scheduled
        .schedule_at_fixed_rate(
            runnable(move |_ctx| {
                ticked2.fetch_add(1, Ordering::SeqCst);
            }),
            Duration::from_millis(30),
        )
        .unwrap();

    let cron_count = Arc::new(AtomicUsize::new(0));
    let cron_count2 = Arc::clone(&cron_count);
    scheduled
        .schedule_at_cron_rate(
            runnable(move |_ctx| {
                cron_count2.fetch_add(1, Ordering::SeqCst);
            }),
            CronRule::new("* * * * * * *", "UTC"),
        )
        .unwrap();

    thread::sleep(Duration::from_millis(2200));
    fixed_handle.cancel();

    assert_eq!(delayed.load(Ordering::SeqCst), 1);
    assert!(ticked.load(Ordering::SeqCst) >= 3);
    assert!(cron_count.load(Ordering::SeqCst) >= 2);

    scheduled
        .shutdown(&Context::with_timeout(Duration::from_secs(5)))
        .unwrap();

    let err = scheduled
        .schedule(runnable(|_ctx| {}), Duration::from_millis(10))
        .unwrap_err();
    assert_eq!(err, ExecutorError::Shutdown);
}
