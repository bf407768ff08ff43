use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use timer_engine::{
    new_stopped_timer, new_timer, CancellationToken, Delay, Duration, EngineConfig, Timer,
    TimerEngine, TimerError, TimerState, Timestamp,
};
use tokio::time::{sleep, timeout};

/// One "unit" of wall-clock time for the real-time scenarios.
const UNIT: Duration = Duration::from_millis(100);

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn units(elapsed: Duration) -> u128 {
    (elapsed.as_millis() + UNIT.as_millis() / 2) / UNIT.as_millis()
}

#[tokio::test]
async fn zero_and_negative_timeouts_fire_immediately() {
    init_logging();
    for delay in [Delay::ZERO, Delay::from_nanos(-1), Delay::from_secs(-100)] {
        let start = Instant::now();
        let timer = new_timer(delay);
        timer.recv().await.unwrap();
        assert_eq!(units(start.elapsed()), 0, "delay {:?}", delay);
    }
}

#[tokio::test]
async fn overflowing_timeout_saturates() {
    let timer = new_timer(Delay::MAX);
    assert_eq!(timer.deadline(), Timestamp::MAX);
    assert_eq!(timer.stop(), Ok(true));

    let timer = new_timer(UNIT);
    timer.reset(Delay::MAX).unwrap();
    assert_eq!(timer.deadline(), Timestamp::MAX);
    assert_eq!(timer.stop(), Ok(true));
}

#[tokio::test]
async fn single_timeout_takes_its_duration() {
    let start = Instant::now();
    let timer = new_timer(UNIT);
    timer.recv().await.unwrap();
    let elapsed = start.elapsed();
    assert!(elapsed >= UNIT, "fired early after {:?}", elapsed);
    assert_eq!(units(elapsed), 1);
}

#[tokio::test]
async fn mixed_timeouts_finish_with_the_longest() {
    let start = Instant::now();
    let timers: Vec<Timer> = (0..1000u32).map(|i| new_timer(UNIT * (i % 4))).collect();
    for result in join_all(timers.iter().map(|t| t.recv())).await {
        result.unwrap();
    }
    assert_eq!(units(start.elapsed()), 3);
}

#[tokio::test]
async fn shorter_delay_fires_first() {
    let short = new_timer(UNIT);
    let long = new_timer(UNIT * 2);
    let (long_at, short_at) = tokio::join!(long.recv(), short.recv());
    assert!(short_at.unwrap() < long_at.unwrap());
}

#[tokio::test]
async fn stopped_timer_starts_unscheduled() {
    let timer = new_stopped_timer();
    assert_eq!(timer.deadline(), Timestamp::ZERO);
    assert_eq!(timer.state(), TimerState::Stopped);

    let start = Instant::now();
    assert_eq!(timer.reset(UNIT), Ok(false));
    timer.recv().await.unwrap();
    assert_eq!(units(start.elapsed()), 1);
}

#[tokio::test]
async fn stopped_timers_never_deliver() {
    let timers: Vec<Timer> = (0..1000).map(|_| new_timer(UNIT)).collect();
    for timer in &timers {
        assert_eq!(timer.stop(), Ok(true));
    }

    sleep(UNIT * 2).await;

    for timer in &timers {
        assert_eq!(timer.try_recv(), Ok(None));
        assert_eq!(timer.stop(), Ok(false));
        assert_eq!(timer.stop(), Ok(false));
    }
}

#[tokio::test]
async fn uninitialized_timer_reports_the_operation() {
    let timer = Timer::default();
    let err = timer.stop().unwrap_err();
    assert_eq!(err.to_string(), "timer: Stop called on uninitialized Timer");
    let err = timer.reset(UNIT).unwrap_err();
    assert_eq!(err.to_string(), "timer: Reset called on uninitialized Timer");
    assert!(matches!(
        timer.recv().await,
        Err(TimerError::Uninitialized { .. })
    ));
}

#[tokio::test]
async fn reset_to_negative_fires_immediately() {
    let start = Instant::now();
    let timer = new_timer(UNIT * 10);
    assert_eq!(timer.reset(Delay::from_secs(-100)), Ok(true));
    timer.recv().await.unwrap();
    assert_eq!(units(start.elapsed()), 0);
}

#[tokio::test]
async fn many_resets_keep_the_latest_deadline() {
    let start = Instant::now();
    let timers: Vec<Timer> = (0..1000)
        .map(|_| {
            let timer = new_timer(UNIT);
            timer.reset(UNIT * 2).unwrap();
            timer
        })
        .collect();
    for result in join_all(timers.iter().map(|t| t.recv())).await {
        result.unwrap();
    }
    assert_eq!(units(start.elapsed()), 2);

    let start = Instant::now();
    let timers: Vec<Timer> = (0..1000)
        .map(|_| {
            let timer = new_timer(UNIT * 10);
            timer.reset(Delay::ZERO).unwrap();
            timer
        })
        .collect();
    for result in join_all(timers.iter().map(|t| t.recv())).await {
        result.unwrap();
    }
    assert_eq!(units(start.elapsed()), 0);
}

#[tokio::test]
async fn reset_after_unread_fire_waits_for_new_deadline() {
    init_logging();
    let start = Instant::now();
    let timer = new_timer(UNIT);

    // The timer fires during this sleep and nobody reads it.
    sleep(UNIT * 2).await;
    assert!(timer.has_pending());

    assert_eq!(timer.reset(UNIT), Ok(false));
    assert!(!timer.has_pending());
    timer.recv().await.unwrap();

    // ~2 would mean the stale value leaked through the reset.
    assert_eq!(units(start.elapsed()), 3);
}

#[test]
fn blocking_recv_from_plain_thread() {
    let start = Instant::now();
    let timer = new_timer(UNIT);
    timer.blocking_recv().unwrap();
    assert!(start.elapsed() >= UNIT);
    assert_eq!(timer.state(), TimerState::Fired);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hundred_thousand_concurrent_timers_deliver_once() {
    init_logging();
    let cancel_token = CancellationToken::new();
    let config = EngineConfig {
        initial_capacity: 100_000,
        ..EngineConfig::named("scale")
    };
    let (engine, dispatcher) = TimerEngine::new(config, cancel_token.clone());
    tokio::spawn(dispatcher.run());

    let received = Arc::new(AtomicUsize::new(0));
    let mut tasks = Vec::with_capacity(100_000);
    let mut timers = Vec::with_capacity(100_000);
    for _ in 0..100_000 {
        let timer = engine.timer(Delay::from_nanos(1));
        let waiter = timer.clone();
        let received = Arc::clone(&received);
        tasks.push(tokio::spawn(async move {
            waiter.recv().await.unwrap();
            received.fetch_add(1, Ordering::Relaxed);
        }));
        timers.push(timer);
    }

    timeout(Duration::from_secs(30), join_all(tasks))
        .await
        .expect("timers deadlocked")
        .into_iter()
        .for_each(|joined| joined.unwrap());

    assert_eq!(received.load(Ordering::Relaxed), 100_000);
    assert_eq!(engine.pending_count(), 0);

    let ids: HashSet<_> = timers.iter().map(|t| t.id().unwrap()).collect();
    assert_eq!(ids.len(), 100_000);
    for timer in &timers {
        assert_eq!(timer.state(), TimerState::Fired);
        assert_eq!(timer.try_recv(), Ok(None));
    }

    cancel_token.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_stop_and_reset_on_one_timer() {
    let cancel_token = CancellationToken::new();
    let (engine, dispatcher) =
        TimerEngine::new(EngineConfig::named("contention"), cancel_token.clone());
    tokio::spawn(dispatcher.run());

    let timer = engine.timer(Duration::from_millis(1));
    let workers: Vec<_> = (0..8)
        .map(|i| {
            let timer = timer.clone();
            tokio::spawn(async move {
                for _ in 0..500 {
                    if i % 2 == 0 {
                        timer.reset(Delay::from_micros(50)).unwrap();
                    } else {
                        timer.stop().unwrap();
                    }
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for worker in join_all(workers).await {
        worker.unwrap();
    }

    // Whatever interleaving happened, one final reset yields exactly one value.
    timer.reset(Duration::from_millis(5)).unwrap();
    timeout(Duration::from_secs(5), timer.recv())
        .await
        .expect("final reset never fired")
        .unwrap();
    sleep(Duration::from_millis(20)).await;
    assert_eq!(timer.try_recv(), Ok(None));
    assert_eq!(engine.pending_count(), 0);

    cancel_token.cancel();
}
