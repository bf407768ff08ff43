//! Basic usage example for the timer engine

use timer_engine::{new_timer, CancellationToken, Duration, EngineConfig, TimerEngine};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    let cancel_token = CancellationToken::new();

    // Create an engine with its own dispatcher
    let (engine, dispatcher) =
        TimerEngine::new(EngineConfig::named("example_engine"), cancel_token.clone());

    // Spawn the dispatcher task
    let dispatcher_task = tokio::spawn(dispatcher.run());

    // Set multiple timers
    let timers = [
        ("short_timer", engine.timer(Duration::from_secs(1))),
        ("medium_timer", engine.timer(Duration::from_secs(2))),
        ("long_timer", engine.timer(Duration::from_secs(3))),
    ];

    println!("Timers set! Waiting for expiration...");

    for (name, timer) in &timers {
        let fired_at = timer.recv().await?;
        println!("Timer '{}' expired at {}", name, fired_at);
    }

    // Demonstrate stopping
    let stopped = engine.timer(Duration::from_secs(10));
    println!("Set a timer that will be stopped...");
    tokio::time::sleep(Duration::from_millis(100)).await;
    println!("Timer stopped while active: {}", stopped.stop()?);

    // Demonstrate reset after an unread fire
    let reused = engine.timer(Duration::from_millis(100));
    tokio::time::sleep(Duration::from_millis(300)).await;
    reused.reset(Duration::from_millis(500))?;
    println!("Reset discarded the stale value: {}", !reused.has_pending());
    reused.recv().await?;
    println!("Reset timer expired");

    // The process-wide engine needs no setup
    new_timer(Duration::from_millis(50)).recv().await?;
    println!("Global timer expired");

    // Shutdown gracefully
    cancel_token.cancel();
    dispatcher_task.await?;

    println!("Timer engine shut down successfully!");
    Ok(())
}
