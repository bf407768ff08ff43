//! # Timer Engine
//!
//! A scalable one-shot timer engine for Rust built on top of Tokio.
//!
//! Each [`Timer`] delivers exactly one fire instant to its single-slot mailbox once its
//! deadline passes, and can be stopped or reset at any time without racing the
//! background dispatcher. A single dispatcher per engine serves any number of timers
//! from one deadline-ordered set, so hundreds of thousands of timers cost no more than
//! one task.
//!
//! ## Features
//!
//! - **Race-free reset**: `reset` discards a fired but unread value, so the next value
//!   received always belongs to the new deadline
//! - **Saturating deadlines**: negative delays fire immediately, huge ones clamp to
//!   [`Timestamp::MAX`] instead of wrapping
//! - **Process-wide or scoped engines**: [`new_timer`] uses a lazily started global
//!   engine; [`TimerEngine::new`] gives an engine whose dispatcher you spawn yourself
//! - **Graceful Shutdown**: scoped engines stop on a cancellation token
//! - **Comprehensive Logging**: dispatcher lifecycle and fire passes through `log`
//!
//! ## Quick Start
//!
//! ```rust
//! use timer_engine::{CancellationToken, Duration, EngineConfig, TimerEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cancel_token = CancellationToken::new();
//!     let (engine, dispatcher) =
//!         TimerEngine::new(EngineConfig::named("my_engine"), cancel_token.clone());
//!
//!     // Spawn the dispatcher task
//!     tokio::spawn(dispatcher.run());
//!
//!     let timer = engine.timer(Duration::from_millis(20));
//!     let fired_at = timer.recv().await?;
//!     println!("fired at {}", fired_at);
//!
//!     // Reschedule; nothing stale is left in the mailbox
//!     timer.reset(Duration::from_millis(10))?;
//!     timer.recv().await?;
//!
//!     cancel_token.cancel();
//!     Ok(())
//! }
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

mod clock;
mod deadline;
mod engine;
mod error;
mod mailbox;
mod pending;
mod timer;

pub use clock::{ClockSource, MonotonicClock, Timestamp};
pub use deadline::{compute_deadline, Delay};
pub use engine::{Dispatcher, EngineConfig, TimerEngine};
pub use error::{Result, TimerError};
pub use timer::{Timer, TimerState};

// Re-export commonly used types for convenience
pub use std::time::Duration;
pub use tokio_util::sync::CancellationToken;

/// Create a timer on the process-wide engine that fires after `delay`.
pub fn new_timer(delay: impl Into<Delay>) -> Timer {
    TimerEngine::global().timer(delay)
}

/// Create a stopped timer on the process-wide engine, to be armed with [`Timer::reset`].
pub fn new_stopped_timer() -> Timer {
    TimerEngine::global().stopped_timer()
}

/// Every guarded update in this crate is a single step, so a poisoned lock still holds
/// consistent data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
