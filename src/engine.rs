use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::sleep_until;
use tokio_util::sync::CancellationToken;

use crate::clock::{ClockSource, MonotonicClock, Timestamp};
use crate::deadline::{compute_deadline, Delay};
use crate::lock;
use crate::pending::PendingSet;
use crate::timer::{Slot, Timer, TimerShared, TimerState};

/// Longest single sleep the dispatcher accepts as `max_park`.
const PARK_LIMIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Instance name for logging
    pub name: String,

    /// Clock the engine measures deadlines against
    pub clock: ClockSource,

    /// Upper bound on one dispatcher sleep, clamped to 1ms..=24h
    pub max_park: Duration,

    /// Initial capacity of the pending set's identity index
    pub initial_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            name: "timer_engine".to_string(),
            clock: ClockSource::Runtime,
            max_park: Duration::from_secs(60),
            initial_capacity: 1024,
        }
    }
}

impl EngineConfig {
    pub fn named(name: impl Into<String>) -> Self {
        EngineConfig {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A scheduled epoch of one timer.
struct Entry {
    timer: Arc<TimerShared>,
    sequence: u64,
}

struct Queue {
    pending: PendingSet<Entry>,
    /// Deadline the dispatcher is currently sleeping towards; `None` while idle.
    wait_target: Option<Timestamp>,
    closed: bool,
}

pub(crate) struct EngineCore {
    name: String,
    clock: MonotonicClock,
    next_id: AtomicU64,
    queue: Mutex<Queue>,
    wake: Notify,
}

impl EngineCore {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    fn create(self: &Arc<Self>, delay: Option<Delay>) -> Timer {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(TimerShared::new(id, Arc::clone(self)));
        if let Some(delay) = delay {
            let mut queue = lock(&self.queue);
            let mut slot = lock(&shared.slot);
            slot.deadline = compute_deadline(self.clock.now(), delay);
            self.enqueue(&mut queue, &shared, &mut slot);
        }
        Timer::from_shared(shared)
    }

    /// Marks the timer scheduled and inserts it, waking the dispatcher when the new
    /// deadline precedes whatever it is waiting for.
    fn enqueue(&self, queue: &mut Queue, timer: &Arc<TimerShared>, slot: &mut Slot) {
        if queue.closed {
            log::warn!(
                "Timer engine '{}' is closed, timer {} stays stopped",
                self.name,
                timer.id
            );
            slot.state = TimerState::Stopped;
            return;
        }

        slot.state = TimerState::Scheduled;
        queue.pending.insert(
            timer.id,
            slot.deadline,
            Entry {
                timer: Arc::clone(timer),
                sequence: slot.sequence,
            },
        );

        if queue.wait_target.map_or(true, |target| slot.deadline < target) {
            queue.wait_target = Some(slot.deadline);
            self.wake.notify_one();
        }
    }

    pub(crate) fn stop(&self, timer: &Arc<TimerShared>) -> bool {
        let mut queue = lock(&self.queue);
        let mut slot = lock(&timer.slot);
        match slot.state {
            TimerState::Scheduled => {
                queue.pending.remove(timer.id);
                slot.state = TimerState::Stopped;
                true
            }
            // Fired keeps its unread value; a shared timer is never Uninitialized.
            _ => false,
        }
    }

    pub(crate) fn reset(&self, timer: &Arc<TimerShared>, delay: Delay) -> bool {
        let mut queue = lock(&self.queue);
        let mut slot = lock(&timer.slot);

        let was_active = slot.state == TimerState::Scheduled;
        if was_active {
            queue.pending.remove(timer.id);
        }
        if slot.state == TimerState::Fired {
            timer.mailbox.take();
        }

        slot.sequence = slot.sequence.wrapping_add(1);
        slot.deadline = compute_deadline(self.clock.now(), delay);
        self.enqueue(&mut queue, timer, &mut slot);
        was_active
    }

    /// Fires every due timer and returns the next deadline, if any.
    fn fire_due(&self) -> Option<Timestamp> {
        let now = self.clock.now();
        let (due, next) = {
            let mut queue = lock(&self.queue);
            let due = queue.pending.pop_due(now);
            let next = queue.pending.peek_deadline();
            queue.wait_target = next;
            (due, next)
        };

        if !due.is_empty() {
            let popped = due.len();
            let fired = due
                .into_iter()
                .filter(|entry| entry.timer.deliver(entry.sequence, now))
                .count();
            log::debug!(
                "Timer engine '{}' fired {} of {} due timer(s) at {}",
                self.name,
                fired,
                popped,
                now
            );
        }
        next
    }

    /// Stops every pending timer and refuses further scheduling.
    fn close(&self) -> usize {
        let drained = {
            let mut queue = lock(&self.queue);
            queue.closed = true;
            queue.wait_target = None;
            queue.pending.drain()
        };
        for entry in &drained {
            let mut slot = lock(&entry.timer.slot);
            if slot.state == TimerState::Scheduled && slot.sequence == entry.sequence {
                slot.state = TimerState::Stopped;
            }
        }
        drained.len()
    }
}

/// Facade over one timer engine. Cheap to clone.
#[derive(Clone)]
pub struct TimerEngine {
    core: Arc<EngineCore>,
}

/// Background task that fires due timers for one [`TimerEngine`].
pub struct Dispatcher {
    core: Arc<EngineCore>,
    max_park: Duration,
    cancel_token: CancellationToken,
}

static GLOBAL: OnceLock<TimerEngine> = OnceLock::new();

impl TimerEngine {
    /// Create a new engine and its dispatcher
    ///
    /// # Arguments
    /// * `config` - Engine name, clock and dispatcher tuning
    /// * `cancel_token` - Stops the dispatcher and closes the engine when cancelled
    ///
    /// Returns (TimerEngine, Dispatcher). Timers only fire while `Dispatcher::run` is polled.
    pub fn new(config: EngineConfig, cancel_token: CancellationToken) -> (Self, Dispatcher) {
        let core = Arc::new(EngineCore {
            name: config.name,
            clock: MonotonicClock::new(config.clock),
            next_id: AtomicU64::new(1),
            queue: Mutex::new(Queue {
                pending: PendingSet::with_capacity(config.initial_capacity),
                wait_target: None,
                closed: false,
            }),
            wake: Notify::new(),
        });

        let dispatcher = Dispatcher {
            core: Arc::clone(&core),
            max_park: config
                .max_park
                .clamp(Duration::from_millis(1), PARK_LIMIT),
            cancel_token,
        };

        (TimerEngine { core }, dispatcher)
    }

    /// The process-wide engine, started on first use.
    ///
    /// Its dispatcher runs on a dedicated thread for the rest of the process and reads the
    /// system monotonic clock, so it is unaffected by paused Tokio test runtimes.
    ///
    /// If the dispatcher thread or its runtime cannot be started, the failure is logged at
    /// error level and the engine comes back closed: [`TimerEngine::is_closed`] reports
    /// `true` and every timer created on it stays [`TimerState::Stopped`] and never fires.
    pub fn global() -> &'static TimerEngine {
        GLOBAL.get_or_init(start_global)
    }

    /// Create a timer that fires after `delay`. Non-positive delays fire on the next
    /// dispatcher pass.
    pub fn timer(&self, delay: impl Into<Delay>) -> Timer {
        self.core.create(Some(delay.into()))
    }

    /// Create a stopped timer with no deadline, to be armed later with [`Timer::reset`].
    pub fn stopped_timer(&self) -> Timer {
        self.core.create(None)
    }

    /// Number of timers waiting to fire.
    pub fn pending_count(&self) -> usize {
        lock(&self.core.queue).pending.len()
    }

    /// Current instant on the engine clock.
    pub fn now(&self) -> Timestamp {
        self.core.clock.now()
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Whether the dispatcher has shut down.
    pub fn is_closed(&self) -> bool {
        lock(&self.core.queue).closed
    }
}

impl std::fmt::Debug for TimerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerEngine")
            .field("name", &self.core.name)
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl Dispatcher {
    /// Run the dispatcher until the cancellation token fires
    pub async fn run(self) {
        let name = self.core.name.clone();
        log::info!("Timer engine '{}' dispatcher started", name);

        loop {
            let next = self.core.fire_due();
            let wake_at = self.wake_at(next.unwrap_or(Timestamp::MAX));

            tokio::select! {
                // Earlier deadline inserted
                _ = self.core.wake.notified() => {},

                // Next deadline reached
                _ = sleep_until(wake_at), if next.is_some() => {},

                // Handle cancellation token
                _ = self.cancel_token.cancelled() => {
                    log::info!("Timer engine '{}' cancelled via token", name);
                    break;
                }
            }
        }

        let discarded = self.core.close();
        log::info!(
            "Timer engine '{}' stopped, {} pending timer(s) discarded",
            name,
            discarded
        );
    }

    fn wake_at(&self, deadline: Timestamp) -> tokio::time::Instant {
        let cap = tokio::time::Instant::now() + self.max_park;
        match self.core.clock.to_instant(deadline) {
            Some(at) => at.min(cap),
            None => cap,
        }
    }
}

/// A dispatcher that will never run again closes its engine, which stops the pending
/// timers and releases their references back to the engine.
impl Drop for Dispatcher {
    fn drop(&mut self) {
        let discarded = self.core.close();
        if discarded > 0 {
            log::info!(
                "Timer engine '{}' dispatcher dropped, {} pending timer(s) discarded",
                self.core.name,
                discarded
            );
        }
    }
}

fn start_global() -> TimerEngine {
    let config = EngineConfig {
        name: "global".to_string(),
        clock: ClockSource::System,
        ..EngineConfig::default()
    };
    let (engine, dispatcher) = TimerEngine::new(config, CancellationToken::new());

    let spawned = thread::Builder::new()
        .name("timer-dispatcher".to_string())
        .spawn(move || {
            match tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
            {
                Ok(runtime) => runtime.block_on(dispatcher.run()),
                Err(e) => log::error!("Timer engine 'global' failed to build runtime: {}", e),
            }
        });
    if let Err(e) = spawned {
        log::error!("Timer engine 'global' failed to spawn dispatcher thread: {}", e);
    }

    engine
}
