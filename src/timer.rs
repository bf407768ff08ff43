use std::fmt;
use std::sync::{Arc, Mutex};

use crate::clock::Timestamp;
use crate::deadline::Delay;
use crate::engine::EngineCore;
use crate::error::{Result, TimerError};
use crate::lock;
use crate::mailbox::Mailbox;
use crate::pending::TimerId;

/// Lifecycle state of a [`Timer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerState {
    /// The handle skipped construction (`Timer::default()`).
    Uninitialized,
    /// Waiting in the engine for its deadline.
    Scheduled,
    /// Delivered; stays here after the mailbox is read until the next stop or reset.
    Fired,
    /// Not scheduled and holding no undelivered value.
    Stopped,
}

#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) state: TimerState,
    pub(crate) deadline: Timestamp,
    pub(crate) sequence: u64,
}

/// State shared between every clone of a handle and, while scheduled, the engine.
pub(crate) struct TimerShared {
    pub(crate) id: TimerId,
    pub(crate) engine: Arc<EngineCore>,
    pub(crate) slot: Mutex<Slot>,
    pub(crate) mailbox: Mailbox,
}

impl TimerShared {
    pub(crate) fn new(id: TimerId, engine: Arc<EngineCore>) -> Self {
        TimerShared {
            id,
            engine,
            slot: Mutex::new(Slot {
                state: TimerState::Stopped,
                deadline: Timestamp::ZERO,
                sequence: 0,
            }),
            mailbox: Mailbox::new(),
        }
    }

    /// Fires the timer for the epoch `sequence`. Returns false when that epoch was
    /// superseded by a reset or ended by a stop after the dispatcher dequeued it.
    pub(crate) fn deliver(&self, sequence: u64, now: Timestamp) -> bool {
        let mut slot = lock(&self.slot);
        if slot.sequence != sequence || slot.state != TimerState::Scheduled {
            return false;
        }
        slot.state = TimerState::Fired;
        self.mailbox.offer(now);
        true
    }
}

/// Handle to a one-shot timer.
///
/// Clones refer to the same timer. A handle built with `Timer::default()` has no engine
/// and no mailbox; stopping, resetting or receiving from it reports
/// [`TimerError::Uninitialized`], while the read-only accessors return defaults.
#[derive(Clone, Default)]
pub struct Timer {
    shared: Option<Arc<TimerShared>>,
}

impl Timer {
    pub(crate) fn from_shared(shared: Arc<TimerShared>) -> Self {
        Timer {
            shared: Some(shared),
        }
    }

    fn shared(&self, op: &'static str) -> Result<&Arc<TimerShared>> {
        self.shared
            .as_ref()
            .ok_or(TimerError::Uninitialized { op })
    }

    /// Prevents the timer from firing.
    ///
    /// Returns `true` if the call deactivated a scheduled timer, `false` if it had
    /// already fired or been stopped. A value already delivered to the mailbox stays
    /// there; use [`Timer::reset`] to discard it.
    pub fn stop(&self) -> Result<bool> {
        let shared = self.shared("Stop")?;
        Ok(shared.engine.stop(shared))
    }

    /// Reschedules the timer to fire after `delay`, measured from now.
    ///
    /// Any fired but unread value is discarded first, so the next value received always
    /// belongs to the new deadline. Returns `true` if the timer was still scheduled.
    pub fn reset(&self, delay: impl Into<Delay>) -> Result<bool> {
        let shared = self.shared("Reset")?;
        Ok(shared.engine.reset(shared, delay.into()))
    }

    /// Waits for the timer to fire and returns the instant it fired at.
    pub async fn recv(&self) -> Result<Timestamp> {
        let shared = self.shared("Recv")?;
        Ok(shared.mailbox.recv().await)
    }

    /// Takes the delivered value if there is one.
    pub fn try_recv(&self) -> Result<Option<Timestamp>> {
        Ok(self.shared("Recv")?.mailbox.take())
    }

    /// Blocks the current thread until the timer fires.
    ///
    /// Meant for synchronous callers; inside an async context use [`Timer::recv`].
    pub fn blocking_recv(&self) -> Result<Timestamp> {
        let shared = self.shared("Recv")?;
        Ok(futures::executor::block_on(shared.mailbox.recv()))
    }

    /// Whether a delivered value is waiting in the mailbox.
    ///
    /// Like the other read-only accessors this never fails: an uninitialized handle has
    /// no mailbox and reports `false`. Use [`Timer::try_recv`] to detect that case.
    pub fn has_pending(&self) -> bool {
        self.shared
            .as_ref()
            .is_some_and(|shared| shared.mailbox.is_occupied())
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.is_some()
    }

    pub fn state(&self) -> TimerState {
        match &self.shared {
            Some(shared) => lock(&shared.slot).state,
            None => TimerState::Uninitialized,
        }
    }

    /// Absolute deadline of the current epoch. Zero for a timer that was never scheduled.
    pub fn deadline(&self) -> Timestamp {
        match &self.shared {
            Some(shared) => lock(&shared.slot).deadline,
            None => Timestamp::ZERO,
        }
    }

    /// Number of resets applied to this timer.
    pub fn sequence(&self) -> u64 {
        match &self.shared {
            Some(shared) => lock(&shared.slot).sequence,
            None => 0,
        }
    }

    /// Engine-unique identity, shared by clones.
    pub fn id(&self) -> Option<u64> {
        self.shared.as_ref().map(|shared| shared.id)
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.shared {
            Some(shared) => {
                let slot = lock(&shared.slot);
                f.debug_struct("Timer")
                    .field("id", &shared.id)
                    .field("engine", &shared.engine.name())
                    .field("state", &slot.state)
                    .field("deadline", &slot.deadline)
                    .field("sequence", &slot.sequence)
                    .finish()
            }
            None => f
                .debug_struct("Timer")
                .field("state", &TimerState::Uninitialized)
                .finish(),
        }
    }
}
