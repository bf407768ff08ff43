use std::sync::Mutex;

use tokio::sync::Notify;

use crate::clock::Timestamp;
use crate::lock;

/// Single-slot delivery buffer for fire instants.
///
/// `offer` never overwrites an occupied slot and never blocks. `recv` waits until the
/// slot is filled and empties it. Only one consumer is expected at a time.
#[derive(Debug, Default)]
pub(crate) struct Mailbox {
    slot: Mutex<Option<Timestamp>>,
    notify: Notify,
}

impl Mailbox {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Stores `value` if the slot is empty. Returns whether it was stored.
    pub(crate) fn offer(&self, value: Timestamp) -> bool {
        {
            let mut slot = lock(&self.slot);
            if slot.is_some() {
                return false;
            }
            *slot = Some(value);
        }
        self.notify.notify_one();
        true
    }

    /// Empties the slot without waiting.
    pub(crate) fn take(&self) -> Option<Timestamp> {
        lock(&self.slot).take()
    }

    pub(crate) fn is_occupied(&self) -> bool {
        lock(&self.slot).is_some()
    }

    pub(crate) async fn recv(&self) -> Timestamp {
        loop {
            // A notify_one that races with the check below leaves a permit behind,
            // so the await returns immediately instead of missing the value.
            let notified = self.notify.notified();
            if let Some(value) = self.take() {
                return value;
            }
            notified.await;
        }
    }
}
