//! Deadline-ordered set of scheduled timers.
//!
//! Entries are keyed by `(deadline, id)` so colliding deadlines stay distinct and pop in
//! creation order. A secondary `id -> deadline` index gives removal by identity without
//! the caller knowing where the entry sits.

use std::collections::{BTreeMap, HashMap};

use crate::clock::Timestamp;

pub(crate) type TimerId = u64;

#[derive(Debug)]
pub(crate) struct PendingSet<T> {
    by_deadline: BTreeMap<(Timestamp, TimerId), T>,
    positions: HashMap<TimerId, Timestamp>,
}

impl<T> PendingSet<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        PendingSet {
            by_deadline: BTreeMap::new(),
            positions: HashMap::with_capacity(capacity),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.positions.len()
    }

    /// Inserts `value` under `id`. An existing entry for `id` is replaced and returned.
    pub(crate) fn insert(&mut self, id: TimerId, deadline: Timestamp, value: T) -> Option<T> {
        let previous = self.remove(id);
        self.positions.insert(id, deadline);
        self.by_deadline.insert((deadline, id), value);
        previous
    }

    pub(crate) fn remove(&mut self, id: TimerId) -> Option<T> {
        let deadline = self.positions.remove(&id)?;
        self.by_deadline.remove(&(deadline, id))
    }

    /// Earliest deadline in the set.
    pub(crate) fn peek_deadline(&self) -> Option<Timestamp> {
        self.by_deadline
            .first_key_value()
            .map(|(&(deadline, _), _)| deadline)
    }

    /// Removes every entry with `deadline <= now`, earliest first.
    pub(crate) fn pop_due(&mut self, now: Timestamp) -> Vec<T> {
        let mut due = Vec::new();
        while let Some(entry) = self.by_deadline.first_entry() {
            let (deadline, id) = *entry.key();
            if deadline > now {
                break;
            }
            self.positions.remove(&id);
            due.push(entry.remove());
        }
        due
    }

    /// Empties the set, earliest first.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        self.positions.clear();
        std::mem::take(&mut self.by_deadline).into_values().collect()
    }
}
