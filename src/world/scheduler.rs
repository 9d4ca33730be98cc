use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use super::types::Serial;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Work a timer performs when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// Advance a corpse one step along fresh → bones → deleted.
    CorpseDecay(Serial),
}

#[derive(Debug, Clone)]
struct Scheduled {
    deadline: DateTime<Utc>,
    action: TimerAction,
}

/// Single-threaded deadline queue ticked by the world clock.
///
/// Cancelled timers stay in the heap until they surface and are then dropped, so
/// `cancel` is O(1).
#[derive(Debug, Default)]
pub struct TimerScheduler {
    heap: BinaryHeap<Reverse<(DateTime<Utc>, u64)>>,
    live: HashMap<u64, Scheduled>,
    next_id: u64,
}

impl TimerScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, deadline: DateTime<Utc>, action: TimerAction) -> TimerId {
        self.next_id += 1;
        let id = self.next_id;
        self.heap.push(Reverse((deadline, id)));
        self.live.insert(id, Scheduled { deadline, action });
        TimerId(id)
    }

    /// Returns false when the timer already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.live.remove(&id.0).is_some()
    }

    pub fn deadline(&self, id: TimerId) -> Option<DateTime<Utc>> {
        self.live.get(&id.0).map(|s| s.deadline)
    }

    pub fn is_scheduled(&self, id: TimerId) -> bool {
        self.live.contains_key(&id.0)
    }

    /// Earliest live deadline, if any.
    pub fn next_deadline(&mut self) -> Option<DateTime<Utc>> {
        self.discard_cancelled();
        self.heap.peek().map(|Reverse((deadline, _))| *deadline)
    }

    /// Remove and return the earliest timer due at or before `now`.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<(TimerId, DateTime<Utc>, TimerAction)> {
        self.discard_cancelled();
        let Reverse((deadline, id)) = *self.heap.peek()?;
        if deadline > now {
            return None;
        }
        self.heap.pop();
        let scheduled = self.live.remove(&id)?;
        Some((TimerId(id), scheduled.deadline, scheduled.action))
    }

    fn discard_cancelled(&mut self) {
        while let Some(Reverse((_, id))) = self.heap.peek() {
            if self.live.contains_key(id) {
                break;
            }
            self.heap.pop();
        }
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.live.clear();
    }
}
