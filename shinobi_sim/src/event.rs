// Timer queue for the engine's virtual clock.
//
// Every recurring generator, task expiry, and behavior timeout is an entry
// in a min-heap ordered by `(at_ms, sequence)`. The engine pops due timers
// one at a time and drains the update channel after each, so a timer's
// handler always sees the state left by everything that fired before it.
//
// Timers are never cancelled. A timer whose target went away (task already
// claimed, unit dismissed, behavior phase already left) fires into a no-op:
// the handler checks the latest state, and behavior timers carry the epoch
// of the phase that scheduled them.
//
// See also: `engine.rs` for the dispatch loop, `behavior.rs` for epochs.
//
// **Critical constraint: determinism.** Timers due at the same instant fire
// in scheduling order; the sequence number makes the order total.

use crate::types::{TaskId, UnitId};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimerKind {
    /// Recurring scheduler tick.
    Tick,
    /// Recurring task pool refill.
    TaskGeneration,
    /// One pool task reaches the end of its lifetime.
    TaskExpire { task_id: TaskId },
    /// Recurring trainee generation plus expiry sweep.
    TrainingGeneration,
    /// A unit's current behavior phase timed out.
    BehaviorTimeout { unit_id: UnitId, epoch: u64 },
}

#[derive(Clone, Debug)]
pub struct Timer {
    pub at_ms: u64,
    pub sequence: u64,
    pub kind: TimerKind,
}

// Min-heap: the smallest (at_ms, sequence) must compare greatest.
impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.at_ms == other.at_ms && self.sequence == other.sequence
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at_ms
            .cmp(&self.at_ms)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[derive(Clone, Debug, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Timer>,
    next_sequence: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, at_ms: u64, kind: TimerKind) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(Timer {
            at_ms,
            sequence,
            kind,
        });
    }

    pub fn peek_at(&self) -> Option<u64> {
        self.heap.peek().map(|t| t.at_ms)
    }

    /// Pop the earliest timer if it is due at or before `up_to_ms`.
    pub fn pop_due(&mut self, up_to_ms: u64) -> Option<Timer> {
        if self.heap.peek().is_some_and(|t| t.at_ms <= up_to_ms) {
            self.heap.pop()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prng::GameRng;

    #[test]
    fn pops_by_time_then_schedule_order() {
        let mut rng = GameRng::new(42);
        let a = UnitId::new(&mut rng);
        let b = UnitId::new(&mut rng);

        let mut queue = TimerQueue::new();
        queue.schedule(300, TimerKind::Tick);
        queue.schedule(100, TimerKind::BehaviorTimeout { unit_id: a, epoch: 1 });
        queue.schedule(100, TimerKind::BehaviorTimeout { unit_id: b, epoch: 1 });

        let first = queue.pop_due(1_000).unwrap();
        assert_eq!(first.at_ms, 100);
        assert_eq!(first.kind, TimerKind::BehaviorTimeout { unit_id: a, epoch: 1 });
        let second = queue.pop_due(1_000).unwrap();
        assert_eq!(second.kind, TimerKind::BehaviorTimeout { unit_id: b, epoch: 1 });
        assert_eq!(queue.pop_due(1_000).unwrap().kind, TimerKind::Tick);
        assert!(queue.is_empty());
    }

    #[test]
    fn pop_due_respects_horizon() {
        let mut queue = TimerQueue::new();
        queue.schedule(500, TimerKind::TaskGeneration);
        assert_eq!(queue.peek_at(), Some(500));
        assert!(queue.pop_due(499).is_none());
        assert!(queue.pop_due(500).is_some());
        assert_eq!(queue.len(), 0);
    }
}
