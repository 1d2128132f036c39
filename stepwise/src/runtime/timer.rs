use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::rc::Rc;
use std::time::Instant;

use super::Callback;

/// Below this many entries the queue never bothers compacting.
const COMPACT_MIN_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerStatus {
    Armed,
    Fired,
    Cancelled,
}

/// An entry in the deadline queue.
///
/// Entries are ordered by `(deadline, seq)` so that callbacks sharing a
/// deadline fire in the order they were registered.
pub(crate) struct TimerEntry {
    /// The time at which the callback becomes ready.
    deadline: Instant,

    /// Insertion counter, used to break deadline ties.
    seq: u64,

    /// Callback moved into the ready queue once the deadline elapses.
    callback: Callback,

    /// Shared with the [`TimerHandle`] returned to the caller.
    status: Rc<Cell<TimerStatus>>,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Ord for TimerEntry {
    /// Reversed so that `BinaryHeap<TimerEntry>` pops the earliest
    /// deadline (and, among equal deadlines, the oldest entry) first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Handle to a callback registered with [`Handle::call_later`](crate::Handle::call_later)
/// or [`Handle::call_at`](crate::Handle::call_at).
///
/// Dropping the handle does **not** cancel the timer.
#[derive(Clone)]
pub struct TimerHandle {
    deadline: Instant,
    status: Rc<Cell<TimerStatus>>,
    cancelled: Rc<Cell<usize>>,
}

impl TimerHandle {
    /// Prevents the callback from running.
    ///
    /// Returns `false` if the timer already fired or was already cancelled.
    pub fn cancel(&self) -> bool {
        if self.status.get() != TimerStatus::Armed {
            return false;
        }

        self.status.set(TimerStatus::Cancelled);
        self.cancelled.set(self.cancelled.get() + 1);
        true
    }

    /// The instant at which the callback becomes ready.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Returns `true` once the callback has been moved to the ready queue.
    pub fn has_fired(&self) -> bool {
        self.status.get() == TimerStatus::Fired
    }

    /// Returns `true` if [`cancel`](Self::cancel) took effect.
    pub fn is_cancelled(&self) -> bool {
        self.status.get() == TimerStatus::Cancelled
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("deadline", &self.deadline)
            .field("status", &self.status.get())
            .finish()
    }
}

/// Deadline-ordered queue of delayed callbacks.
///
/// Cancellation is lazy: a cancelled entry stays in the heap until it
/// reaches the top or until cancelled entries make up more than half of
/// the heap, at which point the heap is rebuilt without them.
pub(crate) struct TimerQueue {
    heap: BinaryHeap<TimerEntry>,
    next_seq: u64,
    cancelled: Rc<Cell<usize>>,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
            cancelled: Rc::new(Cell::new(0)),
        }
    }

    /// Registers `callback` to become ready at `deadline`.
    pub(crate) fn push(&mut self, deadline: Instant, callback: Callback) -> TimerHandle {
        let status = Rc::new(Cell::new(TimerStatus::Armed));
        let seq = self.next_seq;
        self.next_seq += 1;

        self.heap.push(TimerEntry {
            deadline,
            seq,
            callback,
            status: status.clone(),
        });

        self.compact();

        TimerHandle {
            deadline,
            status,
            cancelled: self.cancelled.clone(),
        }
    }

    /// Earliest deadline among live entries.
    pub(crate) fn next_deadline(&mut self) -> Option<Instant> {
        self.discard_cancelled_head();
        self.heap.peek().map(|entry| entry.deadline)
    }

    /// Removes every live entry whose deadline is `<= now`, earliest first.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Vec<Callback> {
        let mut due = Vec::new();

        loop {
            self.discard_cancelled_head();

            match self.heap.peek() {
                Some(entry) if entry.deadline <= now => {}
                _ => break,
            }

            if let Some(entry) = self.heap.pop() {
                entry.status.set(TimerStatus::Fired);
                due.push(entry.callback);
            }
        }

        due
    }

    /// Number of timers that are still armed.
    pub(crate) fn len(&self) -> usize {
        self.heap.len() - self.cancelled.get()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn clear(&mut self) {
        for entry in self.heap.drain() {
            if entry.status.get() == TimerStatus::Armed {
                entry.status.set(TimerStatus::Cancelled);
            }
        }
        self.cancelled.set(0);
    }

    fn discard_cancelled_head(&mut self) {
        while let Some(entry) = self.heap.peek() {
            if entry.status.get() != TimerStatus::Cancelled {
                break;
            }
            self.heap.pop();
            self.cancelled.set(self.cancelled.get() - 1);
        }
    }

    fn compact(&mut self) {
        let cancelled = self.cancelled.get();

        if self.heap.len() < COMPACT_MIN_LEN || cancelled * 2 <= self.heap.len() {
            return;
        }

        let entries = std::mem::take(&mut self.heap).into_vec();
        self.heap = entries
            .into_iter()
            .filter(|entry| entry.status.get() != TimerStatus::Cancelled)
            .collect();
        self.cancelled.set(0);
    }
}
