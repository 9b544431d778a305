//! Deadline-bounded work queue.
//!
//! Every item carries a complete-by instant computed once at insertion as
//! `now + max_latency`. Retrieval is earliest-deadline-first among items a
//! caller-supplied predicate considers ready, with a stable FIFO tie-break.
//!
//! Inserting into an ordered structure on every enqueue is too expensive
//! under load, so new items first land in the lock-free inbox and are merged
//! into the sorted list lazily inside `dequeue` — and only while the sorted
//! head is not already overdue. An overdue head short-circuits the merge so
//! overload drains in O(1) per item.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::fifo::FifoQueue;

struct Entry<T> {
    item: T,
    deadline: Instant,
    /// Insertion order, for a stable tie-break on equal deadlines.
    seq: u64,
}

/// Ordered queue returning the earliest-deadline ready item.
pub struct DeadlineQueue<T> {
    inbox: FifoQueue<Entry<T>>,
    ordered: Mutex<VecDeque<Entry<T>>>,
    work: Condvar,
    next_seq: AtomicU64,
    len: AtomicUsize,
}

impl<T> DeadlineQueue<T> {
    pub fn new() -> Self {
        DeadlineQueue {
            inbox: FifoQueue::new(),
            ordered: Mutex::new(VecDeque::new()),
            work: Condvar::new(),
            next_seq: AtomicU64::new(0),
            len: AtomicUsize::new(0),
        }
    }

    /// Schedule `item` to be completed within `max_latency` from now.
    ///
    /// The deadline is computed here, exactly once, and never changes.
    /// Producers never take the order lock; the entry lands in the lock-free
    /// inbox and is merged during a later `dequeue`.
    pub fn enqueue(&self, item: T, max_latency: Duration) {
        let entry = Entry {
            item,
            deadline: Instant::now() + max_latency,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };
        self.inbox.enqueue(entry);
        self.len.fetch_add(1, Ordering::Release);
        // Wake a consumer sleeping in block_for_work.
        let _guard = self.ordered.lock();
        self.work.notify_all();
    }

    /// Remove the item with the earliest deadline, or `None` when empty.
    pub fn dequeue(&self) -> Option<T> {
        self.dequeue_ready(|_| false)
    }

    /// Remove the earliest-deadline item for which `is_skippable` is false.
    ///
    /// Skippable items (periodic work that is not yet due to repeat) are
    /// walked past without being removed, so a not-ready item with an early
    /// deadline never starves ready items behind it.
    pub fn dequeue_ready(&self, is_skippable: impl Fn(&T) -> bool) -> Option<T> {
        let mut ordered = self.ordered.lock();
        self.merge_inbox(&mut ordered);
        let idx = ordered.iter().position(|e| !is_skippable(&e.item))?;
        let entry = ordered.remove(idx)?;
        self.len.fetch_sub(1, Ordering::Release);
        Some(entry.item)
    }

    /// Merge inbox entries into the sorted list, stopping as soon as the
    /// sorted head is overdue: an overdue item must be returnable
    /// immediately, without paying insertion costs first.
    fn merge_inbox(&self, ordered: &mut VecDeque<Entry<T>>) {
        let now = Instant::now();
        loop {
            if ordered.front().map_or(false, |e| e.deadline <= now) {
                return;
            }
            let Some(entry) = self.inbox.dequeue() else {
                return;
            };
            let key = (entry.deadline, entry.seq);
            let pos = ordered
                .iter()
                .position(|e| (e.deadline, e.seq) > key)
                .unwrap_or(ordered.len());
            ordered.insert(pos, entry);
        }
    }

    /// Sleep until an enqueue occurs or `timeout` elapses.
    ///
    /// Returns `true` when work may be available. Returns immediately if
    /// the queue is already non-empty.
    pub fn block_for_work(&self, timeout: Duration) -> bool {
        if !self.is_empty() {
            return true;
        }
        let mut ordered = self.ordered.lock();
        if !self.is_empty() {
            return true;
        }
        self.work.wait_for(&mut ordered, timeout);
        !self.is_empty()
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for DeadlineQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
