//! Exact-instant work queue.
//!
//! Items are scheduled for a precise future instant rather than "as soon as
//! possible". The consumer uses a hybrid wait: a coarse condvar sleep while
//! the target is far away, then a bounded busy-spin inside a configurable
//! threshold for sub-millisecond accuracy. A newly inserted item with a
//! nearer instant preempts whatever wait is in progress.

use std::collections::VecDeque;
use std::hint;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Error returned by `dequeue` once the queue has been disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedQueueDisabled;

impl std::fmt::Display for TimedQueueDisabled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timed queue is disabled")
    }
}

impl std::error::Error for TimedQueueDisabled {}

struct TimedEntry<T> {
    item: T,
    execute_at: Instant,
}

/// Queue that releases each item at its exact `execute_at` instant.
pub struct TimedQueue<T> {
    entries: Mutex<VecDeque<TimedEntry<T>>>,
    nearer: Condvar,
    enabled: AtomicBool,
    /// Bumped whenever an insert preempts the current head, so a consumer
    /// busy-spinning toward the old head notices and re-targets.
    preempt_epoch: AtomicU64,
    spin_threshold: Duration,
}

impl<T> TimedQueue<T> {
    pub fn new(spin_threshold: Duration) -> Self {
        TimedQueue {
            entries: Mutex::new(VecDeque::new()),
            nearer: Condvar::new(),
            enabled: AtomicBool::new(true),
            preempt_epoch: AtomicU64::new(0),
            spin_threshold,
        }
    }

    /// Schedule `item` for `execute_at`. Returns `false` (dropping the
    /// item) when the queue is disabled.
    ///
    /// Insertion cost is proportional to position; most items are scheduled
    /// far in advance, where that cost is irrelevant to consumers polling
    /// the head.
    pub fn enqueue(&self, item: T, execute_at: Instant) -> bool {
        if !self.enabled.load(Ordering::Acquire) {
            log::trace!("timed queue: dropping enqueue while disabled");
            return false;
        }
        let mut entries = self.entries.lock();
        let preempts = entries.front().map_or(true, |h| execute_at < h.execute_at);
        // Stable on ties: insert after any entry with an equal instant.
        let pos = entries
            .iter()
            .position(|e| e.execute_at > execute_at)
            .unwrap_or(entries.len());
        entries.insert(pos, TimedEntry { item, execute_at });
        if preempts {
            // A wait in progress must abandon its old target for this one.
            self.preempt_epoch.fetch_add(1, Ordering::Release);
            self.nearer.notify_all();
        }
        true
    }

    /// Block until the earliest item's instant has elapsed, then return it.
    ///
    /// Fails fast with [`TimedQueueDisabled`] once `disable` has been
    /// called, including for consumers already blocked.
    pub fn dequeue(&self) -> Result<T, TimedQueueDisabled> {
        let mut entries = self.entries.lock();
        loop {
            if !self.enabled.load(Ordering::Acquire) {
                return Err(TimedQueueDisabled);
            }
            let Some(target) = entries.front().map(|e| e.execute_at) else {
                self.nearer.wait(&mut entries);
                continue;
            };
            let now = Instant::now();
            if now >= target {
                if let Some(entry) = entries.pop_front() {
                    return Ok(entry.item);
                }
                continue;
            }
            let remaining = target - now;
            if remaining > self.spin_threshold {
                // Coarse phase: sleep until roughly the spin threshold,
                // interruptible by a preempting insert or disable.
                self.nearer
                    .wait_for(&mut entries, remaining - self.spin_threshold);
                continue;
            }
            // Spin phase: release the lock so producers can still insert a
            // nearer item, and watch the epoch for exactly that.
            let epoch = self.preempt_epoch.load(Ordering::Acquire);
            parking_lot::MutexGuard::unlocked(&mut entries, || {
                while Instant::now() < target
                    && self.enabled.load(Ordering::Relaxed)
                    && self.preempt_epoch.load(Ordering::Acquire) == epoch
                {
                    hint::spin_loop();
                }
            });
            // Loop re-reads the head: either the target elapsed, a nearer
            // item took its place, or the queue was disabled.
        }
    }

    /// Release all blocked consumers and fail subsequent `dequeue` calls.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
        let _guard = self.entries.lock();
        self.nearer.notify_all();
        log::debug!("timed queue: disabled");
    }

    /// Re-arm the queue after `disable`.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const MS: Duration = Duration::from_millis(1);

    fn queue<T>() -> TimedQueue<T> {
        TimedQueue::new(2 * MS)
    }

    #[test]
    fn test_due_item_returns_immediately() {
        let q = queue();
        q.enqueue("now", Instant::now());
        assert_eq!(q.dequeue(), Ok("now"));
    }

    #[test]
    fn test_items_return_in_execute_at_order() {
        let q = queue();
        let base = Instant::now();
        q.enqueue("third", base + 15 * MS);
        q.enqueue("first", base + 5 * MS);
        q.enqueue("second", base + 10 * MS);
        assert_eq!(q.dequeue(), Ok("first"));
        assert_eq!(q.dequeue(), Ok("second"));
        assert_eq!(q.dequeue(), Ok("third"));
    }

    #[test]
    fn test_dequeue_waits_until_execute_at() {
        let q = queue();
        let start = Instant::now();
        q.enqueue((), start + 20 * MS);
        q.dequeue().unwrap();
        assert!(start.elapsed() >= 20 * MS);
    }

    #[test]
    fn test_nearer_insert_preempts_waiting_consumer() {
        let q = Arc::new(queue());
        let start = Instant::now();
        q.enqueue("far", start + 300 * MS);

        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.dequeue())
        };
        thread::sleep(10 * MS);
        q.enqueue("near", Instant::now() + 5 * MS);

        // The consumer was already waiting on "far"; it must deliver "near"
        // first, long before the far instant.
        assert_eq!(consumer.join().unwrap(), Ok("near"));
        assert!(start.elapsed() < 150 * MS);
        assert_eq!(q.dequeue(), Ok("far"));
    }

    #[test]
    fn test_disable_releases_blocked_consumer() {
        let q: Arc<TimedQueue<()>> = Arc::new(queue());
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.dequeue())
        };
        thread::sleep(10 * MS);
        q.disable();
        assert_eq!(consumer.join().unwrap(), Err(TimedQueueDisabled));
        // Fail-fast once disabled, and enqueues are rejected
        assert_eq!(q.dequeue(), Err(TimedQueueDisabled));
        assert!(!q.enqueue((), Instant::now()));
    }

    #[test]
    fn test_enable_rearms_after_disable() {
        let q = queue();
        q.disable();
        q.enable();
        assert!(q.enqueue("back", Instant::now()));
        assert_eq!(q.dequeue(), Ok("back"));
    }
}
