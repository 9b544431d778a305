//! Lock-free unbounded MPSC queue.
//!
//! Singly linked list with a sentinel node. Producers append by atomically
//! swapping the tail pointer and then linking the previous tail's `next`;
//! the single consumer advances the head with a CAS loop. Neither side ever
//! blocks; `dequeue` returns `None` instead of waiting.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

struct Node<T> {
    next: AtomicPtr<Node<T>>,
    payload: Option<T>,
}

impl<T> Node<T> {
    fn boxed(payload: Option<T>) -> *mut Node<T> {
        Box::into_raw(Box::new(Node {
            next: AtomicPtr::new(ptr::null_mut()),
            payload,
        }))
    }
}

/// Unbounded multi-producer single-consumer FIFO.
///
/// `enqueue` is safe from any number of threads and never blocks. `dequeue`
/// must only be called by one thread at a time; FIFO order is guaranteed
/// among items fully enqueued before a dequeue observes them. A producer
/// that has swapped the tail but not yet linked `next` leaves its item (and
/// any behind it) momentarily invisible, which a later dequeue resolves.
pub struct FifoQueue<T> {
    /// Consumer side. Always points at the current sentinel node.
    head: AtomicPtr<Node<T>>,
    /// Producer side. The most recently appended node.
    tail: AtomicPtr<Node<T>>,
}

unsafe impl<T: Send> Send for FifoQueue<T> {}
unsafe impl<T: Send> Sync for FifoQueue<T> {}

impl<T> FifoQueue<T> {
    pub fn new() -> Self {
        let sentinel = Node::boxed(None);
        FifoQueue {
            head: AtomicPtr::new(sentinel),
            tail: AtomicPtr::new(sentinel),
        }
    }

    /// Append an item. Never blocks; safe for concurrent producers.
    pub fn enqueue(&self, item: T) {
        let node = Node::boxed(Some(item));
        let prev = self.tail.swap(node, Ordering::AcqRel);
        // `next` of a linked node is set exactly once, here.
        unsafe { (*prev).next.store(node, Ordering::Release) };
    }

    /// Remove the oldest visible item, or `None` when the queue is empty.
    ///
    /// Single-consumer contract: at most one thread may call this at a
    /// time. The read node's payload is moved out and the old sentinel is
    /// freed; nodes are never reused after being read.
    pub fn dequeue(&self) -> Option<T> {
        loop {
            let head = self.head.load(Ordering::Acquire);
            let next = unsafe { (*head).next.load(Ordering::Acquire) };
            if next.is_null() {
                return None;
            }
            if self
                .head
                .compare_exchange(head, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                // The CAS gives this thread exclusive ownership of both
                // nodes: `next` becomes the new sentinel, `head` is retired.
                let payload = unsafe { (*next).payload.take() };
                drop(unsafe { Box::from_raw(head) });
                return payload;
            }
        }
    }

    /// Cheap emptiness hint. May report empty while a producer is mid-link.
    pub fn is_empty(&self) -> bool {
        let head = self.head.load(Ordering::Acquire);
        unsafe { (*head).next.load(Ordering::Acquire).is_null() }
    }
}

impl<T> Default for FifoQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for FifoQueue<T> {
    fn drop(&mut self) {
        let mut node = self.head.load(Ordering::Relaxed);
        while !node.is_null() {
            let boxed = unsafe { Box::from_raw(node) };
            node = boxed.next.load(Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_empty_dequeue_returns_none() {
        let q: FifoQueue<u32> = FifoQueue::new();
        assert!(q.is_empty());
        assert_eq!(q.dequeue(), None);
    }

    #[test]
    fn test_fifo_order_single_producer() {
        let q = FifoQueue::new();
        for i in 0..100 {
            q.enqueue(i);
        }
        for i in 0..100 {
            assert_eq!(q.dequeue(), Some(i));
        }
        assert_eq!(q.dequeue(), None);
    }

    #[test]
    fn test_per_producer_order_with_many_producers() {
        const PRODUCERS: u64 = 4;
        const PER_PRODUCER: u64 = 2_000;

        let q = Arc::new(FifoQueue::new());
        let mut handles = Vec::new();
        for p in 0..PRODUCERS {
            let q = Arc::clone(&q);
            handles.push(thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    q.enqueue((p, i));
                }
            }));
        }

        // Single consumer drains concurrently with the producers.
        let mut last_seen = vec![None::<u64>; PRODUCERS as usize];
        let mut total = 0;
        while total < PRODUCERS * PER_PRODUCER {
            if let Some((p, i)) = q.dequeue() {
                // Items from one producer must arrive in that producer's order
                let prev = last_seen[p as usize].replace(i);
                assert!(prev.map_or(i == 0, |prev| i == prev + 1));
                total += 1;
            }
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(q.dequeue(), None);
    }

    #[test]
    fn test_drop_reclaims_unread_payloads() {
        let q = FifoQueue::new();
        let payload = Arc::new(());
        for _ in 0..10 {
            q.enqueue(Arc::clone(&payload));
        }
        drop(q);
        assert_eq!(Arc::strong_count(&payload), 1);
    }
}
