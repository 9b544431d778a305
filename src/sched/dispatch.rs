//! Blocking dispatch queue with a two-phase shutdown handshake.
//!
//! Wraps [`FifoQueue`] with a condition variable so a consumer thread can
//! sleep until work arrives, and adds the shutdown protocol: a controller
//! calls `request_shutdown`, the consumer drains what is buffered and calls
//! `acknowledge_shutdown`, and the controller's `wait_for_shutdown_ack`
//! returns only once the consumer has provably finished.

use parking_lot::{Condvar, Mutex};

use super::fifo::FifoQueue;

#[derive(Default)]
struct DispatchState {
    shutdown_requested: bool,
    shutdown_acked: bool,
}

/// Blocking wrapper over the lock-free FIFO.
///
/// Producers stay fast: `enqueue` takes the state lock only long enough to
/// check the shutdown flag and signal the consumer. The fifo itself is
/// untouched by the lock.
pub struct DispatchQueue<T> {
    fifo: FifoQueue<T>,
    state: Mutex<DispatchState>,
    available: Condvar,
    ack: Condvar,
}

impl<T> DispatchQueue<T> {
    pub fn new() -> Self {
        DispatchQueue {
            fifo: FifoQueue::new(),
            state: Mutex::new(DispatchState::default()),
            available: Condvar::new(),
            ack: Condvar::new(),
        }
    }

    /// Append an item and wake one waiting consumer.
    ///
    /// Once shutdown has been requested the item is dropped silently:
    /// producers cannot be expected to synchronize with the consumer
    /// lifecycle, so this is not an error.
    pub fn enqueue(&self, item: T) {
        let state = self.state.lock();
        if state.shutdown_requested {
            log::trace!("dispatch queue: dropping enqueue after shutdown request");
            return;
        }
        // Linking under the lock closes the window where a consumer has
        // re-checked emptiness but not yet started waiting.
        self.fifo.enqueue(item);
        self.available.notify_one();
    }

    /// Remove the oldest item.
    ///
    /// Single-consumer contract: at most one thread may call this at a
    /// time, same as the underlying fifo — the wrapper adds blocking, not
    /// multi-consumer safety (the fast path below touches the fifo outside
    /// the state lock).
    ///
    /// With `block = false` this returns `None` immediately when empty.
    /// With `block = true` it sleeps until an item arrives or shutdown is
    /// requested; after a shutdown request it keeps returning buffered
    /// items until the queue is drained, then `None`.
    pub fn dequeue(&self, block: bool) -> Option<T> {
        if let Some(item) = self.fifo.dequeue() {
            return Some(item);
        }
        if !block {
            return None;
        }
        let mut state = self.state.lock();
        loop {
            // Re-check under the lock: an enqueue may have landed between
            // the lock-free miss above and acquiring the state lock.
            if let Some(item) = self.fifo.dequeue() {
                return Some(item);
            }
            if state.shutdown_requested {
                return None;
            }
            self.available.wait(&mut state);
        }
    }

    /// Begin shutdown: reject further enqueues and wake every blocked
    /// consumer so it can drain and acknowledge.
    pub fn request_shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown_requested = true;
        self.available.notify_all();
        log::debug!("dispatch queue: shutdown requested");
    }

    /// Called by the consumer once it has observed the shutdown request and
    /// finished draining.
    pub fn acknowledge_shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown_acked = true;
        self.ack.notify_all();
        log::debug!("dispatch queue: shutdown acknowledged");
    }

    /// Block until the consumer has acknowledged shutdown.
    pub fn wait_for_shutdown_ack(&self) {
        let mut state = self.state.lock();
        while !state.shutdown_acked {
            self.ack.wait(&mut state);
        }
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.state.lock().shutdown_requested
    }

    pub fn is_empty(&self) -> bool {
        self.fifo.is_empty()
    }
}

impl<T> Default for DispatchQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
