//! Scheduler context and consumer threads.
//!
//! The original design reached for process-wide singletons to find its
//! queues; here the context is constructed explicitly and handed to every
//! component that enqueues work. [`SchedulerRuntime`] owns the consumer
//! threads that drain the context's queues and perform transport I/O.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::deadline::DeadlineQueue;
use super::task::Task;
use super::timed::TimedQueue;

/// Tunables for the scheduling layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SchedulerConfig {
    /// Below this remaining duration the exact-time consumer switches from
    /// a coarse sleep to a busy-spin.
    pub spin_threshold: Duration,
    /// How long the deadline consumer sleeps in `block_for_work` before
    /// re-checking for shutdown.
    pub poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            spin_threshold: Duration::from_millis(2),
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Explicitly constructed bundle of the two ordered task queues.
///
/// Producer contexts clone the `Arc`s they need; nothing here is ambient
/// process state.
pub struct SchedulerContext {
    deadline: Arc<DeadlineQueue<Task>>,
    timed: Arc<TimedQueue<Task>>,
    config: SchedulerConfig,
}

impl SchedulerContext {
    pub fn new(config: SchedulerConfig) -> Self {
        SchedulerContext {
            deadline: Arc::new(DeadlineQueue::new()),
            timed: Arc::new(TimedQueue::new(config.spin_threshold)),
            config,
        }
    }

    pub fn deadline_queue(&self) -> &Arc<DeadlineQueue<Task>> {
        &self.deadline
    }

    pub fn timed_queue(&self) -> &Arc<TimedQueue<Task>> {
        &self.timed
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }
}

impl Default for SchedulerContext {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

/// Consumer threads draining a [`SchedulerContext`].
///
/// One thread per queue: the deadline worker alternates `dequeue` with
/// `block_for_work`, the timed worker blocks in `dequeue` until the queue
/// is disabled. Producers never run transport I/O; these threads do.
pub struct SchedulerRuntime {
    running: Arc<AtomicBool>,
    deadline: Arc<DeadlineQueue<Task>>,
    timed: Arc<TimedQueue<Task>>,
    handles: Vec<JoinHandle<()>>,
}

impl SchedulerRuntime {
    pub fn start(ctx: &SchedulerContext) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let poll_interval = ctx.config.poll_interval;
        let mut handles = Vec::with_capacity(2);

        {
            let running = Arc::clone(&running);
            let deadline = Arc::clone(&ctx.deadline);
            handles.push(thread::spawn(move || {
                log::info!("deadline worker started");
                while running.load(Ordering::Acquire) {
                    match deadline.dequeue() {
                        Some(task) => task.execute(),
                        None => {
                            deadline.block_for_work(poll_interval);
                        }
                    }
                }
                // Drain what was committed before the stop flag was seen.
                while let Some(task) = deadline.dequeue() {
                    task.execute();
                }
                log::info!("deadline worker stopped");
            }));
        }

        {
            let timed = Arc::clone(&ctx.timed);
            handles.push(thread::spawn(move || {
                log::info!("timed worker started");
                while let Ok(task) = timed.dequeue() {
                    task.execute();
                }
                log::info!("timed worker stopped");
            }));
        }

        SchedulerRuntime {
            running,
            deadline: Arc::clone(&ctx.deadline),
            timed: Arc::clone(&ctx.timed),
            handles,
        }
    }

    /// Stop both consumers and join their threads.
    ///
    /// Deadline work already enqueued is drained before the worker exits;
    /// the timed queue is disabled, releasing its consumer immediately.
    pub fn shutdown(mut self) {
        log::info!("scheduler runtime: shutting down");
        self.running.store(false, Ordering::Release);
        // Nudge the deadline worker out of block_for_work.
        self.deadline.enqueue(Task::new(|| Ok(())), Duration::ZERO);
        self.timed.disable();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                log::error!("scheduler worker panicked during shutdown");
            }
        }
        log::info!("scheduler runtime: shutdown complete");
    }
}
