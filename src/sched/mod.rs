//! Concurrent work queues and the consumer runtime that drains them.
//!
//! Leaf-to-root: [`FifoQueue`] is the lock-free MPSC primitive everything
//! else builds on; [`DispatchQueue`] adds consumer blocking and a shutdown
//! handshake; [`DeadlineQueue`] orders work by complete-by deadlines;
//! [`TimedQueue`] fires work at exact instants. [`SchedulerContext`] bundles
//! the two ordered queues and [`SchedulerRuntime`] runs their consumers.

pub mod deadline;
pub mod dispatch;
pub mod fifo;
pub mod task;
pub mod timed;
pub mod worker;

pub use deadline::DeadlineQueue;
pub use dispatch::DispatchQueue;
pub use fifo::FifoQueue;
pub use task::{Task, TaskError, TaskResult};
pub use timed::{TimedQueue, TimedQueueDisabled};
pub use worker::{SchedulerConfig, SchedulerContext, SchedulerRuntime};
