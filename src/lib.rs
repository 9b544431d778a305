//! Real-time scheduling and grid virtualization for lit-pad controllers.
//!
//! Small button/knob grids sit behind slow, serial, stateful transports, yet
//! many independent scripts want to paint them concurrently with bounded
//! latency. This crate provides the two layers that make that workable:
//!
//! - [`sched`] — a family of concurrent work queues: a lock-free MPSC
//!   primitive, a blocking dispatch queue with a two-phase shutdown
//!   handshake, a deadline-bounded queue, and an exact-instant queue.
//! - [`grid`] — hardware virtualization on top of the queues: a coordinate
//!   composer that stitches physical device regions into one virtual space,
//!   and a scrollable virtual canvas that tracks requested vs. dispatched
//!   vs. hardware-confirmed color per cell.
//!
//! Producers (scripts, incoming event streams) only ever touch fast enqueue
//! paths; dedicated consumer threads perform the slow transport I/O.

pub mod grid;
pub mod sched;

pub use grid::{
    CanvasConfig, Color, ComposerError, RangeMap, RegionSpec, Transport, VirtualCanvas, COLOR_OFF,
    COLOR_OFF_GRID, COLOR_UNSET,
};
pub use sched::{
    DeadlineQueue, DispatchQueue, FifoQueue, SchedulerConfig, SchedulerContext, SchedulerRuntime,
    Task, TaskError, TimedQueue, TimedQueueDisabled,
};
