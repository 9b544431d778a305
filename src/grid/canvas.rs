//! Latency-aware virtual canvas.
//!
//! An arbitrarily large 2-D color buffer whose visible window is a
//! scrollable subset backed by a small physical surface. Scripts write
//! `target` colors without ever blocking on hardware; the canvas enqueues
//! each physical write as a [`Task`] on the deadline queue and consumes the
//! completion callback to reconcile what we believe is actually glowing.
//!
//! Three states per visible cell:
//! - `target` — last value a writer asked for (kept for every virtual cell),
//! - `dispatched` — last value sent toward hardware for the window slot,
//! - `confirmed` — last value the transport acknowledged as applied.
//!
//! `dispatched` is only touched by the canvas's own write path; `confirmed`
//! only by completion callbacks, which arrive asynchronously and possibly
//! after the dispatch they report on has been superseded. Every dispatch is
//! stamped with a monotonically increasing sequence number and a completion
//! is ignored unless its stamp still matches the slot, so stale
//! acknowledgements never overwrite newer state.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::sched::{DeadlineQueue, Task, TaskError};

use super::color::{Color, COLOR_OFF, COLOR_OFF_GRID, COLOR_UNSET};

/// Physical transport write surface.
///
/// Coordinates are window-relative (the physical device's own space). The
/// implementation is expected to be slow and serial; it is only ever called
/// from scheduler consumer threads, never from producers.
pub trait Transport: Send + Sync {
    fn send(&self, x: i32, y: i32, color: Color) -> Result<(), TaskError>;
}

/// Extents and latency budget for a canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CanvasConfig {
    /// Virtual extent.
    pub width: i32,
    pub height: i32,
    /// Visible window extent (the physical surface).
    pub visible_width: i32,
    pub visible_height: i32,
    /// Complete-by budget for each enqueued hardware write.
    pub max_latency: Duration,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        CanvasConfig {
            width: 64,
            height: 64,
            visible_width: 8,
            visible_height: 8,
            max_latency: Duration::from_millis(10),
        }
    }
}

/// Per-window-slot hardware state.
#[derive(Debug, Clone, Copy)]
struct Slot {
    /// Last color sent toward hardware; `None` = never dispatched (or
    /// invalidated by `force_repaint`/`resize_visible`).
    dispatched: Option<Color>,
    /// Last color the transport acknowledged.
    confirmed: Color,
    /// Sequence stamp of the latest dispatch for this slot.
    seq: u64,
}

impl Slot {
    fn fresh() -> Self {
        Slot {
            dispatched: None,
            confirmed: COLOR_UNSET,
            seq: 0,
        }
    }
}

struct CanvasState {
    width: i32,
    height: i32,
    visible_width: i32,
    visible_height: i32,
    /// Virtual coordinate of the window's top-left corner.
    origin_x: i32,
    origin_y: i32,
    /// Full virtual backing store, row-major.
    target: Vec<Color>,
    /// Window cache, row-major over the visible extent.
    slots: Vec<Slot>,
    next_seq: u64,
}

impl CanvasState {
    fn target_index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        // Index math in usize: i32 products overflow for large extents.
        Some(y as usize * self.width as usize + x as usize)
    }

    fn slot_index(&self, x: i32, y: i32) -> Option<usize> {
        let wx = x - self.origin_x;
        let wy = y - self.origin_y;
        if wx < 0 || wy < 0 || wx >= self.visible_width || wy >= self.visible_height {
            return None;
        }
        Some(wy as usize * self.visible_width as usize + wx as usize)
    }
}

/// Scrollable virtual surface over one physical output.
///
/// Safe to share across producer threads; one mutex serializes the backing
/// store (cross-cell operations need exclusive access regardless, and
/// per-cell writes hold it only briefly). Dispatch never runs transport I/O
/// inline — it only enqueues.
pub struct VirtualCanvas {
    state: Arc<Mutex<CanvasState>>,
    queue: Arc<DeadlineQueue<Task>>,
    transport: Arc<dyn Transport>,
    max_latency: Duration,
}

impl VirtualCanvas {
    pub fn new(
        config: CanvasConfig,
        queue: Arc<DeadlineQueue<Task>>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (width, height) = (config.width.max(0), config.height.max(0));
        let (visible_width, visible_height) =
            (config.visible_width.max(0), config.visible_height.max(0));
        let state = CanvasState {
            width,
            height,
            visible_width,
            visible_height,
            origin_x: 0,
            origin_y: 0,
            target: vec![COLOR_UNSET; width as usize * height as usize],
            slots: vec![Slot::fresh(); visible_width as usize * visible_height as usize],
            next_seq: 0,
        };
        VirtualCanvas {
            state: Arc::new(Mutex::new(state)),
            queue,
            transport,
            max_latency: config.max_latency,
        }
    }

    /// Set the target color of a virtual cell.
    ///
    /// Off-grid coordinates are a silent no-op. A cell inside the visible
    /// window is dispatched toward hardware immediately (unless the color
    /// already matches what was last dispatched).
    pub fn set(&self, x: i32, y: i32, color: Color) {
        let mut state = self.state.lock();
        let Some(idx) = state.target_index(x, y) else {
            return;
        };
        state.target[idx] = color;
        self.send_xy(&mut state, x, y);
    }

    /// `set` every in-grid cell of the current visible window.
    pub fn set_all(&self, color: Color) {
        let mut state = self.state.lock();
        let (ox, oy) = (state.origin_x, state.origin_y);
        for wy in 0..state.visible_height {
            for wx in 0..state.visible_width {
                let (x, y) = (ox + wx, oy + wy);
                if let Some(idx) = state.target_index(x, y) {
                    state.target[idx] = color;
                    self.send_xy(&mut state, x, y);
                }
            }
        }
    }

    /// Target color of a cell, or [`COLOR_OFF_GRID`] outside the virtual
    /// extent. Unwritten cells read [`COLOR_UNSET`].
    pub fn get(&self, x: i32, y: i32) -> Color {
        let state = self.state.lock();
        match state.target_index(x, y) {
            Some(idx) => state.target[idx],
            None => COLOR_OFF_GRID,
        }
    }

    /// Last hardware-confirmed color of a cell.
    ///
    /// [`COLOR_OFF_GRID`] outside the virtual extent; [`COLOR_UNSET`] for
    /// in-grid cells outside the visible window (no hardware state is
    /// tracked for them). Divergence from `get` is the visible symptom of
    /// transport failures and in-flight writes.
    pub fn get_actual(&self, x: i32, y: i32) -> Color {
        let state = self.state.lock();
        if state.target_index(x, y).is_none() {
            return COLOR_OFF_GRID;
        }
        match state.slot_index(x, y) {
            Some(idx) => state.slots[idx].confirmed,
            None => COLOR_UNSET,
        }
    }

    /// Move the visible window origin to `(x, y)` and repaint.
    pub fn scroll_to(&self, x: i32, y: i32) {
        let mut state = self.state.lock();
        state.origin_x = x;
        state.origin_y = y;
        self.repaint_locked(&mut state);
    }

    /// Move the visible window origin by `(dx, dy)` and repaint.
    pub fn scroll_by(&self, dx: i32, dy: i32) {
        let mut state = self.state.lock();
        state.origin_x += dx;
        state.origin_y += dy;
        self.repaint_locked(&mut state);
    }

    /// Scroll by whole window extents.
    pub fn scroll_by_page(&self, pages_x: i32, pages_y: i32) {
        let mut state = self.state.lock();
        state.origin_x += pages_x * state.visible_width;
        state.origin_y += pages_y * state.visible_height;
        self.repaint_locked(&mut state);
    }

    /// Current visible window origin.
    pub fn origin(&self) -> (i32, i32) {
        let state = self.state.lock();
        (state.origin_x, state.origin_y)
    }

    /// Reallocate the virtual backing store to `width x height`, copying
    /// the overlapping region. New cells start unset.
    ///
    /// Caller discipline: must not be called while writes are in flight
    /// (completion callbacks for old dispatches remain harmless, but
    /// concurrent `set` calls may interleave with the copy).
    pub fn resize(&self, width: i32, height: i32) {
        let mut state = self.state.lock();
        let (width, height) = (width.max(0), height.max(0));
        log::debug!(
            "canvas: resize {}x{} -> {}x{}",
            state.width,
            state.height,
            width,
            height
        );
        let mut target = vec![COLOR_UNSET; width as usize * height as usize];
        for y in 0..height.min(state.height) {
            for x in 0..width.min(state.width) {
                target[y as usize * width as usize + x as usize] =
                    state.target[y as usize * state.width as usize + x as usize];
            }
        }
        state.width = width;
        state.height = height;
        state.target = target;
    }

    /// Reallocate the window cache to `width x height` (a resized or
    /// replaced physical surface) and repaint everything.
    ///
    /// Every slot starts never-dispatched, so the repaint re-sends every
    /// visible color regardless of history; sequence stamps reset, which
    /// also retires any completion still in flight for the old surface.
    pub fn resize_visible(&self, width: i32, height: i32) {
        let mut state = self.state.lock();
        let (width, height) = (width.max(0), height.max(0));
        log::debug!(
            "canvas: resize visible {}x{} -> {}x{}",
            state.visible_width,
            state.visible_height,
            width,
            height
        );
        state.visible_width = width;
        state.visible_height = height;
        state.slots = vec![Slot::fresh(); width as usize * height as usize];
        self.repaint_locked(&mut state);
    }

    /// Invalidate the dispatched cache for every visible cell (targets
    /// untouched) and repaint, re-sending every visible color even where
    /// nothing changed. Used after reconnecting a device.
    pub fn force_repaint(&self) {
        let mut state = self.state.lock();
        for slot in &mut state.slots {
            slot.dispatched = None;
        }
        self.repaint_locked(&mut state);
    }

    /// Dispatch every in-grid visible cell whose target differs from what
    /// was last dispatched.
    pub fn repaint(&self) {
        let mut state = self.state.lock();
        self.repaint_locked(&mut state);
    }

    fn repaint_locked(&self, state: &mut CanvasState) {
        let (ox, oy) = (state.origin_x, state.origin_y);
        for wy in 0..state.visible_height {
            for wx in 0..state.visible_width {
                self.send_xy(state, ox + wx, oy + wy);
            }
        }
    }

    /// The dispatch path for one virtual coordinate.
    ///
    /// Skips coordinates off the virtual grid or outside the window, and
    /// colors matching the last dispatch (no-op writes cost no hardware
    /// bandwidth). Otherwise stamps the slot and enqueues the write with a
    /// completion callback that confirms the color — if, and only if, the
    /// stamp is still the slot's latest by the time the transport reports.
    fn send_xy(&self, state: &mut CanvasState, x: i32, y: i32) {
        let Some(target_idx) = state.target_index(x, y) else {
            return;
        };
        let Some(slot_idx) = state.slot_index(x, y) else {
            return;
        };
        let target = state.target[target_idx];
        let color = if target == COLOR_UNSET { COLOR_OFF } else { target };
        if state.slots[slot_idx].dispatched == Some(color) {
            return;
        }
        state.next_seq += 1;
        let seq = state.next_seq;
        state.slots[slot_idx].dispatched = Some(color);
        state.slots[slot_idx].seq = seq;

        // Physical coordinates are window-relative.
        let px = x - state.origin_x;
        let py = y - state.origin_y;
        let transport = Arc::clone(&self.transport);
        let shared = Arc::clone(&self.state);
        let task = Task::new(move || transport.send(px, py, color)).on_complete(move |result| {
            match result {
                Ok(()) => {
                    let mut state = shared.lock();
                    match state.slots.get_mut(slot_idx) {
                        Some(slot) if slot.seq == seq => slot.confirmed = color,
                        _ => log::trace!(
                            "canvas: ignoring stale completion for slot {} (seq {})",
                            slot_idx,
                            seq
                        ),
                    }
                }
                Err(err) => {
                    // Confirmed state is left as-is; get_actual diverging
                    // from get is the observability mechanism.
                    log::debug!("canvas: write ({}, {}) failed: {}", px, py, err);
                }
            }
        });
        self.queue.enqueue(task, self.max_latency);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    /// Transport that records every write; can be switched to fail.
    struct RecordingTransport {
        writes: PlMutex<Vec<(i32, i32, Color)>>,
        fail: std::sync::atomic::AtomicBool,
    }

    impl RecordingTransport {
        fn new() -> Arc<Self> {
            Arc::new(RecordingTransport {
                writes: PlMutex::new(Vec::new()),
                fail: std::sync::atomic::AtomicBool::new(false),
            })
        }

        fn writes(&self) -> Vec<(i32, i32, Color)> {
            self.writes.lock().clone()
        }
    }

    impl Transport for RecordingTransport {
        fn send(&self, x: i32, y: i32, color: Color) -> Result<(), TaskError> {
            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(TaskError::new("transport offline"));
            }
            self.writes.lock().push((x, y, color));
            Ok(())
        }
    }

    fn fixture(config: CanvasConfig) -> (VirtualCanvas, Arc<DeadlineQueue<Task>>, Arc<RecordingTransport>) {
        let queue = Arc::new(DeadlineQueue::new());
        let transport = RecordingTransport::new();
        let canvas = VirtualCanvas::new(
            config,
            Arc::clone(&queue),
            Arc::clone(&transport) as Arc<dyn Transport>,
        );
        (canvas, queue, transport)
    }

    /// Run every task currently enqueued, synchronously.
    fn drain(queue: &DeadlineQueue<Task>) -> usize {
        let mut count = 0;
        while let Some(task) = queue.dequeue() {
            task.execute();
            count += 1;
        }
        count
    }

    fn small() -> CanvasConfig {
        CanvasConfig {
            width: 4,
            height: 4,
            visible_width: 2,
            visible_height: 2,
            max_latency: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_get_sentinels() {
        let (canvas, _queue, _t) = fixture(small());
        assert_eq!(canvas.get(0, 0), COLOR_UNSET);
        assert_eq!(canvas.get(-1, 0), COLOR_OFF_GRID);
        assert_eq!(canvas.get(4, 4), COLOR_OFF_GRID);
        assert_eq!(canvas.get_actual(9, 9), COLOR_OFF_GRID);
        // In-grid but outside the 2x2 window: no hardware state tracked
        assert_eq!(canvas.get_actual(3, 3), COLOR_UNSET);
    }

    #[test]
    fn test_set_inside_window_dispatches_once() {
        let (canvas, queue, transport) = fixture(small());
        canvas.set(0, 0, 5);
        canvas.set(0, 0, 5); // same color: no second dispatch
        assert_eq!(drain(&queue), 1);
        assert_eq!(transport.writes(), vec![(0, 0, 5)]);
        assert_eq!(canvas.get_actual(0, 0), 5);
    }

    #[test]
    fn test_set_outside_window_does_not_dispatch() {
        let (canvas, queue, _t) = fixture(small());
        canvas.set(3, 3, 7);
        assert_eq!(drain(&queue), 0);
        assert_eq!(canvas.get(3, 3), 7);
    }

    #[test]
    fn test_force_repaint_resends_unchanged_color() {
        let (canvas, queue, transport) = fixture(small());
        canvas.set(0, 0, 5);
        drain(&queue);
        canvas.force_repaint();
        // All four window slots resend: the set cell plus three cleared ones
        assert_eq!(drain(&queue), 4);
        assert!(transport.writes().contains(&(0, 0, 5)));
        assert_eq!(transport.writes().iter().filter(|w| **w == (0, 0, 5)).count(), 2);
    }

    #[test]
    fn test_scrolled_in_cell_dispatches_exactly_once() {
        let (canvas, queue, transport) = fixture(small());
        canvas.set(2, 2, 9); // off-window: no dispatch yet
        assert_eq!(drain(&queue), 0);

        canvas.scroll_by(2, 2); // repaints
        drain(&queue);
        // Virtual (2,2) now sits at window slot (0,0)
        assert!(transport.writes().contains(&(0, 0, 9)));
        assert_eq!(transport.writes().iter().filter(|w| w.2 == 9).count(), 1);

        // A second repaint sends nothing new
        canvas.repaint();
        assert_eq!(drain(&queue), 0);
    }

    #[test]
    fn test_set_all_covers_window_only() {
        let (canvas, queue, transport) = fixture(small());
        canvas.set_all(3);
        assert_eq!(drain(&queue), 4); // 2x2 window
        assert_eq!(transport.writes().len(), 4);
        assert_eq!(canvas.get(0, 0), 3);
        // Cells outside the window keep their targets
        assert_eq!(canvas.get(3, 3), COLOR_UNSET);
    }

    #[test]
    fn test_transport_failure_leaves_confirmed_diverged() {
        let (canvas, queue, transport) = fixture(small());
        transport.fail.store(true, std::sync::atomic::Ordering::SeqCst);
        canvas.set(1, 1, 6);
        drain(&queue);
        assert_eq!(canvas.get(1, 1), 6);
        assert_eq!(canvas.get_actual(1, 1), COLOR_UNSET);

        // Recovery: force a repaint once the transport is back
        transport.fail.store(false, std::sync::atomic::Ordering::SeqCst);
        canvas.force_repaint();
        drain(&queue);
        assert_eq!(canvas.get_actual(1, 1), 6);
    }

    #[test]
    fn test_stale_completion_is_ignored() {
        let (canvas, queue, _t) = fixture(small());
        canvas.set(0, 0, 1);
        let first = queue.dequeue().unwrap();
        canvas.set(0, 0, 2);
        let second = queue.dequeue().unwrap();

        // Completions arrive out of order: the superseded write reports last
        second.execute();
        first.execute();
        assert_eq!(canvas.get_actual(0, 0), 2);
    }

    #[test]
    fn test_resize_copies_overlap() {
        let (canvas, queue, _t) = fixture(small());
        canvas.set(1, 1, 4);
        canvas.set(3, 3, 8);
        drain(&queue);

        canvas.resize(2, 2);
        assert_eq!(canvas.get(1, 1), 4);
        assert_eq!(canvas.get(3, 3), COLOR_OFF_GRID); // now off-grid

        canvas.resize(6, 6);
        assert_eq!(canvas.get(1, 1), 4);
        assert_eq!(canvas.get(3, 3), COLOR_UNSET); // lost in the shrink
    }

    #[test]
    fn test_resize_visible_forces_full_resend() {
        let (canvas, queue, transport) = fixture(small());
        canvas.set(0, 0, 5);
        drain(&queue);

        canvas.resize_visible(3, 3);
        // New 3x3 surface: every in-grid slot is repainted from scratch
        assert_eq!(drain(&queue), 9);
        assert_eq!(transport.writes().iter().filter(|w| **w == (0, 0, 5)).count(), 2);
    }

    #[test]
    fn test_scroll_by_page_moves_whole_window() {
        let (canvas, _queue, _t) = fixture(small());
        canvas.scroll_by_page(1, 0);
        assert_eq!(canvas.origin(), (2, 0));
        canvas.scroll_by_page(0, 1);
        assert_eq!(canvas.origin(), (2, 2));
    }

    #[test]
    fn test_index_math_survives_huge_extents() {
        // A million-square virtual extent: y * width + x far exceeds i32.
        // The backing store is left empty on purpose; only the coordinate
        // arithmetic is under test here.
        let state = CanvasState {
            width: 1_000_000,
            height: 1_000_000,
            visible_width: 8,
            visible_height: 8,
            origin_x: 999_992,
            origin_y: 999_992,
            target: Vec::new(),
            slots: Vec::new(),
            next_seq: 0,
        };
        assert_eq!(
            state.target_index(999_999, 999_999),
            Some(999_999 * 1_000_000 + 999_999)
        );
        assert_eq!(state.target_index(1_000_000, 0), None);
        // Bottom-right window slot, unaffected by the huge origin
        assert_eq!(state.slot_index(999_999, 999_999), Some(63));
    }

    #[test]
    fn test_window_slots_past_virtual_edge_are_skipped() {
        let (canvas, queue, _t) = fixture(small());
        canvas.scroll_to(3, 3); // only virtual (3,3) remains in-grid
        assert_eq!(drain(&queue), 1); // the single in-grid slot clears to off
        assert_eq!(canvas.get_actual(3, 3), COLOR_OFF);
    }
}
