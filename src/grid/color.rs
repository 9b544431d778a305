//! Opaque color values.
//!
//! Colors are device-independent small integers; mapping names or palettes
//! to hardware encodings is the transport's concern. Negative values are
//! reserved for the sentinels below and never sent to hardware.

/// Device-independent color value.
pub type Color = i32;

/// Cell has never been written.
pub const COLOR_UNSET: Color = -1;

/// Coordinate lies outside the virtual extent (returned by reads).
pub const COLOR_OFF_GRID: Color = -2;

/// What an unset cell dispatches as: pads scrolled into unwritten
/// territory are cleared rather than left showing stale state.
pub const COLOR_OFF: Color = 0;
