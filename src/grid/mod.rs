// Purpose - hardware virtualization: coordinate composition and the canvas

pub mod canvas;
pub mod color;
pub mod region;

pub use canvas::{CanvasConfig, Transport, VirtualCanvas};
pub use color::{Color, COLOR_OFF, COLOR_OFF_GRID, COLOR_UNSET};
pub use region::{ComposerError, RangeMap, RegionSpec};
