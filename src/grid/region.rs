//! Coordinate composer: stitches physical device regions into one virtual
//! coordinate space.
//!
//! A [`RegionSpec`] tree declares, per region, which physical rectangle of
//! which device lands where in virtual space; children let physically
//! discontiguous areas form one logical block. [`RangeMap::build`] validates
//! the tree and freezes it into bidirectional lookup tables. Geometry is
//! immutable after construction — reconfiguration rebuilds the whole map.

use std::collections::HashMap;
use std::hash::Hash;

/// Declarative description of one region: a physical rectangle on a device
/// mapped to a virtual origin, plus nested child regions.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegionSpec<D> {
    /// Opaque key distinguishing physical coordinate namespaces.
    pub device: D,
    pub physical_x: i32,
    pub physical_y: i32,
    pub width: i32,
    pub height: i32,
    pub virtual_x: i32,
    pub virtual_y: i32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub children: Vec<RegionSpec<D>>,
}

impl<D> RegionSpec<D> {
    /// Leaf region with no children.
    pub fn new(
        device: D,
        physical_x: i32,
        physical_y: i32,
        width: i32,
        height: i32,
        virtual_x: i32,
        virtual_y: i32,
    ) -> Self {
        RegionSpec {
            device,
            physical_x,
            physical_y,
            width,
            height,
            virtual_x,
            virtual_y,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<RegionSpec<D>>) -> Self {
        self.children = children;
        self
    }
}

/// Errors rejected at composition time.
///
/// Overlap is a configuration bug and is never silently resolved by match
/// order: a layout where two regions claim one cell would make lookups
/// depend on declaration order and hide the mistake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposerError {
    /// A region has zero or negative extent.
    EmptyRegion { width: i32, height: i32 },
    /// Two regions claim the same physical cell on one device.
    PhysicalOverlap { x: i32, y: i32 },
    /// Two regions claim the same virtual cell.
    VirtualOverlap { x: i32, y: i32 },
}

impl std::fmt::Display for ComposerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComposerError::EmptyRegion { width, height } => {
                write!(
                    f,
                    "region has empty extent {}x{} (width and height must be positive)",
                    width, height
                )
            }
            ComposerError::PhysicalOverlap { x, y } => {
                write!(
                    f,
                    "two regions claim physical cell ({}, {}) on the same device",
                    x, y
                )
            }
            ComposerError::VirtualOverlap { x, y } => {
                write!(f, "two regions claim virtual cell ({}, {})", x, y)
            }
        }
    }
}

impl std::error::Error for ComposerError {}

/// Frozen bidirectional mapping between physical and virtual coordinates.
///
/// Both lookup directions are memoized for the map's entire lifetime: the
/// tables are built once from the region tree (depth-first, declaration
/// order) and never mutated afterwards, so no lock or invalidation is
/// needed.
#[derive(Debug, Clone)]
pub struct RangeMap<D> {
    physical_to_virtual: HashMap<(D, i32, i32), (i32, i32)>,
    virtual_to_physical: HashMap<(i32, i32), (D, i32, i32)>,
    total_width: i32,
    total_height: i32,
}

impl<D: Clone + Eq + Hash> RangeMap<D> {
    /// Validate the region tree and freeze it into lookup tables.
    pub fn build(regions: &[RegionSpec<D>]) -> Result<Self, ComposerError> {
        let mut map = RangeMap {
            physical_to_virtual: HashMap::new(),
            virtual_to_physical: HashMap::new(),
            total_width: 0,
            total_height: 0,
        };
        for region in regions {
            map.enter(region)?;
        }
        Ok(map)
    }

    fn enter(&mut self, region: &RegionSpec<D>) -> Result<(), ComposerError> {
        if region.width <= 0 || region.height <= 0 {
            return Err(ComposerError::EmptyRegion {
                width: region.width,
                height: region.height,
            });
        }
        for dy in 0..region.height {
            for dx in 0..region.width {
                let px = region.physical_x + dx;
                let py = region.physical_y + dy;
                let vx = region.virtual_x + dx;
                let vy = region.virtual_y + dy;
                let phys_key = (region.device.clone(), px, py);
                if self.physical_to_virtual.contains_key(&phys_key) {
                    return Err(ComposerError::PhysicalOverlap { x: px, y: py });
                }
                if self.virtual_to_physical.contains_key(&(vx, vy)) {
                    return Err(ComposerError::VirtualOverlap { x: vx, y: vy });
                }
                self.physical_to_virtual.insert(phys_key, (vx, vy));
                self.virtual_to_physical
                    .insert((vx, vy), (region.device.clone(), px, py));
                self.total_width = self.total_width.max(vx + 1);
                self.total_height = self.total_height.max(vy + 1);
            }
        }
        for child in &region.children {
            self.enter(child)?;
        }
        Ok(())
    }

    /// Virtual coordinate for a physical cell, or `None` when the cell is
    /// not covered by any region.
    pub fn physical_to_virtual(&self, device: &D, x: i32, y: i32) -> Option<(i32, i32)> {
        self.physical_to_virtual
            .get(&(device.clone(), x, y))
            .copied()
    }

    /// Device and physical coordinate for a virtual cell, or `None` when
    /// the cell is not covered by any region.
    pub fn virtual_to_physical(&self, x: i32, y: i32) -> Option<(D, i32, i32)> {
        self.virtual_to_physical.get(&(x, y)).cloned()
    }

    /// Logical width of the composed space: the rightmost virtual column
    /// claimed by any region, plus one.
    pub fn total_width(&self) -> i32 {
        self.total_width
    }

    /// Logical height of the composed space.
    pub fn total_height(&self) -> i32 {
        self.total_height
    }
}
