//! Location keys for voxel cells.
//!
//! A [`LocationKey`] is a plain value: world identifier plus integer block
//! coordinates. Two reports about the same real-world cell always produce
//! equal keys, which is what lets a second removal supersede the first.

use serde::{Deserialize, Serialize};

use crate::ids::WorldId;

/// Address of a single voxel cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocationKey {
    /// World hosting the cell.
    pub world: WorldId,
    /// Block X coordinate.
    pub x: i32,
    /// Block Y coordinate.
    pub y: i32,
    /// Block Z coordinate.
    pub z: i32,
}

impl LocationKey {
    /// Build a key from a world and block coordinates.
    pub const fn new(world: WorldId, x: i32, y: i32, z: i32) -> Self {
        Self { world, x, y, z }
    }

    /// Return a key in the same world shifted by the given deltas.
    ///
    /// Returns `None` if any coordinate would overflow.
    pub fn offset(&self, dx: i32, dy: i32, dz: i32) -> Option<Self> {
        Some(Self {
            world: self.world,
            x: self.x.checked_add(dx)?,
            y: self.y.checked_add(dy)?,
            z: self.z.checked_add(dz)?,
        })
    }
}

impl core::fmt::Display for LocationKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@({}, {}, {})", self.world, self.x, self.y, self.z)
    }
}
