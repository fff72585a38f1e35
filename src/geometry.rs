//! Bounding boxes in block coordinates
//!
//! Used to work out which chunks and sections a region of the world touches.

use std::fmt;

use crate::chunk::{ChunkPos, CHUNK_SIDE};

/// Blocks per section side along Y
pub const SECTION_HEIGHT: i32 = 16;

/// Block coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn chunk(&self) -> ChunkPos {
        ChunkPos::from_block(self.x, self.z)
    }
}

impl From<(i32, i32, i32)> for BlockPos {
    fn from((x, y, z): (i32, i32, i32)) -> Self {
        Self { x, y, z }
    }
}

/// Axis-aligned box: `origin` inclusive, `origin + size` exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BoundingBox {
    pub origin: BlockPos,
    pub size: BlockPos,
}

impl BoundingBox {
    /// Negative sizes are clamped to zero
    pub fn new(origin: impl Into<BlockPos>, size: impl Into<BlockPos>) -> Self {
        let size = size.into();
        Self {
            origin: origin.into(),
            size: BlockPos::new(size.x.max(0), size.y.max(0), size.z.max(0)),
        }
    }

    /// Box spanning `min` (inclusive) to `max` (exclusive)
    pub fn from_corners(min: impl Into<BlockPos>, max: impl Into<BlockPos>) -> Self {
        let (min, max) = (min.into(), max.into());
        Self::new(min, (max.x - min.x, max.y - min.y, max.z - min.z))
    }

    pub fn min(&self) -> BlockPos {
        self.origin
    }

    /// One past the largest block in each axis
    pub fn max(&self) -> BlockPos {
        BlockPos::new(
            self.origin.x + self.size.x,
            self.origin.y + self.size.y,
            self.origin.z + self.size.z,
        )
    }

    pub fn volume(&self) -> i64 {
        self.size.x as i64 * self.size.y as i64 * self.size.z as i64
    }

    pub fn is_empty(&self) -> bool {
        self.volume() == 0
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        let max = self.max();
        (self.origin.x..max.x).contains(&pos.x)
            && (self.origin.y..max.y).contains(&pos.y)
            && (self.origin.z..max.z).contains(&pos.z)
    }

    /// Common part of both boxes, `None` if they do not overlap
    pub fn intersect(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let (a, b) = (self.max(), other.max());
        let min = BlockPos::new(
            self.origin.x.max(other.origin.x),
            self.origin.y.max(other.origin.y),
            self.origin.z.max(other.origin.z),
        );
        let max = BlockPos::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z));
        if max.x <= min.x || max.y <= min.y || max.z <= min.z {
            return None;
        }
        Some(Self::from_corners(min, max))
    }

    /// Smallest box containing both
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let (a, b) = (self.max(), other.max());
        Self::from_corners(
            (
                self.origin.x.min(other.origin.x),
                self.origin.y.min(other.origin.y),
                self.origin.z.min(other.origin.z),
            ),
            (a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        )
    }

    /// Grow by `d` blocks on every side
    pub fn expand(&self, d: i32) -> BoundingBox {
        Self::new(
            (self.origin.x - d, self.origin.y - d, self.origin.z - d),
            (self.size.x + 2 * d, self.size.y + 2 * d, self.size.z + 2 * d),
        )
    }

    /// Every chunk column the box touches, x-major
    pub fn chunk_positions(&self) -> Vec<ChunkPos> {
        if self.is_empty() {
            return Vec::new();
        }
        let (min, max) = (self.origin, self.max());
        let (x0, x1) = cell_range(min.x, max.x, CHUNK_SIDE);
        let (z0, z1) = cell_range(min.z, max.z, CHUNK_SIDE);

        let mut positions = Vec::with_capacity(((x1 - x0) * (z1 - z0)) as usize);
        for cx in x0..x1 {
            for cz in z0..z1 {
                positions.push(ChunkPos::new(cx, cz));
            }
        }
        positions
    }

    /// Section Y indexes the box touches inside chunk `pos`
    pub fn section_ys(&self, pos: ChunkPos) -> std::ops::Range<i32> {
        let chunk = BoundingBox::new(
            (pos.x * CHUNK_SIDE, self.origin.y, pos.z * CHUNK_SIDE),
            (CHUNK_SIDE, self.size.y, CHUNK_SIDE),
        );
        match self.intersect(&chunk) {
            Some(part) => {
                let (y0, y1) = cell_range(part.origin.y, part.max().y, SECTION_HEIGHT);
                y0..y1
            }
            None => 0..0,
        }
    }

    /// Every (chunk x, section y, chunk z) the box touches
    pub fn section_positions(&self) -> Vec<(i32, i32, i32)> {
        self.chunk_positions()
            .into_iter()
            .flat_map(|pos| self.section_ys(pos).map(move |cy| (pos.x, cy, pos.z)))
            .collect()
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let max = self.max();
        write!(
            f,
            "({}, {}, {})..({}, {}, {})",
            self.origin.x, self.origin.y, self.origin.z, max.x, max.y, max.z
        )
    }
}

/// Cells of width `side` overlapping the half-open span `[lo, hi)`
fn cell_range(lo: i32, hi: i32, side: i32) -> (i32, i32) {
    (lo.div_euclid(side), (hi - 1).div_euclid(side) + 1)
}
