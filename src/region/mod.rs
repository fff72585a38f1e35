//! Region Module
//!
//! Sector-allocated container files, each holding up to 32x32 chunk records.
//!
//! ## Responsibilities
//! - Index 1024 chunk slots per file
//! - Allocate sector extents (reuse in place, best-fit, else append)
//! - Compress/decompress each record independently
//! - Detect damaged index entries on open
//!
//! ## File Format
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │ Location table (4096 bytes)                            │
//! │   1024 × u32: sector offset (24 bits) | count (8 bits) │
//! ├────────────────────────────────────────────────────────┤
//! │ Timestamp table (4096 bytes)                           │
//! │   1024 × u32: seconds since epoch of last write        │
//! ├────────────────────────────────────────────────────────┤
//! │ Sector heap (4096-byte sectors)                        │
//! │   Extent: [Length: u32][Compression: u8][Payload]      │
//! │   (Length counts the compression byte + payload)       │
//! └────────────────────────────────────────────────────────┘
//! ```
//! Slot index = `x + z * 32` with local coordinates (`x & 31`, `z & 31`).

mod allocator;
mod file;
mod folder;
mod header;

pub use allocator::SectorMap;
pub use file::{Extent, RegionFile, RegionOptions};
pub use folder::{is_valid_dimension, WorldFolder, OVERWORLD, REGION_DIR};
pub use header::{Location, RegionHeader};

use std::fmt;

use crate::chunk::ChunkPos;

// =============================================================================
// Shared Constants
// =============================================================================

/// Allocation granularity
pub const SECTOR_BYTES: usize = 4096;

/// Location table + timestamp table
pub const HEADER_SECTORS: u32 = 2;

/// Header size in bytes
pub const HEADER_BYTES: usize = SECTOR_BYTES * HEADER_SECTORS as usize;

/// Length (4) + compression type (1) in front of every payload
pub const CHUNK_HEADER_SIZE: usize = 5;

/// Chunks per region side
pub const REGION_SIZE: i32 = 32;

/// Slots per region file
pub const SLOT_COUNT: usize = (REGION_SIZE * REGION_SIZE) as usize;

/// The location entry's count field is 8 bits
pub const MAX_CHUNK_SECTORS: u32 = 255;

/// The location entry's offset field is 24 bits
pub const MAX_SECTOR_OFFSET: u32 = 0x00ff_ffff;

// =============================================================================
// Coordinates
// =============================================================================

/// Slot index of a chunk inside its region
#[inline]
pub fn slot_index(x: i32, z: i32) -> usize {
    ((x & 31) + (z & 31) * REGION_SIZE) as usize
}

/// Local coordinates of a slot index
#[inline]
pub fn slot_coords(index: usize) -> (i32, i32) {
    ((index % 32) as i32, (index / 32) as i32)
}

/// Region file coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionPos {
    pub x: i32,
    pub z: i32,
}

impl RegionPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Region holding a chunk
    pub fn of_chunk(pos: ChunkPos) -> Self {
        Self {
            x: pos.x.div_euclid(REGION_SIZE),
            z: pos.z.div_euclid(REGION_SIZE),
        }
    }

    /// World chunk coordinate of a local slot coordinate
    pub fn chunk_at(&self, local_x: i32, local_z: i32) -> ChunkPos {
        ChunkPos::new(self.x * REGION_SIZE + local_x, self.z * REGION_SIZE + local_z)
    }

    /// "r.<x>.<z>.mca"
    pub fn file_name(&self) -> String {
        format!("r.{}.{}.mca", self.x, self.z)
    }

    /// Parse "r.0.-1.mca"
    pub fn from_file_name(name: &str) -> Option<Self> {
        let parts: Vec<&str> = name.split('.').collect();
        match parts.as_slice() {
            ["r", x, z, "mca"] => Some(Self {
                x: x.parse().ok()?,
                z: z.parse().ok()?,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for RegionPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r.{}.{}", self.x, self.z)
    }
}
