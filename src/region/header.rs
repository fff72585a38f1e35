//! Region header
//!
//! The location and timestamp tables occupying the first two sectors.

use super::{HEADER_BYTES, SECTOR_BYTES, SLOT_COUNT};

/// Where a slot's extent lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    /// First sector of the extent
    pub sector: u32,
    /// Sectors in the extent
    pub count: u32,
}

impl Location {
    pub fn from_raw(raw: u32) -> Self {
        Self {
            sector: raw >> 8,
            count: raw & 0xff,
        }
    }

    pub fn to_raw(self) -> u32 {
        (self.sector << 8) | (self.count & 0xff)
    }

    /// Unallocated slot
    pub fn is_empty(&self) -> bool {
        self.sector == 0 && self.count == 0
    }

    /// One past the last sector
    pub fn end(&self) -> u32 {
        self.sector + self.count
    }
}

/// In-memory copy of both header tables
#[derive(Debug, Clone)]
pub struct RegionHeader {
    locations: Vec<Location>,
    timestamps: Vec<u32>,
}

impl RegionHeader {
    pub fn empty() -> Self {
        Self {
            locations: vec![Location::default(); SLOT_COUNT],
            timestamps: vec![0; SLOT_COUNT],
        }
    }

    /// Parse the 8 KiB header. Missing trailing bytes read as zero.
    pub fn parse(bytes: &[u8]) -> Self {
        let mut padded = [0u8; HEADER_BYTES];
        let n = bytes.len().min(HEADER_BYTES);
        padded[..n].copy_from_slice(&bytes[..n]);

        let word = |offset: usize| {
            u32::from_be_bytes([
                padded[offset],
                padded[offset + 1],
                padded[offset + 2],
                padded[offset + 3],
            ])
        };

        let locations = (0..SLOT_COUNT).map(|i| Location::from_raw(word(i * 4))).collect();
        let timestamps = (0..SLOT_COUNT).map(|i| word(SECTOR_BYTES + i * 4)).collect();

        Self {
            locations,
            timestamps,
        }
    }

    pub fn location(&self, index: usize) -> Location {
        self.locations[index]
    }

    pub fn set_location(&mut self, index: usize, location: Location) {
        self.locations[index] = location;
    }

    pub fn timestamp(&self, index: usize) -> u32 {
        self.timestamps[index]
    }

    pub fn set_timestamp(&mut self, index: usize, timestamp: u32) {
        self.timestamps[index] = timestamp;
    }

    pub fn locations(&self) -> impl Iterator<Item = (usize, Location)> + '_ {
        self.locations.iter().copied().enumerate()
    }

    /// File offset of a slot's location entry
    pub fn location_offset(index: usize) -> u64 {
        (index * 4) as u64
    }

    /// File offset of a slot's timestamp entry
    pub fn timestamp_offset(index: usize) -> u64 {
        (SECTOR_BYTES + index * 4) as u64
    }
}
