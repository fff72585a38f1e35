//! Chunk sections
//!
//! One 16x16x16 slice of a chunk. Arrays are indexed YZX:
//! `index = y << 8 | z << 4 | x`.

use crate::error::{Result, StoreError};
use crate::nbt::{Compound, Tag};

use super::{key_order, restore_key_order};

/// Blocks per section side
pub const SECTION_SIDE: usize = 16;

/// Entries in every section array
pub const SECTION_VOLUME: usize = SECTION_SIDE * SECTION_SIDE * SECTION_SIDE;

/// Bytes in a nibble-packed section array
pub const NIBBLE_BYTES: usize = SECTION_VOLUME / 2;

/// Highest light level
pub const MAX_LIGHT: u8 = 15;

/// Block ids are stored as 8 bits plus an optional high nibble
pub const MAX_BLOCK_ID: u16 = 0x0fff;

/// A 16x16x16 section of a chunk
#[derive(Debug, Clone)]
pub struct Section {
    /// Vertical index (block y >> 4)
    pub y: i8,
    blocks: Box<[u16; SECTION_VOLUME]>,
    metadata: Box<[u8; SECTION_VOLUME]>,
    sky_light: Box<[u8; SECTION_VOLUME]>,
    block_light: Box<[u8; SECTION_VOLUME]>,
    /// Tags we do not interpret, written back unchanged
    extra: Compound,
    /// Key order of the decoded compound
    layout: Vec<String>,
}

impl PartialEq for Section {
    fn eq(&self, other: &Self) -> bool {
        self.y == other.y
            && self.blocks == other.blocks
            && self.metadata == other.metadata
            && self.sky_light == other.sky_light
            && self.block_light == other.block_light
            && self.extra == other.extra
    }
}

#[inline]
pub fn section_index(x: usize, y: usize, z: usize) -> usize {
    debug_assert!(x < SECTION_SIDE && y < SECTION_SIDE && z < SECTION_SIDE);
    (y << 8) | (z << 4) | x
}

impl Section {
    /// Empty section: air, no block light, full sky light
    pub fn new(y: i8) -> Self {
        Self {
            y,
            blocks: Box::new([0; SECTION_VOLUME]),
            metadata: Box::new([0; SECTION_VOLUME]),
            sky_light: Box::new([MAX_LIGHT; SECTION_VOLUME]),
            block_light: Box::new([0; SECTION_VOLUME]),
            extra: Compound::new(),
            layout: Vec::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Cell accessors
    // -------------------------------------------------------------------------

    pub fn block_id(&self, x: usize, y: usize, z: usize) -> u16 {
        self.blocks[section_index(x, y, z)]
    }

    /// Ids above 12 bits are masked
    pub fn set_block_id(&mut self, x: usize, y: usize, z: usize, id: u16) {
        self.blocks[section_index(x, y, z)] = id & MAX_BLOCK_ID;
    }

    pub fn metadata(&self, x: usize, y: usize, z: usize) -> u8 {
        self.metadata[section_index(x, y, z)]
    }

    pub fn set_metadata(&mut self, x: usize, y: usize, z: usize, value: u8) {
        self.metadata[section_index(x, y, z)] = value & 0x0f;
    }

    pub fn sky_light(&self, x: usize, y: usize, z: usize) -> u8 {
        self.sky_light[section_index(x, y, z)]
    }

    /// Clamped to [0, 15]
    pub fn set_sky_light(&mut self, x: usize, y: usize, z: usize, value: u8) {
        self.sky_light[section_index(x, y, z)] = value.min(MAX_LIGHT);
    }

    pub fn block_light(&self, x: usize, y: usize, z: usize) -> u8 {
        self.block_light[section_index(x, y, z)]
    }

    /// Clamped to [0, 15]
    pub fn set_block_light(&mut self, x: usize, y: usize, z: usize, value: u8) {
        self.block_light[section_index(x, y, z)] = value.min(MAX_LIGHT);
    }

    // -------------------------------------------------------------------------
    // Whole-array views
    // -------------------------------------------------------------------------

    pub fn blocks(&self) -> &[u16; SECTION_VOLUME] {
        &self.blocks
    }

    pub fn metadata_array(&self) -> &[u8; SECTION_VOLUME] {
        &self.metadata
    }

    pub fn sky_light_array(&self) -> &[u8; SECTION_VOLUME] {
        &self.sky_light
    }

    pub fn block_light_array(&self) -> &[u8; SECTION_VOLUME] {
        &self.block_light
    }

    /// Overwrite the sky light array; values are clamped
    pub fn fill_sky_light(&mut self, values: &[u8; SECTION_VOLUME]) {
        for (dst, src) in self.sky_light.iter_mut().zip(values.iter()) {
            *dst = (*src).min(MAX_LIGHT);
        }
    }

    /// Overwrite the block light array; values are clamped
    pub fn fill_block_light(&mut self, values: &[u8; SECTION_VOLUME]) {
        for (dst, src) in self.block_light.iter_mut().zip(values.iter()) {
            *dst = (*src).min(MAX_LIGHT);
        }
    }

    /// A section with nothing worth storing is skipped on save
    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|&b| b == 0)
            && self.block_light.iter().all(|&l| l == 0)
            && self.sky_light.iter().all(|&l| l == MAX_LIGHT)
    }

    // -------------------------------------------------------------------------
    // Tag conversion
    // -------------------------------------------------------------------------

    pub fn from_tag(mut tag: Compound) -> Result<Self> {
        let layout = key_order(&tag);
        let y = match tag.shift_remove("Y") {
            Some(Tag::Byte(y)) => y,
            _ => return Err(StoreError::ChunkFormat("section has no Byte \"Y\"".to_string())),
        };

        let low = take_array(&mut tag, "Blocks", SECTION_VOLUME)?;
        let mut blocks = Box::new([0u16; SECTION_VOLUME]);
        for (dst, src) in blocks.iter_mut().zip(low.iter()) {
            *dst = u16::from(*src);
        }
        if tag.contains_key("Add") {
            let add = unpack_nibbles(&take_array(&mut tag, "Add", NIBBLE_BYTES)?);
            for (dst, high) in blocks.iter_mut().zip(add.iter()) {
                *dst |= u16::from(*high) << 8;
            }
        }

        let metadata = unpack_nibbles(&take_array(&mut tag, "Data", NIBBLE_BYTES)?);
        let sky_light = unpack_nibbles(&take_array(&mut tag, "SkyLight", NIBBLE_BYTES)?);
        let block_light = unpack_nibbles(&take_array(&mut tag, "BlockLight", NIBBLE_BYTES)?);

        Ok(Self {
            y,
            blocks,
            metadata,
            sky_light,
            block_light,
            extra: tag,
            layout,
        })
    }

    pub fn to_tag(&self) -> Compound {
        let mut tag = self.extra.clone();

        let low: Vec<u8> = self.blocks.iter().map(|&b| (b & 0xff) as u8).collect();
        tag.insert("Blocks".to_string(), Tag::ByteArray(low));

        let mut high = [0u8; SECTION_VOLUME];
        let mut any_high = false;
        for (dst, &b) in high.iter_mut().zip(self.blocks.iter()) {
            *dst = (b >> 8) as u8;
            any_high |= *dst != 0;
        }
        if any_high {
            tag.insert("Add".to_string(), Tag::ByteArray(pack_nibbles(&high)));
        }

        tag.insert("Data".to_string(), Tag::ByteArray(pack_nibbles(&self.metadata)));
        tag.insert("SkyLight".to_string(), Tag::ByteArray(pack_nibbles(&self.sky_light)));
        tag.insert("BlockLight".to_string(), Tag::ByteArray(pack_nibbles(&self.block_light)));
        tag.insert("Y".to_string(), Tag::Byte(self.y));
        restore_key_order(&mut tag, &self.layout);
        tag
    }
}

fn take_array(tag: &mut Compound, name: &str, len: usize) -> Result<Vec<u8>> {
    match tag.shift_remove(name) {
        Some(Tag::ByteArray(bytes)) if bytes.len() == len => Ok(bytes),
        Some(Tag::ByteArray(bytes)) => Err(StoreError::ChunkFormat(format!(
            "section array {:?} has {} bytes, expected {}",
            name,
            bytes.len(),
            len
        ))),
        Some(other) => Err(StoreError::ChunkFormat(format!(
            "section array {:?} is {}, expected ByteArray",
            name,
            other.tag_type().name()
        ))),
        None => Err(StoreError::ChunkFormat(format!(
            "section is missing {:?}",
            name
        ))),
    }
}

/// Two values per byte, even index in the low nibble
pub fn pack_nibbles(values: &[u8; SECTION_VOLUME]) -> Vec<u8> {
    values
        .chunks_exact(2)
        .map(|pair| (pair[0] & 0x0f) | (pair[1] << 4))
        .collect()
}

pub fn unpack_nibbles(packed: &[u8]) -> Box<[u8; SECTION_VOLUME]> {
    debug_assert_eq!(packed.len(), NIBBLE_BYTES);
    let mut values = Box::new([0u8; SECTION_VOLUME]);
    for (i, &byte) in packed.iter().enumerate() {
        values[i * 2] = byte & 0x0f;
        values[i * 2 + 1] = byte >> 4;
    }
    values
}
