//! Chunk Module
//!
//! Decoded chunk records and their coordinates.
//!
//! ## Record Layout
//! ```text
//! "" (Compound)
//! └── Level (Compound)
//!     ├── xPos, zPos      Int
//!     ├── LastUpdate      Long
//!     ├── Sections        List<Compound>
//!     │   └── Y (Byte), Blocks[4096], Add[2048]?, Data[2048],
//!     │       SkyLight[2048], BlockLight[2048]
//!     └── ...             kept as-is
//! ```

mod section;

use std::collections::BTreeMap;
use std::fmt;

pub use section::{
    pack_nibbles, section_index, unpack_nibbles, Section, MAX_BLOCK_ID, MAX_LIGHT, NIBBLE_BYTES,
    SECTION_SIDE, SECTION_VOLUME,
};

use crate::error::{Result, StoreError};
use crate::nbt::{Compound, List, Tag, TagType};

/// Blocks per chunk side
pub const CHUNK_SIDE: i32 = 16;

/// World chunk coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chunk containing the block column (bx, bz)
    pub fn from_block(bx: i32, bz: i32) -> Self {
        Self {
            x: bx.div_euclid(CHUNK_SIDE),
            z: bz.div_euclid(CHUNK_SIDE),
        }
    }
}

impl fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

impl From<(i32, i32)> for ChunkPos {
    fn from((x, z): (i32, i32)) -> Self {
        Self { x, z }
    }
}

/// One chunk: its sections plus every other tag of the record
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pos: ChunkPos,
    sections: BTreeMap<i8, Section>,
    /// `Level` without `Sections`
    level: Compound,
    /// Root compound without `Level`
    root: Compound,
    /// Key order of the decoded `Level` and root, restored on encode
    level_order: Vec<String>,
    root_order: Vec<String>,
}

/// Key order is not part of a record's content
impl PartialEq for ChunkRecord {
    fn eq(&self, other: &Self) -> bool {
        self.pos == other.pos
            && self.sections == other.sections
            && self.level == other.level
            && self.root == other.root
    }
}

impl ChunkRecord {
    /// A fresh chunk with no sections
    pub fn new(pos: ChunkPos) -> Self {
        let mut level = Compound::new();
        level.insert("xPos".to_string(), Tag::Int(pos.x));
        level.insert("zPos".to_string(), Tag::Int(pos.z));
        level.insert("LastUpdate".to_string(), Tag::Long(0));
        level.insert("TerrainPopulated".to_string(), Tag::Byte(1));
        level.insert("Entities".to_string(), Tag::List(List::of(TagType::Compound)));
        level.insert("TileEntities".to_string(), Tag::List(List::of(TagType::Compound)));

        Self {
            pos,
            sections: BTreeMap::new(),
            level,
            root: Compound::new(),
            level_order: Vec::new(),
            root_order: Vec::new(),
        }
    }

    /// Decode a record; its position comes from `Level.xPos`/`zPos`
    pub fn from_tag(tag: Tag) -> Result<Self> {
        let mut root = tag
            .into_compound()
            .ok_or_else(|| StoreError::ChunkFormat("chunk root is not a Compound".to_string()))?;
        let root_order = key_order(&root);

        let mut level = match root.shift_remove("Level") {
            Some(Tag::Compound(level)) => level,
            _ => return Err(StoreError::ChunkFormat("chunk has no Level compound".to_string())),
        };
        let level_order = key_order(&level);

        let coord = |level: &Compound, name: &str| -> Result<i32> {
            match level.get(name) {
                Some(Tag::Int(v)) => Ok(*v),
                _ => Err(StoreError::ChunkFormat(format!("chunk has no Int {:?}", name))),
            }
        };
        let pos = ChunkPos::new(coord(&level, "xPos")?, coord(&level, "zPos")?);

        let mut sections = BTreeMap::new();
        match level.shift_remove("Sections") {
            None => {}
            Some(Tag::List(list)) => {
                for item in list {
                    let tag = item.into_compound().ok_or_else(|| {
                        StoreError::ChunkFormat("section is not a Compound".to_string())
                    })?;
                    let section = Section::from_tag(tag)?;
                    sections.insert(section.y, section);
                }
            }
            Some(other) => {
                return Err(StoreError::ChunkFormat(format!(
                    "Sections is {}, expected List",
                    other.tag_type().name()
                )));
            }
        }

        Ok(Self {
            pos,
            sections,
            level,
            root,
            level_order,
            root_order,
        })
    }

    /// Encode the record; empty sections are left out. A decoded record
    /// keeps the key order it was read with.
    pub fn to_tag(&self) -> Tag {
        let sections = self
            .sections
            .values()
            .filter(|s| !s.is_empty())
            .map(|s| Tag::Compound(s.to_tag()))
            .collect();

        let mut level = self.level.clone();
        level.insert(
            "Sections".to_string(),
            Tag::List(List::from_raw(TagType::Compound, sections)),
        );
        restore_key_order(&mut level, &self.level_order);

        let mut root = self.root.clone();
        root.insert("Level".to_string(), Tag::Compound(level));
        restore_key_order(&mut root, &self.root_order);
        Tag::Compound(root)
    }

    pub fn pos(&self) -> ChunkPos {
        self.pos
    }

    // -------------------------------------------------------------------------
    // Sections
    // -------------------------------------------------------------------------

    pub fn section(&self, y: i8) -> Option<&Section> {
        self.sections.get(&y)
    }

    pub fn section_mut(&mut self, y: i8) -> Option<&mut Section> {
        self.sections.get_mut(&y)
    }

    /// Get a section, creating an empty one if needed
    pub fn section_or_create(&mut self, y: i8) -> &mut Section {
        self.sections.entry(y).or_insert_with(|| Section::new(y))
    }

    pub fn remove_section(&mut self, y: i8) -> Option<Section> {
        self.sections.remove(&y)
    }

    /// Section indexes present, ascending
    pub fn section_positions(&self) -> impl Iterator<Item = i8> + '_ {
        self.sections.keys().copied()
    }

    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.values()
    }

    pub fn sections_mut(&mut self) -> impl Iterator<Item = &mut Section> {
        self.sections.values_mut()
    }

    // -------------------------------------------------------------------------
    // Other record data
    // -------------------------------------------------------------------------

    /// The `Level` compound, without `Sections`
    pub fn level(&self) -> &Compound {
        &self.level
    }

    pub fn level_mut(&mut self) -> &mut Compound {
        &mut self.level
    }
}

pub(crate) fn key_order(compound: &Compound) -> Vec<String> {
    compound.keys().cloned().collect()
}

/// Stable sort: keys named in `order` take their recorded position, keys
/// added since keep their relative order after them
pub(crate) fn restore_key_order(compound: &mut Compound, order: &[String]) {
    if order.is_empty() {
        return;
    }
    let rank = |key: &String| order.iter().position(|k| k == key).unwrap_or(order.len());
    compound.sort_by(|a, _, b, _| rank(a).cmp(&rank(b)));
}
