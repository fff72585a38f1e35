//! World Folder
//!
//! Maps world chunk coordinates onto region files. Each dimension of a world
//! has its own region directory:
//! ```text
//!   {world}/region/           overworld ("")
//!   {world}/DIM-1/region/     any other dimension, by folder name
//! ```
//!
//! ## Responsibilities
//! - Open region files lazily and keep them open
//! - Discover region files and dimensions from the directory listing
//! - Encode/decode chunk records through the tag codec

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::cache::ChunkSource;
use crate::chunk::{ChunkPos, ChunkRecord};
use crate::error::{Result, StoreError};
use crate::nbt::{self, Compression};

use super::{RegionFile, RegionOptions, RegionPos};

/// Subdirectory holding the region files
pub const REGION_DIR: &str = "region";

/// Dimension whose region directory sits directly under the world root
pub const OVERWORLD: &str = "";

/// A dimension name must be empty or a single plain directory name
pub fn is_valid_dimension(name: &str) -> bool {
    name.is_empty() || (!name.contains(|c: char| c == '/' || c == '\\') && name != "." && name != "..")
}

/// All region files of one dimension of a world
pub struct WorldFolder {
    root: PathBuf,
    dimension: String,
    region_dir: PathBuf,
    regions: HashMap<RegionPos, RegionFile>,
    options: RegionOptions,
}

impl WorldFolder {
    /// Open the overworld of a world directory
    pub fn open(root: &Path, options: RegionOptions) -> Result<Self> {
        Self::open_dimension(root, OVERWORLD, options)
    }

    /// Open one dimension, creating its region directory unless read-only
    pub fn open_dimension(root: &Path, dimension: &str, options: RegionOptions) -> Result<Self> {
        if !is_valid_dimension(dimension) {
            return Err(StoreError::Config(format!(
                "invalid dimension name {:?}",
                dimension
            )));
        }

        let region_dir = if dimension.is_empty() {
            root.join(REGION_DIR)
        } else {
            root.join(dimension).join(REGION_DIR)
        };
        if !options.read_only {
            fs::create_dir_all(&region_dir)?;
        }

        Ok(Self {
            root: root.to_path_buf(),
            dimension: dimension.to_string(),
            region_dir,
            regions: HashMap::new(),
            options,
        })
    }

    /// Dimensions present under `root`: the overworld first, then every
    /// subdirectory holding a `region/` directory, sorted by name
    pub fn list_dimensions(root: &Path) -> Result<Vec<String>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name == REGION_DIR || name.starts_with("##") {
                continue;
            }
            if entry.path().join(REGION_DIR).is_dir() {
                tracing::debug!(dimension = %name, "found dimension");
                found.push(name);
            }
        }
        found.sort();
        found.insert(0, OVERWORLD.to_string());
        Ok(found)
    }

    /// Decompressed record bytes of a chunk
    pub fn read_chunk(&mut self, pos: ChunkPos) -> Result<Vec<u8>> {
        match self.region(pos, false)? {
            Some(region) => region.read_chunk(pos.x, pos.z),
            None => Err(StoreError::ChunkNotPresent { x: pos.x, z: pos.z }),
        }
    }

    /// Store record bytes, creating the region file if needed
    pub fn write_chunk(&mut self, pos: ChunkPos, data: &[u8]) -> Result<()> {
        let compression = self.options.compression;
        let payload = compression.compress(data)?;
        self.write_chunk_compressed(pos, &payload, compression)
    }

    /// Store an already compressed payload, creating the region file if needed
    pub fn write_chunk_compressed(
        &mut self,
        pos: ChunkPos,
        payload: &[u8],
        compression: Compression,
    ) -> Result<()> {
        if self.options.read_only {
            return Err(StoreError::ReadOnly(self.region_dir.clone()));
        }
        match self.region(pos, true)? {
            Some(region) => region.write_chunk_compressed(pos.x, pos.z, payload, compression),
            None => Err(StoreError::RegionFormat(format!(
                "region for chunk {} could not be opened",
                pos
            ))),
        }
    }

    /// Copy a chunk's stored payload from another folder without recompressing
    pub fn copy_chunk_from(&mut self, source: &mut WorldFolder, pos: ChunkPos) -> Result<()> {
        let (payload, compression) = match source.region(pos, false)? {
            Some(region) => region.read_chunk_compressed(pos.x, pos.z)?,
            None => return Err(StoreError::ChunkNotPresent { x: pos.x, z: pos.z }),
        };
        self.write_chunk_compressed(pos, &payload, compression)
    }

    pub fn delete_chunk(&mut self, pos: ChunkPos) -> Result<()> {
        match self.region(pos, false)? {
            Some(region) => region.delete_chunk(pos.x, pos.z),
            None => Ok(()),
        }
    }

    pub fn contains_chunk(&mut self, pos: ChunkPos) -> Result<bool> {
        Ok(self
            .region(pos, false)?
            .is_some_and(|region| region.contains_chunk(pos.x, pos.z)))
    }

    /// Every present chunk in world coordinates, sorted
    pub fn chunk_positions(&mut self) -> Result<Vec<ChunkPos>> {
        let mut positions = Vec::new();
        for rpos in self.region_positions()? {
            if let Some(region) = self.open_region(rpos, false)? {
                positions.extend(
                    region
                        .chunk_positions()
                        .into_iter()
                        .map(|(lx, lz)| rpos.chunk_at(lx, lz)),
                );
            }
        }
        positions.sort();
        Ok(positions)
    }

    pub fn chunk_count(&mut self) -> Result<usize> {
        let mut count = 0;
        for rpos in self.region_positions()? {
            if let Some(region) = self.open_region(rpos, false)? {
                count += region.chunk_count();
            }
        }
        Ok(count)
    }

    /// Run `RegionFile::repair` over every region file.
    /// Returns the total number of slots cleared.
    pub fn repair_all(&mut self) -> Result<usize> {
        let mut cleared = 0;
        for rpos in self.region_positions()? {
            if let Some(region) = self.open_region(rpos, false)? {
                cleared += region.repair()?;
            }
        }
        Ok(cleared)
    }

    /// Region coordinates of every region file on disk. A region directory
    /// that does not exist yet holds no regions.
    pub fn region_positions(&self) -> Result<Vec<RegionPos>> {
        let entries = match fs::read_dir(&self.region_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut found = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let parsed = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(RegionPos::from_file_name);
            match parsed {
                Some(rpos) => found.push(rpos),
                None => tracing::debug!(path = %path.display(), "skipping unexpected file in region directory"),
            }
        }
        found.sort();
        Ok(found)
    }

    /// Open region file for a region, if already open or present on disk
    pub fn region_file(&mut self, rpos: RegionPos) -> Result<Option<&mut RegionFile>> {
        self.open_region(rpos, false)
    }

    /// Number of region files currently held open
    pub fn open_regions(&self) -> usize {
        self.regions.len()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `""` for the overworld
    pub fn dimension(&self) -> &str {
        &self.dimension
    }

    pub fn region_dir(&self) -> &Path {
        &self.region_dir
    }

    pub fn options(&self) -> &RegionOptions {
        &self.options
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn region(&mut self, pos: ChunkPos, create: bool) -> Result<Option<&mut RegionFile>> {
        self.open_region(RegionPos::of_chunk(pos), create)
    }

    /// A missing file is only created when `create` is set and the folder
    /// is writable
    fn open_region(&mut self, rpos: RegionPos, create: bool) -> Result<Option<&mut RegionFile>> {
        if !self.regions.contains_key(&rpos) {
            let path = self.region_dir.join(rpos.file_name());
            let create = create && !self.options.read_only;
            if !create && !path.exists() {
                return Ok(None);
            }
            let region = RegionFile::open_with(&path, self.options.clone())?;
            self.regions.insert(rpos, region);
        }
        Ok(self.regions.get_mut(&rpos))
    }
}

impl ChunkSource for WorldFolder {
    fn load(&mut self, pos: ChunkPos) -> Result<ChunkRecord> {
        let bytes = self.read_chunk(pos)?;
        let (_, tag) = nbt::decode_uncompressed(&bytes).map_err(|e| {
            StoreError::ChunkFormat(format!("chunk {} does not decode: {}", pos, e))
        })?;
        let record = ChunkRecord::from_tag(tag)?;
        if record.pos() != pos {
            return Err(StoreError::ChunkFormat(format!(
                "chunk stored at {} claims to be {}",
                pos,
                record.pos()
            )));
        }
        Ok(record)
    }

    fn store(&mut self, pos: ChunkPos, chunk: &ChunkRecord) -> Result<()> {
        let bytes = nbt::encode("", &chunk.to_tag())?;
        self.write_chunk(pos, &bytes)
    }

    fn delete(&mut self, pos: ChunkPos) -> Result<()> {
        self.delete_chunk(pos)
    }

    fn contains(&mut self, pos: ChunkPos) -> Result<bool> {
        self.contains_chunk(pos)
    }
}
