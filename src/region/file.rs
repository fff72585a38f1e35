//! Region File
//!
//! Reads and writes chunk records in one container file.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{Config, LockMode, DEFAULT_MAX_CHUNK_SIZE};
use crate::error::{Result, StoreError};
use crate::nbt::{self, Compression};

use super::{
    slot_coords, slot_index, Location, RegionHeader, SectorMap, CHUNK_HEADER_SIZE, HEADER_BYTES,
    HEADER_SECTORS, MAX_CHUNK_SECTORS, MAX_SECTOR_OFFSET, SECTOR_BYTES,
};

/// Per-file write settings
#[derive(Debug, Clone)]
pub struct RegionOptions {
    /// Compression used by `write_chunk`
    pub compression: Compression,
    /// Ceiling on extent header + compressed payload
    pub max_chunk_size: usize,
    /// fsync payloads before repointing the index
    pub sync_writes: bool,
    /// Open without write access; never create, pad or modify files
    pub read_only: bool,
}

impl Default for RegionOptions {
    fn default() -> Self {
        Self {
            compression: Compression::Zlib,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            sync_writes: true,
            read_only: false,
        }
    }
}

impl From<&Config> for RegionOptions {
    fn from(config: &Config) -> Self {
        Self {
            compression: config.compression,
            max_chunk_size: config.max_chunk_size,
            sync_writes: config.sync_writes,
            read_only: config.lock_mode == LockMode::ReadOnly,
        }
    }
}

/// Sector range a live slot occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub sector: u32,
    pub count: u32,
}

impl Extent {
    pub fn end(&self) -> u32 {
        self.sector + self.count
    }

    pub fn overlaps(&self, other: &Extent) -> bool {
        self.sector < other.end() && other.sector < self.end()
    }
}

/// One open region container
///
/// ## Write ordering
/// A relocated record is written and synced into its new extent before the
/// location entry is repointed, and the old extent is released only after
/// that. A reader never sees a slot pointing at a partial extent.
pub struct RegionFile {
    path: PathBuf,
    file: File,
    header: RegionHeader,
    sectors: SectorMap,
    /// Slots whose location is out of bounds or overlaps another slot
    damaged: HashSet<usize>,
    options: RegionOptions,
}

impl RegionFile {
    /// Open or create a region file with default options
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, RegionOptions::default())
    }

    /// Open or create a region file
    ///
    /// On open:
    /// 1. Create a two-sector file if missing or empty
    /// 2. Pad the file to a whole number of sectors
    /// 3. Load the header and mark every live extent as used
    /// 4. Flag slots that point outside the heap or overlap another slot
    ///
    /// With `read_only` set, steps 1 and 2 are skipped: a missing file is an
    /// error, and a trailing partial sector is simply not part of the heap.
    pub fn open_with(path: &Path, options: RegionOptions) -> Result<Self> {
        let mut file = if options.read_only {
            OpenOptions::new().read(true).open(path)?
        } else {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)?
        };

        let mut len = file.metadata()?.len();
        let is_new = len == 0 && !options.read_only;

        let aligned = len.div_ceil(SECTOR_BYTES as u64) * SECTOR_BYTES as u64;
        let aligned = aligned.max(HEADER_BYTES as u64);
        if aligned != len && !options.read_only {
            if !is_new {
                tracing::warn!(path = %path.display(), len, aligned, "padding region file to sector boundary");
            }
            file.set_len(aligned)?;
            len = aligned;
        }

        // a short read-only file leaves the rest of the header zeroed
        let mut raw = Vec::with_capacity(HEADER_BYTES);
        file.seek(SeekFrom::Start(0))?;
        (&mut file).take(HEADER_BYTES as u64).read_to_end(&mut raw)?;
        raw.resize(HEADER_BYTES, 0);
        let header = RegionHeader::parse(&raw);

        let sector_count = (len / SECTOR_BYTES as u64) as u32;
        let mut sectors = SectorMap::new(sector_count);
        let mut damaged = HashSet::new();

        for (index, loc) in header.locations() {
            if loc.is_empty() {
                continue;
            }
            let (x, z) = slot_coords(index);
            if loc.count == 0 || loc.sector < HEADER_SECTORS || loc.end() > sector_count {
                tracing::warn!(
                    path = %path.display(), x, z, sector = loc.sector, count = loc.count,
                    sectors = sector_count, "region slot points outside the sector heap"
                );
                damaged.insert(index);
            } else if !sectors.is_free(loc.sector, loc.count) {
                tracing::warn!(
                    path = %path.display(), x, z, sector = loc.sector, count = loc.count,
                    "region slot overlaps another slot"
                );
                damaged.insert(index);
            } else {
                sectors.reserve(loc.sector, loc.count);
            }
        }

        let region = Self {
            path: path.to_path_buf(),
            file,
            header,
            sectors,
            damaged,
            options,
        };

        if is_new {
            tracing::debug!(path = %path.display(), "created region file");
        } else {
            tracing::debug!(
                path = %path.display(),
                chunks = region.chunk_count(),
                used = region.used_sectors(),
                sectors = region.sector_count(),
                "opened region file"
            );
        }

        Ok(region)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read and decompress a chunk's record bytes
    pub fn read_chunk(&mut self, x: i32, z: i32) -> Result<Vec<u8>> {
        let (payload, compression) = self.read_chunk_compressed(x, z)?;
        compression.decompress(&payload).map_err(|e| {
            StoreError::ChunkFormat(format!(
                "chunk ({}, {}) {} payload is corrupt: {}",
                x, z, compression, e
            ))
        })
    }

    /// Read a chunk's payload as stored, with its compression type
    pub fn read_chunk_compressed(&mut self, x: i32, z: i32) -> Result<(Vec<u8>, Compression)> {
        let index = slot_index(x, z);
        let loc = self.header.location(index);
        if loc.is_empty() {
            return Err(StoreError::ChunkNotPresent { x, z });
        }
        if self.damaged.contains(&index) {
            return Err(StoreError::RegionFormat(format!(
                "{}: slot ({}, {}) has invalid extent {}+{}",
                self.path.display(),
                x,
                z,
                loc.sector,
                loc.count
            )));
        }

        let mut extent = vec![0u8; loc.count as usize * SECTOR_BYTES];
        self.file
            .seek(SeekFrom::Start(loc.sector as u64 * SECTOR_BYTES as u64))?;
        self.file.read_exact(&mut extent)?;

        let length = u32::from_be_bytes([extent[0], extent[1], extent[2], extent[3]]) as usize;
        if length == 0 || length + 4 > extent.len() {
            return Err(StoreError::ChunkFormat(format!(
                "chunk ({}, {}) declares {} bytes in a {} byte extent",
                x,
                z,
                length,
                extent.len()
            )));
        }

        let compression = Compression::from_id(extent[4]).ok_or_else(|| {
            StoreError::ChunkFormat(format!(
                "chunk ({}, {}) has unknown compression type {}",
                x, z, extent[4]
            ))
        })?;

        tracing::trace!(x, z, sector = loc.sector, length, "read chunk");
        extent.truncate(length + 4);
        extent.drain(..CHUNK_HEADER_SIZE);
        Ok((extent, compression))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Compress with the configured compression and store
    pub fn write_chunk(&mut self, x: i32, z: i32, data: &[u8]) -> Result<()> {
        self.write_chunk_with(x, z, data, self.options.compression)
    }

    /// Compress with `compression` and store
    pub fn write_chunk_with(
        &mut self,
        x: i32,
        z: i32,
        data: &[u8],
        compression: Compression,
    ) -> Result<()> {
        let payload = compression.compress(data)?;
        self.write_chunk_compressed(x, z, &payload, compression)
    }

    /// Store an already compressed payload
    ///
    /// Fails with `ChunkSize` before touching the file if the extent would
    /// exceed the size ceiling.
    pub fn write_chunk_compressed(
        &mut self,
        x: i32,
        z: i32,
        payload: &[u8],
        compression: Compression,
    ) -> Result<()> {
        self.ensure_writable()?;
        let size = payload.len() + CHUNK_HEADER_SIZE;
        let sector_limit = MAX_CHUNK_SECTORS as usize * SECTOR_BYTES;
        let limit = self.options.max_chunk_size.min(sector_limit);
        if size > limit {
            return Err(StoreError::ChunkSize { x, z, size, limit });
        }
        let needed = size.div_ceil(SECTOR_BYTES) as u32;

        let index = slot_index(x, z);
        let old = self.header.location(index);
        let old_valid = !old.is_empty() && !self.damaged.contains(&index);

        if old_valid && old.count >= needed {
            tracing::debug!(x, z, sector = old.sector, size, "rewriting chunk in place");
            self.write_extent(old.sector, needed, payload, compression)?;
        } else {
            let (sector, grow) = match self.sectors.best_fit(needed) {
                Some(sector) => (sector, false),
                None => (self.sectors.len(), true),
            };
            if sector + needed > MAX_SECTOR_OFFSET {
                return Err(StoreError::RegionFormat(format!(
                    "{}: sector heap is full",
                    self.path.display()
                )));
            }

            tracing::debug!(x, z, sector, sectors = needed, grow, "allocating chunk extent");
            self.write_extent(sector, needed, payload, compression)?;
            self.sectors.reserve(sector, needed);

            self.set_location(index, Location { sector, count: needed })?;
            if old_valid {
                self.sectors.release(old.sector, old.count);
            }
            self.damaged.remove(&index);
        }

        self.set_timestamp(index, unix_seconds())?;
        Ok(())
    }

    /// Clear a slot and free its sectors. The file never shrinks.
    pub fn delete_chunk(&mut self, x: i32, z: i32) -> Result<()> {
        self.ensure_writable()?;
        let index = slot_index(x, z);
        let loc = self.header.location(index);
        if loc.is_empty() {
            return Ok(());
        }

        self.set_location(index, Location::default())?;
        self.set_timestamp(index, 0)?;
        if !self.damaged.remove(&index) {
            self.sectors.release(loc.sector, loc.count);
        }

        tracing::debug!(x, z, sector = loc.sector, count = loc.count, "deleted chunk");
        Ok(())
    }

    /// Clear every damaged slot and every slot whose record does not decode.
    /// Returns the number of slots cleared.
    pub fn repair(&mut self) -> Result<usize> {
        self.ensure_writable()?;
        let present: Vec<usize> = self
            .header
            .locations()
            .filter(|(_, loc)| !loc.is_empty())
            .map(|(index, _)| index)
            .collect();

        let mut cleared = 0;
        for index in present {
            let (x, z) = slot_coords(index);
            let outcome = self.read_chunk(x, z).and_then(|bytes| nbt::decode(&bytes));
            match outcome {
                Ok(_) => {}
                Err(e) if e.is_format_error() => {
                    tracing::info!(path = %self.path.display(), x, z, error = %e, "clearing unreadable chunk");
                    self.delete_chunk(x, z)?;
                    cleared += 1;
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(path = %self.path.display(), cleared, "region repair complete");
        Ok(cleared)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn contains_chunk(&self, x: i32, z: i32) -> bool {
        !self.header.location(slot_index(x, z)).is_empty()
    }

    /// Local coordinates of every present chunk
    pub fn chunk_positions(&self) -> Vec<(i32, i32)> {
        self.header
            .locations()
            .filter(|(_, loc)| !loc.is_empty())
            .map(|(index, _)| slot_coords(index))
            .collect()
    }

    pub fn chunk_count(&self) -> usize {
        self.header.locations().filter(|(_, loc)| !loc.is_empty()).count()
    }

    /// Sector range of a present, undamaged slot
    pub fn extent(&self, x: i32, z: i32) -> Option<Extent> {
        let index = slot_index(x, z);
        let loc = self.header.location(index);
        if loc.is_empty() || self.damaged.contains(&index) {
            return None;
        }
        Some(Extent {
            sector: loc.sector,
            count: loc.count,
        })
    }

    /// Seconds since the epoch of the slot's last write (0 if never)
    pub fn timestamp(&self, x: i32, z: i32) -> u32 {
        self.header.timestamp(slot_index(x, z))
    }

    pub fn is_damaged(&self, x: i32, z: i32) -> bool {
        self.damaged.contains(&slot_index(x, z))
    }

    pub fn used_sectors(&self) -> u32 {
        self.sectors.used_count()
    }

    pub fn sector_count(&self) -> u32 {
        self.sectors.len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.options.read_only
    }

    pub fn set_size_limit(&mut self, bytes: usize) {
        self.options.max_chunk_size = bytes;
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn ensure_writable(&self) -> Result<()> {
        if self.options.read_only {
            return Err(StoreError::ReadOnly(self.path.clone()));
        }
        Ok(())
    }

    /// Write header + payload padded to whole sectors
    fn write_extent(
        &mut self,
        sector: u32,
        count: u32,
        payload: &[u8],
        compression: Compression,
    ) -> Result<()> {
        let mut extent = Vec::with_capacity(count as usize * SECTOR_BYTES);
        extent.extend_from_slice(&(payload.len() as u32 + 1).to_be_bytes());
        extent.push(compression.id());
        extent.extend_from_slice(payload);
        extent.resize(count as usize * SECTOR_BYTES, 0);

        self.file
            .seek(SeekFrom::Start(sector as u64 * SECTOR_BYTES as u64))?;
        self.file.write_all(&extent)?;
        if self.options.sync_writes {
            self.file.sync_data()?;
        }
        Ok(())
    }

    fn set_location(&mut self, index: usize, loc: Location) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(RegionHeader::location_offset(index)))?;
        self.file.write_all(&loc.to_raw().to_be_bytes())?;
        self.header.set_location(index, loc);
        Ok(())
    }

    fn set_timestamp(&mut self, index: usize, timestamp: u32) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(RegionHeader::timestamp_offset(index)))?;
        self.file.write_all(&timestamp.to_be_bytes())?;
        self.header.set_timestamp(index, timestamp);
        Ok(())
    }
}

fn unix_seconds() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}
