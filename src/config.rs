//! Configuration for voxelstore
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{Result, StoreError};
use crate::nbt::Compression;
use crate::region::{is_valid_dimension, CHUNK_HEADER_SIZE, OVERWORLD};

/// Main configuration for a world store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // World Directory
    // -------------------------------------------------------------------------
    /// Root directory of the world.
    /// Internal structure:
    ///   {world_dir}/
    ///     ├── session.lock     (owner token + heartbeat)
    ///     ├── region/          (r.<rx>.<rz>.mca files, overworld)
    ///     └── DIM-1/region/    (other dimensions)
    pub world_dir: PathBuf,

    /// Create the world directory if it does not exist.
    /// Ignored for `LockMode::ReadOnly`, which never creates anything.
    pub create: bool,

    /// Dimension served by the store; empty for the overworld
    pub dimension: String,

    // -------------------------------------------------------------------------
    // Session Lock Configuration
    // -------------------------------------------------------------------------
    /// How the session lock is taken when the world is opened
    pub lock_mode: LockMode,

    /// A lock whose heartbeat is older than this is considered stale (milliseconds)
    pub lock_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Cache Configuration
    // -------------------------------------------------------------------------
    /// Max number of decoded chunks kept in memory
    pub cache_capacity: usize,

    // -------------------------------------------------------------------------
    // Region Configuration
    // -------------------------------------------------------------------------
    /// Compression applied to newly written chunk records
    pub compression: Compression,

    /// Ceiling on a chunk's compressed size, including its 5 byte extent header.
    /// Extents are also capped at 255 sectors, slightly under 1 MiB.
    pub max_chunk_size: usize,

    /// fsync chunk data before the region index is repointed at it
    pub sync_writes: bool,
}

/// How a world's session lock is taken on open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Acquire the lock; fail if another live session holds it
    Exclusive,

    /// Force-acquire, invalidating any previous holder
    TakeOver,

    /// Take no lock; every write-back fails with `SessionLockLost`
    ReadOnly,
}

/// Default region ceiling: 1 MiB
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 1024 * 1024;

impl Default for Config {
    fn default() -> Self {
        Self {
            world_dir: PathBuf::from("./world"),
            create: true,
            dimension: OVERWORLD.to_string(),
            lock_mode: LockMode::Exclusive,
            lock_timeout_ms: 60_000,
            cache_capacity: 400,
            compression: Compression::Zlib,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            sync_writes: true,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the engine cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(StoreError::Config(
                "cache_capacity must be at least 1".to_string(),
            ));
        }

        if self.max_chunk_size <= CHUNK_HEADER_SIZE || self.max_chunk_size > DEFAULT_MAX_CHUNK_SIZE {
            return Err(StoreError::Config(format!(
                "max_chunk_size must be in ({}, {}], got {}",
                CHUNK_HEADER_SIZE, DEFAULT_MAX_CHUNK_SIZE, self.max_chunk_size
            )));
        }

        if !is_valid_dimension(&self.dimension) {
            return Err(StoreError::Config(format!(
                "dimension must be empty or a plain directory name, got {:?}",
                self.dimension
            )));
        }

        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the world directory
    pub fn world_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.world_dir = path.into();
        self
    }

    /// Create the world directory when missing
    pub fn create(mut self, create: bool) -> Self {
        self.config.create = create;
        self
    }

    /// Set the dimension (e.g. `DIM-1`); empty for the overworld
    pub fn dimension(mut self, name: impl Into<String>) -> Self {
        self.config.dimension = name.into();
        self
    }

    /// Set the lock mode used on open
    pub fn lock_mode(mut self, mode: LockMode) -> Self {
        self.config.lock_mode = mode;
        self
    }

    /// Set the stale-lock timeout (in milliseconds)
    pub fn lock_timeout_ms(mut self, ms: u64) -> Self {
        self.config.lock_timeout_ms = ms;
        self
    }

    /// Set the cache capacity (in chunks)
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = capacity;
        self
    }

    /// Set the compression for new chunk records
    pub fn compression(mut self, compression: Compression) -> Self {
        self.config.compression = compression;
        self
    }

    /// Set the per-chunk compressed size ceiling (in bytes)
    pub fn max_chunk_size(mut self, bytes: usize) -> Self {
        self.config.max_chunk_size = bytes;
        self
    }

    /// Enable or disable fsync before index updates
    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.config.sync_writes = sync;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
