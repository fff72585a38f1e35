//! World Store
//!
//! One open world: session lock, region folder and chunk cache together.
//!
//! ## Responsibilities
//! - Take the session lock according to `LockMode`
//! - Serve chunks through the cache
//! - Save (flush + heartbeat) at commit points
//! - Release the lock on close

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use crate::cache::ChunkCache;
use crate::chunk::{ChunkPos, ChunkRecord};
use crate::config::{Config, LockMode};
use crate::error::{Result, StoreError};
use crate::lock::{LockState, SessionLock};
use crate::region::{RegionOptions, WorldFolder};

/// Cache counters at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub len: usize,
    pub capacity: usize,
    pub dirty: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of lookups served from memory
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// An open world directory
///
/// ## Concurrency:
/// Single writer. All mutating methods take `&mut self`; share a store
/// across threads by wrapping it in a mutex.
pub struct WorldStore {
    config: Config,
    cache: ChunkCache<WorldFolder>,
    /// `None` when opened read-only
    lock: Option<Arc<SessionLock>>,
}

impl WorldStore {
    /// Open a world
    ///
    /// On open:
    /// 1. Validate config, create the directory if allowed
    /// 2. Take the session lock (`Exclusive`, `TakeOver`) or none (`ReadOnly`)
    /// 3. Open the dimension's region folder and an empty cache
    ///
    /// A `ReadOnly` open never creates or modifies anything on disk.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        if !config.world_dir.is_dir() {
            if !config.create || config.lock_mode == LockMode::ReadOnly {
                return Err(StoreError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("world directory {} does not exist", config.world_dir.display()),
                )));
            }
            fs::create_dir_all(&config.world_dir)?;
        }

        let lock = match config.lock_mode {
            LockMode::Exclusive => {
                let lock = SessionLock::new(&config.world_dir, config.lock_timeout_ms);
                lock.acquire()?;
                Some(Arc::new(lock))
            }
            LockMode::TakeOver => {
                let lock = SessionLock::new(&config.world_dir, config.lock_timeout_ms);
                lock.force_acquire()?;
                Some(Arc::new(lock))
            }
            LockMode::ReadOnly => None,
        };

        let folder = WorldFolder::open_dimension(
            &config.world_dir,
            &config.dimension,
            RegionOptions::from(&config),
        )?;
        let cache = ChunkCache::new(folder, config.cache_capacity, lock.clone())?;

        tracing::info!(
            world = %config.world_dir.display(),
            dimension = %config.dimension,
            mode = ?config.lock_mode,
            cache_capacity = config.cache_capacity,
            "opened world"
        );

        Ok(Self {
            config,
            cache,
            lock,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified world directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().world_dir(path).build())
    }

    // =========================================================================
    // Chunks
    // =========================================================================

    /// New empty chunk, unsaved until the next `save`
    pub fn create_chunk(&mut self, pos: ChunkPos) -> Result<&mut ChunkRecord> {
        self.cache.create(pos)
    }

    pub fn get_chunk(&mut self, pos: ChunkPos) -> Result<&ChunkRecord> {
        self.cache.get(pos).map(|chunk| &*chunk)
    }

    /// Chunk for editing; it is marked dirty
    pub fn get_chunk_mut(&mut self, pos: ChunkPos) -> Result<&mut ChunkRecord> {
        self.cache.get_mut(pos)
    }

    /// Returns false if the chunk is not cached
    pub fn mark_dirty(&mut self, pos: ChunkPos) -> bool {
        self.cache.mark_dirty(pos)
    }

    pub fn contains_chunk(&mut self, pos: ChunkPos) -> Result<bool> {
        if self.cache.contains(pos) {
            return Ok(true);
        }
        self.cache.source_mut().contains_chunk(pos)
    }

    /// Remove a chunk from memory and disk
    pub fn delete_chunk(&mut self, pos: ChunkPos) -> Result<()> {
        self.cache.delete(pos)
    }

    /// Stored chunks plus chunks created but not yet saved, sorted
    pub fn chunk_positions(&mut self) -> Result<Vec<ChunkPos>> {
        let cached: Vec<ChunkPos> = self.cache.cached_positions().collect();
        let mut positions = self.cache.source_mut().chunk_positions()?;
        positions.extend(cached);
        positions.sort();
        positions.dedup();
        Ok(positions)
    }

    pub fn chunk_count(&mut self) -> Result<usize> {
        Ok(self.chunk_positions()?.len())
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write every dirty chunk, then refresh the lock heartbeat.
    /// Returns the number of chunks written.
    pub fn save(&mut self) -> Result<usize> {
        self.save_with_progress(|_, _| {})
    }

    /// `save`, reporting `(done, total)` after each chunk
    pub fn save_with_progress<F>(&mut self, mut progress: F) -> Result<usize>
    where
        F: FnMut(usize, usize),
    {
        let mut written = 0;
        for step in self.cache.flush_progress() {
            let (done, total) = step?;
            progress(done, total);
            written = done;
        }
        self.heartbeat()?;

        tracing::info!(world = %self.config.world_dir.display(), chunks = written, "saved world");
        Ok(written)
    }

    /// Refresh the lock heartbeat, failing if the lock was lost
    pub fn heartbeat(&self) -> Result<()> {
        match &self.lock {
            Some(lock) => lock.heartbeat(),
            None => Err(StoreError::SessionLockLost(
                "world is open read-only".to_string(),
            )),
        }
    }

    /// Clear unreadable chunks from every region file
    pub fn repair(&mut self) -> Result<usize> {
        match &self.lock {
            Some(lock) => lock.check()?,
            None => {
                return Err(StoreError::SessionLockLost(
                    "world is open read-only".to_string(),
                ))
            }
        }
        self.cache.source_mut().repair_all()
    }

    /// Save and release the lock. A read-only world with unsaved chunks
    /// reports them as lost.
    pub fn close(mut self) -> Result<usize> {
        let lock = match self.lock.clone() {
            Some(lock) => lock,
            None => {
                let dirty = self.cache.dirty_count();
                self.discard_all();
                if dirty > 0 {
                    return Err(StoreError::SessionLockLost(format!(
                        "world is open read-only; {} unsaved chunks discarded",
                        dirty
                    )));
                }
                return Ok(0);
            }
        };

        let written = self.save()?;
        lock.release()?;
        tracing::info!(world = %self.config.world_dir.display(), "closed world");
        Ok(written)
    }

    // =========================================================================
    // State
    // =========================================================================

    /// `Unlocked` for a read-only world
    pub fn lock_state(&self) -> LockState {
        self.lock
            .as_ref()
            .map_or(LockState::Unlocked, |lock| lock.state())
    }

    pub fn is_read_only(&self) -> bool {
        self.lock.is_none()
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            len: self.cache.len(),
            capacity: self.cache.capacity(),
            dirty: self.cache.dirty_count(),
            hits: self.cache.hits(),
            misses: self.cache.misses(),
        }
    }

    pub fn set_cache_capacity(&mut self, capacity: usize) -> Result<()> {
        self.cache.set_capacity(capacity)?;
        self.config.cache_capacity = capacity;
        Ok(())
    }

    pub fn world_dir(&self) -> &Path {
        &self.config.world_dir
    }

    /// `""` for the overworld
    pub fn dimension(&self) -> &str {
        &self.config.dimension
    }

    /// Every dimension present in this world, overworld first
    pub fn list_dimensions(&self) -> Result<Vec<String>> {
        WorldFolder::list_dimensions(&self.config.world_dir)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn discard_all(&mut self) {
        let cached: Vec<ChunkPos> = self.cache.cached_positions().collect();
        for pos in cached {
            self.cache.discard(pos);
        }
    }
}

impl Drop for WorldStore {
    fn drop(&mut self) {
        let dirty = self.cache.dirty_count();
        if dirty > 0 {
            tracing::warn!(
                world = %self.config.world_dir.display(),
                dirty,
                "world dropped with unsaved chunks"
            );
        }
    }
}
