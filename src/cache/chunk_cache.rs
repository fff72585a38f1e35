//! Chunk cache implementation
//!
//! `lru::LruCache` keyed by chunk position. The map itself is unbounded;
//! capacity is enforced here so a failed write-back can abort an eviction
//! without losing the dirty chunk.

use std::sync::Arc;

use lru::LruCache;

use crate::chunk::{ChunkPos, ChunkRecord};
use crate::error::{Result, StoreError};
use crate::lock::SessionLock;

use super::ChunkSource;

struct CacheEntry {
    chunk: ChunkRecord,
    dirty: bool,
}

/// Write-back LRU cache of decoded chunks
///
/// ## Invariants:
/// - `len() <= capacity()` after every operation
/// - A dirty chunk leaves the cache only after it was stored, or through
///   `discard`
/// - Nothing is written to the source unless the session lock is held
pub struct ChunkCache<S: ChunkSource> {
    source: S,
    entries: LruCache<ChunkPos, CacheEntry>,
    capacity: usize,
    /// `None` for a read-only world
    lock: Option<Arc<SessionLock>>,
    hits: u64,
    misses: u64,
}

impl<S: ChunkSource> ChunkCache<S> {
    /// Create a cache holding up to `capacity` chunks (at least 1)
    pub fn new(source: S, capacity: usize, lock: Option<Arc<SessionLock>>) -> Result<Self> {
        if capacity == 0 {
            return Err(StoreError::Config(
                "cache capacity must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            source,
            entries: LruCache::unbounded(),
            capacity,
            lock,
            hits: 0,
            misses: 0,
        })
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Fetch a chunk, loading it on a miss. The chunk becomes most recent.
    ///
    /// `ChunkNotPresent` from the source propagates and nothing is cached.
    pub fn get(&mut self, pos: ChunkPos) -> Result<&mut ChunkRecord> {
        self.fetch(pos)?;
        self.entries
            .get_mut(&pos)
            .map(|entry| &mut entry.chunk)
            .ok_or(StoreError::ChunkNotPresent { x: pos.x, z: pos.z })
    }

    /// `get`, marking the chunk dirty
    pub fn get_mut(&mut self, pos: ChunkPos) -> Result<&mut ChunkRecord> {
        self.fetch(pos)?;
        match self.entries.get_mut(&pos) {
            Some(entry) => {
                entry.dirty = true;
                Ok(&mut entry.chunk)
            }
            None => Err(StoreError::ChunkNotPresent { x: pos.x, z: pos.z }),
        }
    }

    /// Insert a new empty chunk, dirty
    ///
    /// Fails with `ChunkExists` if the chunk is cached or stored.
    pub fn create(&mut self, pos: ChunkPos) -> Result<&mut ChunkRecord> {
        if self.entries.contains(&pos) || self.source.contains(pos)? {
            return Err(StoreError::ChunkExists { x: pos.x, z: pos.z });
        }

        self.make_room()?;
        self.entries.put(
            pos,
            CacheEntry {
                chunk: ChunkRecord::new(pos),
                dirty: true,
            },
        );
        tracing::debug!(x = pos.x, z = pos.z, "created chunk");

        self.entries
            .get_mut(&pos)
            .map(|entry| &mut entry.chunk)
            .ok_or(StoreError::ChunkNotPresent { x: pos.x, z: pos.z })
    }

    /// Cached, without promoting
    pub fn contains(&self, pos: ChunkPos) -> bool {
        self.entries.contains(&pos)
    }

    /// Cached chunk without promoting or loading
    pub fn peek(&self, pos: ChunkPos) -> Option<&ChunkRecord> {
        self.entries.peek(&pos).map(|entry| &entry.chunk)
    }

    /// Positions of every cached chunk, most recent first
    pub fn cached_positions(&self) -> impl Iterator<Item = ChunkPos> + '_ {
        self.entries.iter().map(|(pos, _)| *pos)
    }

    // =========================================================================
    // Dirty Tracking
    // =========================================================================

    /// Returns false if the chunk is not cached
    pub fn mark_dirty(&mut self, pos: ChunkPos) -> bool {
        match self.entries.peek_mut(&pos) {
            Some(entry) => {
                entry.dirty = true;
                true
            }
            None => false,
        }
    }

    pub fn is_dirty(&self, pos: ChunkPos) -> bool {
        self.entries.peek(&pos).is_some_and(|entry| entry.dirty)
    }

    pub fn dirty_count(&self) -> usize {
        self.entries.iter().filter(|(_, entry)| entry.dirty).count()
    }

    /// Dirty positions in ascending order
    pub fn dirty_positions(&self) -> Vec<ChunkPos> {
        let mut dirty: Vec<ChunkPos> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.dirty)
            .map(|(pos, _)| *pos)
            .collect();
        dirty.sort();
        dirty
    }

    // =========================================================================
    // Write-back
    // =========================================================================

    /// Write every dirty chunk back. Returns the number written.
    pub fn flush_all(&mut self) -> Result<usize> {
        let mut written = 0;
        for step in self.flush_progress() {
            step?;
            written += 1;
        }
        if written > 0 {
            tracing::info!(chunks = written, "flushed chunk cache");
        }
        Ok(written)
    }

    /// Write dirty chunks back one per `next()`, yielding `(done, total)`.
    ///
    /// Dropping the iterator early leaves the remaining chunks dirty.
    pub fn flush_progress(&mut self) -> FlushProgress<'_, S> {
        let pending = self.dirty_positions();
        FlushProgress {
            total: pending.len(),
            pending: pending.into_iter(),
            done: 0,
            cache: self,
            failed: false,
        }
    }

    /// Remove a chunk from the cache and the source
    pub fn delete(&mut self, pos: ChunkPos) -> Result<()> {
        self.check_lock()?;
        self.source.delete(pos)?;
        self.entries.pop(&pos);
        tracing::debug!(x = pos.x, z = pos.z, "deleted chunk");
        Ok(())
    }

    /// Drop a cached chunk without writing it back
    pub fn discard(&mut self, pos: ChunkPos) -> Option<ChunkRecord> {
        self.entries.pop(&pos).map(|entry| {
            if entry.dirty {
                tracing::debug!(x = pos.x, z = pos.z, "discarding unsaved chunk");
            }
            entry.chunk
        })
    }

    // =========================================================================
    // Capacity & Stats
    // =========================================================================

    /// Change capacity, evicting down to it
    pub fn set_capacity(&mut self, capacity: usize) -> Result<()> {
        if capacity == 0 {
            return Err(StoreError::Config(
                "cache capacity must be at least 1".to_string(),
            ));
        }
        self.capacity = capacity;
        while self.entries.len() > self.capacity {
            self.evict_lru()?;
        }
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn lock(&self) -> Option<&Arc<SessionLock>> {
        self.lock.as_ref()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Count a hit, or load and insert on a miss
    fn fetch(&mut self, pos: ChunkPos) -> Result<()> {
        if self.entries.contains(&pos) {
            self.hits += 1;
            return Ok(());
        }

        self.misses += 1;
        let chunk = self.source.load(pos)?;
        self.make_room()?;
        self.entries.put(pos, CacheEntry { chunk, dirty: false });
        tracing::trace!(x = pos.x, z = pos.z, cached = self.entries.len(), "loaded chunk");
        Ok(())
    }

    /// Evict until one more entry fits
    fn make_room(&mut self) -> Result<()> {
        while self.entries.len() >= self.capacity {
            self.evict_lru()?;
        }
        Ok(())
    }

    /// On write-back failure the entry stays cached and dirty
    fn evict_lru(&mut self) -> Result<()> {
        let (pos, dirty) = match self.entries.peek_lru() {
            Some((pos, entry)) => (*pos, entry.dirty),
            None => return Ok(()),
        };
        if dirty {
            self.write_back(pos)?;
        }
        self.entries.pop(&pos);
        tracing::trace!(x = pos.x, z = pos.z, dirty, "evicted chunk");
        Ok(())
    }

    fn write_back(&mut self, pos: ChunkPos) -> Result<()> {
        self.check_lock()?;
        if let Some(entry) = self.entries.peek_mut(&pos) {
            self.source.store(pos, &entry.chunk)?;
            entry.dirty = false;
            tracing::debug!(x = pos.x, z = pos.z, "wrote chunk back");
        }
        Ok(())
    }

    fn check_lock(&self) -> Result<()> {
        match &self.lock {
            Some(lock) => lock.check(),
            None => Err(StoreError::SessionLockLost(
                "world is open read-only".to_string(),
            )),
        }
    }
}

/// Cooperative flush: one chunk written per step
pub struct FlushProgress<'a, S: ChunkSource> {
    cache: &'a mut ChunkCache<S>,
    pending: std::vec::IntoIter<ChunkPos>,
    done: usize,
    total: usize,
    failed: bool,
}

impl<S: ChunkSource> FlushProgress<'_, S> {
    pub fn total(&self) -> usize {
        self.total
    }
}

impl<S: ChunkSource> Iterator for FlushProgress<'_, S> {
    type Item = Result<(usize, usize)>;

    /// Stops after the first error
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let pos = self.pending.next()?;
        match self.cache.write_back(pos) {
            Ok(()) => {
                self.done += 1;
                Some(Ok((self.done, self.total)))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
