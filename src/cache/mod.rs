//! Chunk Cache Module
//!
//! Bounded write-back cache of decoded chunks in front of a `ChunkSource`.
//!
//! ## Responsibilities
//! - Keep at most `capacity` decoded chunks in memory
//! - Evict least-recently-used chunks, writing dirty ones back first
//! - Gate every write-back on the world session lock
//! - Count hits and misses
//!
//! ## Eviction
//! ```text
//! get(pos) ── hit ──▶ promote to MRU
//!    │
//!   miss
//!    ▼
//! source.load(pos) ──▶ evict LRU until len < capacity ──▶ insert as MRU
//!                          │
//!                        dirty? ──▶ lock.check() ──▶ source.store()
//! ```

mod chunk_cache;

pub use chunk_cache::{ChunkCache, FlushProgress};

use crate::chunk::{ChunkPos, ChunkRecord};
use crate::error::Result;

/// Backing store the cache loads from and writes back to
pub trait ChunkSource {
    /// Load a chunk; `ChunkNotPresent` if it was never stored
    fn load(&mut self, pos: ChunkPos) -> Result<ChunkRecord>;

    /// Persist a chunk, replacing any previous version
    fn store(&mut self, pos: ChunkPos, chunk: &ChunkRecord) -> Result<()>;

    /// Remove a chunk; deleting an absent chunk is not an error
    fn delete(&mut self, pos: ChunkPos) -> Result<()>;

    /// True if `load` would find the chunk
    fn contains(&mut self, pos: ChunkPos) -> Result<bool> {
        match self.load(pos) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_present() => Ok(false),
            Err(e) => Err(e),
        }
    }
}
