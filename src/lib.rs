//! # voxelstore
//!
//! Storage engine for chunked voxel worlds:
//! - Tagged-tree (NBT) record codec with gzip/zlib envelopes
//! - Sector-allocated region files holding 32x32 chunks each
//! - Bounded write-back chunk cache
//! - Cross-process session lock guarding every write
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        WorldStore                           │
//! │          (open / get / create / save / close)               │
//! └─────────────────────┬───────────────────────┬───────────────┘
//!                       │                       │
//!                       ▼                       ▼
//!               ┌──────────────┐        ┌──────────────┐
//!               │  ChunkCache  │──────▶ │ SessionLock  │
//!               │ (LRU, dirty) │ check  │ session.lock │
//!               └──────┬───────┘        └──────────────┘
//!                      │ load / store
//!                      ▼
//!               ┌──────────────┐
//!               │ WorldFolder  │  region/r.<rx>.<rz>.mca
//!               └──────┬───────┘
//!                      │
//!                      ▼
//!               ┌──────────────┐        ┌──────────────┐
//!               │  RegionFile  │──────▶ │  nbt codec   │
//!               │  (sectors)   │        │ (Tag trees)  │
//!               └──────────────┘        └──────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod nbt;
pub mod chunk;
pub mod region;
pub mod cache;
pub mod lock;
pub mod geometry;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StoreError};
pub use config::{Config, LockMode};
pub use chunk::{ChunkPos, ChunkRecord, Section};
pub use nbt::{Compound, Compression, List, Tag, TagType};
pub use region::{RegionFile, RegionPos, WorldFolder};
pub use cache::{ChunkCache, ChunkSource};
pub use lock::{LockState, SessionLock};
pub use geometry::{BlockPos, BoundingBox};
pub use store::{CacheStats, WorldStore};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of voxelstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
