//! Error types for voxelstore
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for voxelstore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Format Errors (malformed bytes, never retried)
    // -------------------------------------------------------------------------
    #[error("Tag format error: {0}")]
    Format(String),

    #[error("Region format error: {0}")]
    RegionFormat(String),

    #[error("Chunk format error: {0}")]
    ChunkFormat(String),

    #[error("Tag type mismatch: list holds {expected}, got {found}")]
    TagType {
        expected: &'static str,
        found: &'static str,
    },

    // -------------------------------------------------------------------------
    // Chunk Errors
    // -------------------------------------------------------------------------
    #[error("Chunk ({x}, {z}) not present")]
    ChunkNotPresent { x: i32, z: i32 },

    #[error("Chunk ({x}, {z}) already exists")]
    ChunkExists { x: i32, z: i32 },

    #[error("Region file {0} is open read-only")]
    ReadOnly(std::path::PathBuf),

    #[error("Chunk ({x}, {z}) is {size} bytes compressed, exceeding the {limit} byte limit")]
    ChunkSize {
        x: i32,
        z: i32,
        size: usize,
        limit: usize,
    },

    // -------------------------------------------------------------------------
    // Session Lock Errors
    // -------------------------------------------------------------------------
    #[error("World is locked by another session (owner {owner:#018x})")]
    SessionLocked { owner: i64 },

    #[error("Session lock lost: {0}")]
    SessionLockLost(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// True for any of the malformed-bytes variants.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            StoreError::Format(_)
                | StoreError::RegionFormat(_)
                | StoreError::ChunkFormat(_)
                | StoreError::TagType { .. }
        )
    }

    /// Absence of a chunk is expected; callers usually treat it as empty.
    pub fn is_not_present(&self) -> bool {
        matches!(self, StoreError::ChunkNotPresent { .. })
    }

    pub fn is_lock_lost(&self) -> bool {
        matches!(self, StoreError::SessionLockLost(_))
    }
}
