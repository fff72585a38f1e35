//! Tests for the world store
//!
//! These tests verify:
//! - Chunks survive save + reopen
//! - Lock modes on open
//! - Read-only worlds refuse every write and leave the directory untouched
//! - Dimensions are stored and listed separately
//! - Save progress reporting and cache stats

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use voxelstore::{
    ChunkPos, Config, LockMode, LockState, StoreError, Tag, WorldStore,
};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn config(temp: &TempDir) -> Config {
    Config::builder()
        .world_dir(temp.path())
        .sync_writes(false)
        .build()
}

fn config_with(temp: &TempDir, mode: LockMode) -> Config {
    Config::builder()
        .world_dir(temp.path())
        .sync_writes(false)
        .lock_mode(mode)
        .build()
}

/// Every file under `dir` with its length
fn snapshot(dir: &Path) -> BTreeMap<String, u64> {
    let mut files = BTreeMap::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path.clone());
            }
            let name = path.strip_prefix(dir).unwrap().display().to_string();
            files.insert(name, fs::metadata(&path).unwrap().len());
        }
    }
    files
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_save_and_reopen() {
    let temp = TempDir::new().unwrap();
    {
        let mut store = WorldStore::open(config(&temp)).unwrap();
        let chunk = store.create_chunk(ChunkPos::new(-5, 12)).unwrap();
        chunk.section_or_create(3).set_block_id(4, 5, 6, 0x0abc);
        chunk.section_or_create(3).set_metadata(4, 5, 6, 9);
        chunk
            .level_mut()
            .insert("InhabitedTime".to_string(), Tag::Long(77));

        assert_eq!(store.save().unwrap(), 1);
        store.close().unwrap();
    }

    let mut store = WorldStore::open(config(&temp)).unwrap();
    let chunk = store.get_chunk(ChunkPos::new(-5, 12)).unwrap();
    let section = chunk.section(3).unwrap();
    assert_eq!(section.block_id(4, 5, 6), 0x0abc);
    assert_eq!(section.metadata(4, 5, 6), 9);
    assert_eq!(chunk.level().get("InhabitedTime"), Some(&Tag::Long(77)));
    assert!(temp.path().join("region/r.-1.0.mca").exists());
}

#[test]
fn test_edit_through_get_chunk_mut_is_saved() {
    let temp = TempDir::new().unwrap();
    {
        let mut store = WorldStore::open(config(&temp)).unwrap();
        store.create_chunk(ChunkPos::new(0, 0)).unwrap();
        store.save().unwrap();

        store
            .get_chunk_mut(ChunkPos::new(0, 0))
            .unwrap()
            .section_or_create(0)
            .set_block_light(1, 1, 1, 12);
        assert_eq!(store.cache_stats().dirty, 1);
        store.close().unwrap();
    }

    let mut store = WorldStore::open(config(&temp)).unwrap();
    let chunk = store.get_chunk(ChunkPos::new(0, 0)).unwrap();
    assert_eq!(chunk.section(0).unwrap().block_light(1, 1, 1), 12);
}

#[test]
fn test_create_existing_chunk_fails() {
    let temp = TempDir::new().unwrap();
    let mut store = WorldStore::open(config(&temp)).unwrap();
    store.create_chunk(ChunkPos::new(1, 2)).unwrap();

    assert!(matches!(
        store.create_chunk(ChunkPos::new(1, 2)),
        Err(StoreError::ChunkExists { x: 1, z: 2 })
    ));

    store.save().unwrap();
    store.set_cache_capacity(1).unwrap();
    store.create_chunk(ChunkPos::new(9, 9)).unwrap();
    // (1, 2) is only on disk now
    assert!(matches!(
        store.create_chunk(ChunkPos::new(1, 2)),
        Err(StoreError::ChunkExists { .. })
    ));
}

#[test]
fn test_delete_chunk() {
    let temp = TempDir::new().unwrap();
    let mut store = WorldStore::open(config(&temp)).unwrap();
    store.create_chunk(ChunkPos::new(3, 3)).unwrap();
    store.save().unwrap();

    store.delete_chunk(ChunkPos::new(3, 3)).unwrap();
    assert!(!store.contains_chunk(ChunkPos::new(3, 3)).unwrap());
    assert!(store.get_chunk(ChunkPos::new(3, 3)).unwrap_err().is_not_present());
    assert_eq!(store.chunk_count().unwrap(), 0);
}

#[test]
fn test_save_progress_reports_each_chunk() {
    let temp = TempDir::new().unwrap();
    let mut store = WorldStore::open(config(&temp)).unwrap();
    for x in 0..4 {
        store.create_chunk(ChunkPos::new(x, 0)).unwrap();
    }

    let mut seen = Vec::new();
    let written = store
        .save_with_progress(|done, total| seen.push((done, total)))
        .unwrap();

    assert_eq!(written, 4);
    assert_eq!(seen, vec![(1, 4), (2, 4), (3, 4), (4, 4)]);
    assert_eq!(store.save().unwrap(), 0);
}

#[test]
fn test_small_cache_round_trip() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .world_dir(temp.path())
        .sync_writes(false)
        .cache_capacity(3)
        .build();
    let mut store = WorldStore::open(config).unwrap();

    for x in 0..20 {
        store
            .create_chunk(ChunkPos::new(x, x % 3))
            .unwrap()
            .section_or_create(0)
            .set_block_id(0, 0, 0, x as u16 + 1);
    }
    let stats = store.cache_stats();
    assert!(stats.len <= 3);

    for x in 0..20 {
        let chunk = store.get_chunk(ChunkPos::new(x, x % 3)).unwrap();
        assert_eq!(chunk.section(0).unwrap().block_id(0, 0, 0), x as u16 + 1);
    }
    assert_eq!(store.chunk_count().unwrap(), 20);
}

// =============================================================================
// Lock Mode Tests
// =============================================================================

#[test]
fn test_exclusive_open_refused_while_held() {
    let temp = TempDir::new().unwrap();
    let first = WorldStore::open(config(&temp)).unwrap();
    assert_eq!(first.lock_state(), LockState::Held);

    let err = WorldStore::open(config(&temp)).err().unwrap();
    assert!(matches!(err, StoreError::SessionLocked { .. }));

    drop(first);
    WorldStore::open(config(&temp)).unwrap();
}

#[test]
fn test_take_over_breaks_previous_session() {
    let temp = TempDir::new().unwrap();
    let mut first = WorldStore::open(config(&temp)).unwrap();
    first.create_chunk(ChunkPos::new(0, 0)).unwrap();

    let mut second = WorldStore::open(config_with(&temp, LockMode::TakeOver)).unwrap();

    let err = first.save().unwrap_err();
    assert!(err.is_lock_lost());
    assert_eq!(first.lock_state(), LockState::Lost);
    assert!(!second.contains_chunk(ChunkPos::new(0, 0)).unwrap());

    second.create_chunk(ChunkPos::new(1, 1)).unwrap();
    assert_eq!(second.save().unwrap(), 1);
}

#[test]
fn test_read_only_world() {
    let temp = TempDir::new().unwrap();
    {
        let mut store = WorldStore::open(config(&temp)).unwrap();
        store.create_chunk(ChunkPos::new(2, 2)).unwrap();
        store.close().unwrap();
    }

    let mut reader = WorldStore::open(config_with(&temp, LockMode::ReadOnly)).unwrap();
    assert!(reader.is_read_only());
    assert!(reader.get_chunk(ChunkPos::new(2, 2)).is_ok());

    // a writer can still take the lock
    let writer = WorldStore::open(config(&temp)).unwrap();
    assert_eq!(writer.lock_state(), LockState::Held);

    reader.get_chunk_mut(ChunkPos::new(2, 2)).unwrap();
    assert!(reader.save().unwrap_err().is_lock_lost());
    assert!(reader.delete_chunk(ChunkPos::new(2, 2)).unwrap_err().is_lock_lost());
    assert!(reader.heartbeat().unwrap_err().is_lock_lost());
}

#[test]
fn test_read_only_open_modifies_nothing() {
    let temp = TempDir::new().unwrap();
    {
        let mut store = WorldStore::open(config(&temp)).unwrap();
        store.create_chunk(ChunkPos::new(1, 1)).unwrap();
        store.close().unwrap();
    }
    // trailing partial sector, as left by a writer mid-append
    let region = temp.path().join("region/r.0.0.mca");
    OpenOptions::new()
        .append(true)
        .open(&region)
        .unwrap()
        .write_all(&[0xab; 100])
        .unwrap();

    let before = snapshot(temp.path());
    let before_bytes = fs::read(&region).unwrap();
    {
        let mut reader = WorldStore::open(config_with(&temp, LockMode::ReadOnly)).unwrap();
        assert!(reader.get_chunk(ChunkPos::new(1, 1)).is_ok());
        assert!(reader.get_chunk(ChunkPos::new(500, 500)).unwrap_err().is_not_present());
        assert_eq!(reader.chunk_count().unwrap(), 1);
        reader.close().unwrap();
    }

    assert_eq!(snapshot(temp.path()), before);
    assert_eq!(fs::read(&region).unwrap(), before_bytes);
}

#[test]
fn test_read_only_open_of_empty_world_creates_nothing() {
    let temp = TempDir::new().unwrap();
    let mut reader = WorldStore::open(config_with(&temp, LockMode::ReadOnly)).unwrap();

    assert_eq!(reader.chunk_positions().unwrap(), Vec::new());
    assert!(!reader.contains_chunk(ChunkPos::new(0, 0)).unwrap());
    drop(reader);
    assert!(snapshot(temp.path()).is_empty());
}

// =============================================================================
// Dimension Tests
// =============================================================================

#[test]
fn test_dimensions_hold_separate_chunks() {
    let temp = TempDir::new().unwrap();
    {
        let mut overworld = WorldStore::open(config(&temp)).unwrap();
        overworld.create_chunk(ChunkPos::new(0, 0)).unwrap();
        overworld.create_chunk(ChunkPos::new(1, 0)).unwrap();
        overworld.close().unwrap();
    }
    {
        let nether = Config::builder()
            .world_dir(temp.path())
            .sync_writes(false)
            .dimension("DIM-1")
            .build();
        let mut store = WorldStore::open(nether).unwrap();
        assert_eq!(store.dimension(), "DIM-1");
        assert_eq!(store.chunk_count().unwrap(), 0);
        store.create_chunk(ChunkPos::new(-8, 3)).unwrap();
        store.close().unwrap();
    }

    let mut store = WorldStore::open(config(&temp)).unwrap();
    assert_eq!(
        store.list_dimensions().unwrap(),
        vec!["".to_string(), "DIM-1".to_string()]
    );
    assert_eq!(
        store.chunk_positions().unwrap(),
        vec![ChunkPos::new(0, 0), ChunkPos::new(1, 0)]
    );
    assert!(!store.contains_chunk(ChunkPos::new(-8, 3)).unwrap());
    store.close().unwrap();

    let mut nether = WorldStore::open(
        Config::builder()
            .world_dir(temp.path())
            .dimension("DIM-1")
            .lock_mode(LockMode::ReadOnly)
            .build(),
    )
    .unwrap();
    assert_eq!(nether.chunk_positions().unwrap(), vec![ChunkPos::new(-8, 3)]);
    assert!(temp.path().join("DIM-1/region/r.-1.0.mca").exists());
}

#[test]
fn test_invalid_config_rejected() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .world_dir(temp.path())
        .cache_capacity(0)
        .build();
    assert!(matches!(WorldStore::open(config), Err(StoreError::Config(_))));
}

#[test]
fn test_cache_stats_count_hits() {
    let temp = TempDir::new().unwrap();
    let mut store = WorldStore::open(config(&temp)).unwrap();
    store.create_chunk(ChunkPos::new(0, 0)).unwrap();
    store.save().unwrap();

    store.get_chunk(ChunkPos::new(0, 0)).unwrap();
    store.get_chunk(ChunkPos::new(0, 0)).unwrap();
    let stats = store.cache_stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 0);
    assert_eq!(stats.hit_rate(), 1.0);
}
