//! Tests for region files
//!
//! These tests verify:
//! - On-disk layout of the header and extents
//! - Reads and writes across reopen
//! - Allocation never overlaps live extents
//! - Size ceiling leaves the file untouched
//! - Damaged index entries are detected and repairable
//! - Records that inflate past the cap are rejected

use std::fs;
use std::path::PathBuf;

use voxelstore::nbt::{self, Compound, Tag, MAX_INFLATED_SIZE};
use voxelstore::region::{
    RegionFile, RegionOptions, CHUNK_HEADER_SIZE, HEADER_BYTES, MAX_CHUNK_SECTORS, SECTOR_BYTES,
};
use voxelstore::{Compression, StoreError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_region() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("r.0.0.mca");
    (temp_dir, path)
}

fn unsynced() -> RegionOptions {
    RegionOptions {
        sync_writes: false,
        ..RegionOptions::default()
    }
}

/// Deterministic bytes that compress poorly
fn noise(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2_654_435_761).max(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect()
}

/// Every live extent is inside the heap and no two overlap
fn assert_no_overlap(region: &RegionFile) {
    let mut extents: Vec<_> = region
        .chunk_positions()
        .into_iter()
        .filter_map(|(x, z)| region.extent(x, z))
        .collect();
    extents.sort_by_key(|e| e.sector);

    for pair in extents.windows(2) {
        assert!(
            !pair[0].overlaps(&pair[1]),
            "extents overlap: {:?} {:?}",
            pair[0],
            pair[1]
        );
    }
    for extent in &extents {
        assert!(extent.sector >= 2);
        assert!(extent.end() <= region.sector_count());
    }
}

// =============================================================================
// Layout Tests
// =============================================================================

#[test]
fn test_zero_chunk_layout() {
    let (_temp, path) = setup_temp_region();
    let data = vec![0u8; 4096];

    {
        let mut region = RegionFile::open(&path).unwrap();
        region.write_chunk_with(0, 0, &data, Compression::Zlib).unwrap();
    }

    let raw = fs::read(&path).unwrap();
    assert_eq!(raw.len() % SECTOR_BYTES, 0);
    // slot 0 → sector 2, one sector
    assert_eq!(&raw[0..4], &[0, 0, 2, 1]);
    // timestamp set
    assert_ne!(&raw[SECTOR_BYTES..SECTOR_BYTES + 4], &[0, 0, 0, 0]);

    let extent = &raw[HEADER_BYTES..];
    let length = u32::from_be_bytes([extent[0], extent[1], extent[2], extent[3]]) as usize;
    assert_eq!(extent[4], Compression::Zlib.id());
    let payload = &extent[CHUNK_HEADER_SIZE..CHUNK_HEADER_SIZE + length - 1];
    assert_eq!(Compression::Zlib.decompress(payload).unwrap(), data);

    let mut region = RegionFile::open(&path).unwrap();
    assert_eq!(region.read_chunk(0, 0).unwrap(), data);
    let (_, compression) = region.read_chunk_compressed(0, 0).unwrap();
    assert_eq!(compression, Compression::Zlib);
}

#[test]
fn test_all_compressions_readable() {
    let (_temp, path) = setup_temp_region();
    let mut region = RegionFile::open_with(&path, unsynced()).unwrap();

    let cases = [(Compression::Gzip, 0), (Compression::Zlib, 1), (Compression::None, 2)];
    for (compression, x) in cases {
        region.write_chunk_with(x, 0, &noise(3000, x as u32), compression).unwrap();
    }
    for (compression, x) in cases {
        assert_eq!(region.read_chunk(x, 0).unwrap(), noise(3000, x as u32));
        assert_eq!(region.read_chunk_compressed(x, 0).unwrap().1, compression);
    }
}

#[test]
fn test_local_coordinates_wrap() {
    let (_temp, path) = setup_temp_region();
    let mut region = RegionFile::open_with(&path, unsynced()).unwrap();

    region.write_chunk(-1, 33, b"wrapped").unwrap();
    assert!(region.contains_chunk(31, 1));
    assert_eq!(region.read_chunk(31, 1).unwrap(), b"wrapped");
    assert_eq!(region.chunk_positions(), vec![(31, 1)]);
}

#[test]
fn test_absent_chunk() {
    let (_temp, path) = setup_temp_region();
    let mut region = RegionFile::open(&path).unwrap();

    let err = region.read_chunk(4, 4).unwrap_err();
    assert!(matches!(err, StoreError::ChunkNotPresent { x: 4, z: 4 }));
    assert_eq!(region.timestamp(4, 4), 0);
    assert!(region.extent(4, 4).is_none());
}

#[test]
fn test_record_round_trip_through_region() {
    let (_temp, path) = setup_temp_region();
    let mut root = Compound::new();
    root.insert("v".to_string(), Tag::LongArray(vec![1, 2, 3]));
    let tag = Tag::Compound(root);

    {
        let mut region = RegionFile::open(&path).unwrap();
        region.write_chunk(7, 9, &nbt::encode("", &tag).unwrap()).unwrap();
    }

    let mut region = RegionFile::open(&path).unwrap();
    let (_, back) = nbt::decode(&region.read_chunk(7, 9).unwrap()).unwrap();
    assert_eq!(back, tag);
}

// =============================================================================
// Size Ceiling Tests
// =============================================================================

#[test]
fn test_oversized_write_leaves_state_unchanged() {
    let (_temp, path) = setup_temp_region();
    let mut region = RegionFile::open(&path).unwrap();
    region.set_size_limit(8192);

    region.write_chunk_with(2, 2, b"original", Compression::None).unwrap();
    let before_extent = region.extent(2, 2);
    let before_timestamp = region.timestamp(2, 2);
    let before_len = fs::metadata(&path).unwrap().len();

    let err = region
        .write_chunk_with(2, 2, &noise(10_000, 3), Compression::None)
        .unwrap_err();
    assert!(matches!(err, StoreError::ChunkSize { x: 2, z: 2, size: 10_005, limit: 8192 }));

    assert_eq!(region.extent(2, 2), before_extent);
    assert_eq!(region.timestamp(2, 2), before_timestamp);
    assert_eq!(fs::metadata(&path).unwrap().len(), before_len);
    assert_eq!(region.read_chunk(2, 2).unwrap(), b"original");
}

#[test]
fn test_sector_count_ceiling() {
    let (_temp, path) = setup_temp_region();
    let mut region = RegionFile::open_with(&path, unsynced()).unwrap();

    let fits = MAX_CHUNK_SECTORS as usize * SECTOR_BYTES - CHUNK_HEADER_SIZE;
    region.write_chunk_with(0, 0, &vec![1u8; fits], Compression::None).unwrap();
    assert_eq!(region.extent(0, 0).unwrap().count, MAX_CHUNK_SECTORS);

    let err = region
        .write_chunk_with(1, 0, &vec![1u8; fits + 1], Compression::None)
        .unwrap_err();
    assert!(matches!(err, StoreError::ChunkSize { .. }));
    assert!(!region.contains_chunk(1, 0));
}

// =============================================================================
// Allocation Tests
// =============================================================================

#[test]
fn test_allocator_never_overlaps() {
    let (_temp, path) = setup_temp_region();
    let mut region = RegionFile::open_with(&path, unsynced()).unwrap();

    // pseudo-random mix of growing, shrinking and deleted records
    let mut state: u32 = 0x1234_5678;
    let mut next = || {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        state
    };

    for step in 0..400 {
        let r = next();
        let x = (r % 12) as i32;
        let z = ((r >> 8) % 3) as i32;
        if r % 7 == 0 {
            region.delete_chunk(x, z).unwrap();
            assert!(!region.contains_chunk(x, z));
        } else {
            let len = 1 + ((r >> 12) % 20_000) as usize;
            let data = noise(len, step);
            region.write_chunk_with(x, z, &data, Compression::None).unwrap();
            assert_eq!(region.read_chunk(x, z).unwrap(), data);
        }
        assert_no_overlap(&region);
    }

    let used: u32 = region
        .chunk_positions()
        .into_iter()
        .filter_map(|(x, z)| region.extent(x, z))
        .map(|e| e.count)
        .sum();
    assert_eq!(region.used_sectors(), used + 2);

    // reopening rebuilds the same map
    let sectors = region.sector_count();
    let count = region.chunk_count();
    drop(region);
    let region = RegionFile::open(&path).unwrap();
    assert_eq!(region.sector_count(), sectors);
    assert_eq!(region.chunk_count(), count);
    assert_eq!(region.used_sectors(), used + 2);
    assert_no_overlap(&region);
}

#[test]
fn test_deleted_space_is_reused() {
    let (_temp, path) = setup_temp_region();
    let mut region = RegionFile::open_with(&path, unsynced()).unwrap();

    region.write_chunk_with(0, 0, &vec![0u8; 9000], Compression::None).unwrap();
    region.write_chunk_with(1, 0, &[1], Compression::None).unwrap();
    let file_sectors = region.sector_count();

    region.delete_chunk(0, 0).unwrap();
    assert_eq!(region.timestamp(0, 0), 0);
    region.write_chunk_with(2, 0, &vec![2u8; 5000], Compression::None).unwrap();

    assert_eq!(region.extent(2, 0).unwrap().sector, 2);
    assert_eq!(region.sector_count(), file_sectors);
}

#[test]
fn test_file_never_shrinks() {
    let (_temp, path) = setup_temp_region();
    let mut region = RegionFile::open_with(&path, unsynced()).unwrap();
    region.write_chunk_with(0, 0, &vec![0u8; 20_000], Compression::None).unwrap();
    let len = fs::metadata(&path).unwrap().len();

    region.delete_chunk(0, 0).unwrap();
    assert_eq!(fs::metadata(&path).unwrap().len(), len);
    assert_eq!(region.chunk_count(), 0);
}

// =============================================================================
// Damage Tests
// =============================================================================

#[test]
fn test_unaligned_file_is_padded() {
    let (_temp, path) = setup_temp_region();
    {
        let mut region = RegionFile::open(&path).unwrap();
        region.write_chunk_with(0, 0, b"abc", Compression::None).unwrap();
    }
    // chop the zero padding off the last sector
    let mut raw = fs::read(&path).unwrap();
    raw.truncate(HEADER_BYTES + 100);
    fs::write(&path, &raw).unwrap();

    let mut region = RegionFile::open(&path).unwrap();
    assert_eq!(fs::metadata(&path).unwrap().len() as usize, HEADER_BYTES + SECTOR_BYTES);
    assert_eq!(region.read_chunk(0, 0).unwrap(), b"abc");
}

#[test]
fn test_overlapping_slots_detected() {
    let (_temp, path) = setup_temp_region();
    {
        let mut region = RegionFile::open(&path).unwrap();
        region.write_chunk_with(0, 0, b"first", Compression::None).unwrap();
    }
    // point slot 1 at slot 0's sector
    let mut raw = fs::read(&path).unwrap();
    raw[4..8].copy_from_slice(&[0, 0, 2, 1]);
    fs::write(&path, &raw).unwrap();

    let mut region = RegionFile::open(&path).unwrap();
    assert!(region.is_damaged(1, 0));
    assert!(!region.is_damaged(0, 0));
    assert!(matches!(region.read_chunk(1, 0), Err(StoreError::RegionFormat(_))));

    // rewriting the damaged slot allocates fresh space and keeps slot 0 intact
    region.write_chunk_with(1, 0, b"second", Compression::None).unwrap();
    assert!(!region.is_damaged(1, 0));
    assert_eq!(region.read_chunk(0, 0).unwrap(), b"first");
    assert_eq!(region.read_chunk(1, 0).unwrap(), b"second");
}

#[test]
fn test_repair_clears_undecodable_records() {
    let (_temp, path) = setup_temp_region();
    let mut region = RegionFile::open_with(&path, unsynced()).unwrap();

    let good = nbt::encode("", &Tag::Compound(Compound::new())).unwrap();
    region.write_chunk(0, 0, &good).unwrap();
    region.write_chunk(1, 0, b"not a tag tree").unwrap();

    assert_eq!(region.repair().unwrap(), 1);
    assert!(region.contains_chunk(0, 0));
    assert!(!region.contains_chunk(1, 0));
    assert_eq!(region.repair().unwrap(), 0);
}

#[test]
fn test_record_inflating_past_cap_is_chunk_format_error() {
    let (_temp, path) = setup_temp_region();
    let mut region = RegionFile::open_with(&path, unsynced()).unwrap();

    let bomb = Compression::Zlib
        .compress(&vec![0u8; MAX_INFLATED_SIZE + 1])
        .unwrap();
    assert!(bomb.len() + CHUNK_HEADER_SIZE < SECTOR_BYTES * MAX_CHUNK_SECTORS as usize);
    region
        .write_chunk_compressed(2, 2, &bomb, Compression::Zlib)
        .unwrap();

    let err = region.read_chunk(2, 2).unwrap_err();
    assert!(matches!(err, StoreError::ChunkFormat(_)));
    assert_eq!(region.repair().unwrap(), 1);
    assert!(!region.contains_chunk(2, 2));
}
