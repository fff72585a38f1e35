//! Tests for the tag codec
//!
//! These tests verify:
//! - Every tag type survives encode → decode
//! - Gzip/zlib envelopes are detected on decode
//! - Malformed input fails with a format error, never a panic
//! - List element typing
//! - Randomly generated trees round-trip byte for byte

use voxelstore::nbt::{self, Compound, Compression, List, Tag, TagType, MAX_DEPTH};
use voxelstore::StoreError;

// =============================================================================
// Helper Functions
// =============================================================================

/// A compound using every tag type once
fn every_type() -> Tag {
    let mut inner = Compound::new();
    inner.insert("flag".to_string(), Tag::Byte(-1));

    let mut root = Compound::new();
    root.insert("byte".to_string(), Tag::Byte(-128));
    root.insert("short".to_string(), Tag::Short(-12345));
    root.insert("int".to_string(), Tag::Int(i32::MIN));
    root.insert("long".to_string(), Tag::Long(i64::MAX));
    root.insert("float".to_string(), Tag::Float(1.5));
    root.insert("double".to_string(), Tag::Double(-0.25));
    root.insert("bytes".to_string(), Tag::ByteArray(vec![0, 1, 255]));
    root.insert("string".to_string(), Tag::String("grüße".to_string()));
    root.insert(
        "list".to_string(),
        Tag::List(List::from_tags(vec![Tag::Short(1), Tag::Short(2)]).unwrap()),
    );
    root.insert("compound".to_string(), Tag::Compound(inner));
    root.insert("ints".to_string(), Tag::IntArray(vec![-1, 0, 1]));
    root.insert("longs".to_string(), Tag::LongArray(vec![i64::MIN, 7]));
    root.insert("empty".to_string(), Tag::List(List::new()));
    Tag::Compound(root)
}

fn nested_lists(depth: usize) -> Tag {
    let mut tag = Tag::Int(0);
    for _ in 0..depth {
        tag = Tag::List(List::from_tags(vec![tag]).unwrap());
    }
    tag
}

/// Small deterministic generator (xorshift64)
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn below(&mut self, n: u64) -> usize {
        (self.next() % n) as usize
    }
}

const PAYLOAD_TYPES: [TagType; 12] = [
    TagType::Byte,
    TagType::Short,
    TagType::Int,
    TagType::Long,
    TagType::Float,
    TagType::Double,
    TagType::ByteArray,
    TagType::String,
    TagType::List,
    TagType::Compound,
    TagType::IntArray,
    TagType::LongArray,
];

fn random_tag(rng: &mut Rng, ty: TagType, depth: usize) -> Tag {
    let len = rng.below(4);
    match ty {
        TagType::Byte => Tag::Byte(rng.next() as i8),
        TagType::Short => Tag::Short(rng.next() as i16),
        TagType::Int => Tag::Int(rng.next() as i32),
        TagType::Long => Tag::Long(rng.next() as i64),
        // integral values keep float equality well defined
        TagType::Float => Tag::Float(rng.next() as i16 as f32),
        TagType::Double => Tag::Double(rng.next() as i32 as f64 / 8.0),
        TagType::ByteArray => Tag::ByteArray((0..len * 3).map(|_| rng.next() as u8).collect()),
        TagType::String => {
            let words = ["", "a", "Level", "grüße", "雪", "x y z"];
            Tag::String(words[rng.below(words.len() as u64)].to_string())
        }
        TagType::IntArray => Tag::IntArray((0..len).map(|_| rng.next() as i32).collect()),
        TagType::LongArray => Tag::LongArray((0..len).map(|_| rng.next() as i64).collect()),
        TagType::List => Tag::List(random_list(rng, depth + 1)),
        TagType::Compound => Tag::Compound(random_compound(rng, depth + 1)),
        TagType::End => unreachable!("End has no payload"),
    }
}

/// Containers stop nesting after a few levels
fn random_type(rng: &mut Rng, depth: usize) -> TagType {
    // the first eight types are scalars, strings and byte arrays
    let choices = if depth >= 4 { 8 } else { PAYLOAD_TYPES.len() as u64 };
    PAYLOAD_TYPES[rng.below(choices)]
}

fn random_list(rng: &mut Rng, depth: usize) -> List {
    // one in eight lists is untyped and empty
    if rng.below(8) == 0 {
        return List::new();
    }
    let elem = random_type(rng, depth);
    let mut list = List::of(elem);
    for _ in 0..rng.below(4) {
        list.push(random_tag(rng, elem, depth)).unwrap();
    }
    list
}

fn random_compound(rng: &mut Rng, depth: usize) -> Compound {
    let mut compound = Compound::new();
    for i in 0..rng.below(6) {
        let ty = random_type(rng, depth);
        compound.insert(format!("k{}_{}", i, ty.name()), random_tag(rng, ty, depth));
    }
    compound
}

/// Every element type as an empty typed list, plus empty arrays
fn empty_containers() -> Tag {
    let mut root = Compound::new();
    for ty in PAYLOAD_TYPES {
        root.insert(format!("empty_{}", ty.name()), Tag::List(List::of(ty)));
    }
    root.insert("empty_untyped".to_string(), Tag::List(List::new()));
    root.insert("empty_bytes".to_string(), Tag::ByteArray(Vec::new()));
    root.insert("empty_ints".to_string(), Tag::IntArray(Vec::new()));
    root.insert("empty_longs".to_string(), Tag::LongArray(Vec::new()));
    root.insert("empty_compound".to_string(), Tag::Compound(Compound::new()));
    Tag::Compound(root)
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_every_type_round_trips() {
    let tag = every_type();
    let bytes = nbt::encode("root", &tag).unwrap();

    let (name, back) = nbt::decode(&bytes).unwrap();
    assert_eq!(name, "root");
    assert_eq!(back, tag);
}

#[test]
fn test_empty_containers_keep_their_types() {
    let tag = empty_containers();
    let bytes = nbt::encode("", &tag).unwrap();
    let (_, back) = nbt::decode(&bytes).unwrap();

    assert_eq!(back, tag);
    let root = back.as_compound().unwrap();
    for ty in PAYLOAD_TYPES {
        let list = root.get(&format!("empty_{}", ty.name())).unwrap().as_list().unwrap();
        assert_eq!(list.elem_type(), ty);
        assert!(list.is_empty());
    }
    assert_eq!(nbt::encode("", &back).unwrap(), bytes);
}

#[test]
fn test_generated_trees_round_trip() {
    let mut rng = Rng(0x5eed_1234_abcd_0001);
    for case in 0..300 {
        let tag = Tag::Compound(random_compound(&mut rng, 0));
        let name = format!("case{}", case);
        let compression = [Compression::None, Compression::Gzip, Compression::Zlib][case % 3];

        let bytes = nbt::encode_compressed(&name, &tag, compression).unwrap();
        let (back_name, back) = nbt::decode(&bytes).unwrap();
        assert_eq!(back_name, name);
        assert_eq!(back, tag, "case {}", case);
        assert_eq!(
            nbt::encode(&name, &back).unwrap(),
            nbt::encode(&name, &tag).unwrap(),
            "case {}",
            case
        );
    }
}

#[test]
fn test_compound_order_preserved() {
    let tag = every_type();
    let (_, back) = nbt::decode(&nbt::encode("", &tag).unwrap()).unwrap();

    let keys: Vec<&str> = back.as_compound().unwrap().keys().map(|k| k.as_str()).collect();
    assert_eq!(
        keys,
        vec![
            "byte", "short", "int", "long", "float", "double", "bytes", "string", "list",
            "compound", "ints", "longs", "empty"
        ]
    );
}

#[test]
fn test_enveloped_round_trips() {
    let tag = every_type();
    for compression in [Compression::Gzip, Compression::Zlib] {
        let bytes = nbt::encode_compressed("level", &tag, compression).unwrap();
        assert_eq!(Compression::detect(&bytes), compression);

        let (name, back) = nbt::decode(&bytes).unwrap();
        assert_eq!(name, "level");
        assert_eq!(back, tag);
    }
}

#[test]
fn test_non_compound_root() {
    let bytes = nbt::encode("n", &Tag::Int(7)).unwrap();
    assert_eq!(bytes, vec![3, 0, 1, b'n', 0, 0, 0, 7]);
    assert_eq!(nbt::decode(&bytes).unwrap(), ("n".to_string(), Tag::Int(7)));
}

#[test]
fn test_depth_at_limit_accepted() {
    let tag = nested_lists(MAX_DEPTH);
    let bytes = nbt::encode("", &tag).unwrap();
    assert_eq!(nbt::decode(&bytes).unwrap().1, tag);
}

// =============================================================================
// Malformed Input Tests
// =============================================================================

#[test]
fn test_every_truncation_is_format_error() {
    let bytes = nbt::encode("root", &every_type()).unwrap();
    for len in 0..bytes.len() {
        let err = nbt::decode_uncompressed(&bytes[..len]).unwrap_err();
        assert!(err.is_format_error(), "prefix of {} bytes: {}", len, err);
    }
}

#[test]
fn test_trailing_bytes_rejected() {
    let mut bytes = nbt::encode("", &Tag::Byte(1)).unwrap();
    bytes.push(0);
    assert!(nbt::decode(&bytes).unwrap_err().is_format_error());
}

#[test]
fn test_unknown_type_id_rejected() {
    let err = nbt::decode(&[13, 0, 0]).unwrap_err();
    assert!(matches!(err, StoreError::Format(msg) if msg.contains("0x0d")));
}

#[test]
fn test_end_root_rejected() {
    assert!(nbt::decode(&[0]).unwrap_err().is_format_error());
}

#[test]
fn test_negative_array_length_rejected() {
    // ByteArray "" with length -1
    let bytes = [7, 0, 0, 0xff, 0xff, 0xff, 0xff];
    assert!(nbt::decode(&bytes).unwrap_err().is_format_error());
}

#[test]
fn test_list_of_end_with_elements_rejected() {
    // List "" of End, 2 elements
    let bytes = [9, 0, 0, 0, 0, 0, 0, 2];
    assert!(nbt::decode(&bytes).unwrap_err().is_format_error());
}

#[test]
fn test_duplicate_compound_key_rejected() {
    let bytes = [10, 0, 0, 1, 0, 1, b'a', 5, 1, 0, 1, b'a', 6, 0];
    assert!(nbt::decode(&bytes).unwrap_err().is_format_error());
}

#[test]
fn test_invalid_utf8_rejected() {
    let bytes = [8, 0, 0, 0, 2, 0xc3, 0x28];
    assert!(nbt::decode(&bytes).unwrap_err().is_format_error());
}

#[test]
fn test_corrupt_envelope_rejected() {
    let mut bytes = nbt::encode_compressed("", &every_type(), Compression::Gzip).unwrap();
    let mid = bytes.len() / 2;
    bytes.truncate(mid);
    assert!(nbt::decode(&bytes).unwrap_err().is_format_error());
}

#[test]
fn test_too_deep_rejected() {
    let tag = nested_lists(MAX_DEPTH + 1);
    assert!(nbt::encode("", &tag).unwrap_err().is_format_error());

    // the same tree written by hand: MAX_DEPTH + 1 lists around an Int
    let mut bytes = vec![0x09, 0x00, 0x00];
    for _ in 0..MAX_DEPTH {
        bytes.extend_from_slice(&[0x09, 0x00, 0x00, 0x00, 0x01]);
    }
    bytes.extend_from_slice(&[0x03, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]);
    assert!(nbt::decode(&bytes).unwrap_err().is_format_error());
}

// =============================================================================
// List Typing Tests
// =============================================================================

#[test]
fn test_list_rejects_mixed_types() {
    let mut list = List::of(TagType::Int);
    list.push(Tag::Int(1)).unwrap();

    let err = list.push(Tag::Long(2)).unwrap_err();
    assert!(matches!(
        err,
        StoreError::TagType {
            expected: "Int",
            found: "Long"
        }
    ));
    assert_eq!(list.len(), 1);
}

#[test]
fn test_untyped_list_takes_first_type() {
    let mut list = List::new();
    assert_eq!(list.elem_type(), TagType::End);
    list.push(Tag::String("a".into())).unwrap();
    assert_eq!(list.elem_type(), TagType::String);
    assert!(list.set(0, Tag::Byte(1)).is_err());
    assert!(List::from_tags(vec![Tag::Byte(1), Tag::Short(1)]).is_err());
}
