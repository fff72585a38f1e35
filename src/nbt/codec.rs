//! Tag codec
//!
//! Encoding and decoding of tag trees. All multi-byte fields are big-endian.

use bytes::{Buf, BufMut};

use crate::error::{Result, StoreError};

use super::{Compound, Compression, List, Tag, TagType};

/// Deepest list/compound nesting accepted by the encoder and decoder
pub const MAX_DEPTH: usize = 512;

// =============================================================================
// Encoding
// =============================================================================

/// Encode a named root tag without any envelope
///
/// Fails on trees nested deeper than `MAX_DEPTH`, which `decode` would reject.
pub fn encode(name: &str, tag: &Tag) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.put_u8(tag.tag_type().id());
    put_string(&mut buf, name)?;
    put_payload(&mut buf, tag, 0)?;
    Ok(buf)
}

/// Encode a named root tag and wrap it in `compression`
pub fn encode_compressed(name: &str, tag: &Tag, compression: Compression) -> Result<Vec<u8>> {
    let raw = encode(name, tag)?;
    compression
        .compress(&raw)
        .map_err(|e| StoreError::Format(format!("{} compression failed: {}", compression, e)))
}

fn put_string(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    let len = u16::try_from(s.len()).map_err(|_| {
        StoreError::Format(format!("string of {} bytes exceeds u16 length", s.len()))
    })?;
    buf.put_u16(len);
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn put_len(buf: &mut Vec<u8>, len: usize) -> Result<()> {
    let len = i32::try_from(len)
        .map_err(|_| StoreError::Format(format!("length {} exceeds i32", len)))?;
    buf.put_i32(len);
    Ok(())
}

fn put_payload(buf: &mut Vec<u8>, tag: &Tag, depth: usize) -> Result<()> {
    match tag {
        Tag::Byte(v) => buf.put_i8(*v),
        Tag::Short(v) => buf.put_i16(*v),
        Tag::Int(v) => buf.put_i32(*v),
        Tag::Long(v) => buf.put_i64(*v),
        Tag::Float(v) => buf.put_f32(*v),
        Tag::Double(v) => buf.put_f64(*v),
        Tag::ByteArray(bytes) => {
            put_len(buf, bytes.len())?;
            buf.put_slice(bytes);
        }
        Tag::String(s) => put_string(buf, s)?,
        Tag::List(list) => {
            check_depth(depth + 1)?;
            buf.put_u8(list.elem_type().id());
            put_len(buf, list.len())?;
            for item in list {
                put_payload(buf, item, depth + 1)?;
            }
        }
        Tag::Compound(compound) => {
            check_depth(depth + 1)?;
            for (name, child) in compound {
                buf.put_u8(child.tag_type().id());
                put_string(buf, name)?;
                put_payload(buf, child, depth + 1)?;
            }
            buf.put_u8(TagType::End.id());
        }
        Tag::IntArray(values) => {
            put_len(buf, values.len())?;
            for v in values {
                buf.put_i32(*v);
            }
        }
        Tag::LongArray(values) => {
            put_len(buf, values.len())?;
            for v in values {
                buf.put_i64(*v);
            }
        }
    }
    Ok(())
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a named root tag, reversing a gzip/zlib envelope if present
pub fn decode(bytes: &[u8]) -> Result<(String, Tag)> {
    match Compression::detect(bytes) {
        Compression::None => decode_uncompressed(bytes),
        compression => {
            let raw = compression.decompress(bytes).map_err(|e| {
                StoreError::Format(format!("{} envelope is corrupt: {}", compression, e))
            })?;
            decode_uncompressed(&raw)
        }
    }
}

/// Decode a named root tag from raw (unenveloped) bytes
pub fn decode_uncompressed(bytes: &[u8]) -> Result<(String, Tag)> {
    let mut reader = Reader { buf: bytes };

    let ty = reader.tag_type()?;
    if ty == TagType::End {
        return Err(StoreError::Format("root tag cannot be End".to_string()));
    }
    let name = reader.string()?;
    let tag = reader.payload(ty, 0)?;

    if reader.buf.has_remaining() {
        return Err(StoreError::Format(format!(
            "{} trailing bytes after root tag",
            reader.buf.remaining()
        )));
    }

    Ok((name, tag))
}

/// Bounds-checked view over the input
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn need(&self, n: usize, what: &str) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(StoreError::Format(format!(
                "truncated {}: need {} bytes, {} remaining",
                what,
                n,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    fn tag_type(&mut self) -> Result<TagType> {
        self.need(1, "type id")?;
        let id = self.buf.get_u8();
        TagType::from_id(id)
            .ok_or_else(|| StoreError::Format(format!("unknown tag type 0x{:02x}", id)))
    }

    fn string(&mut self) -> Result<String> {
        self.need(2, "string length")?;
        let len = self.buf.get_u16() as usize;
        self.need(len, "string")?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        String::from_utf8(head.to_vec())
            .map_err(|e| StoreError::Format(format!("string is not UTF-8: {}", e)))
    }

    /// Read an i32 count and check `count * elem_size` bytes are available
    fn count(&mut self, elem_size: usize, what: &str) -> Result<usize> {
        self.need(4, what)?;
        let len = self.buf.get_i32();
        if len < 0 {
            return Err(StoreError::Format(format!("negative {} length {}", what, len)));
        }
        let len = len as usize;
        let bytes = len.checked_mul(elem_size).ok_or_else(|| {
            StoreError::Format(format!("{} length {} overflows", what, len))
        })?;
        self.need(bytes, what)?;
        Ok(len)
    }

    fn payload(&mut self, ty: TagType, depth: usize) -> Result<Tag> {
        let tag = match ty {
            TagType::End => {
                return Err(StoreError::Format("unexpected End tag".to_string()));
            }
            TagType::Byte => {
                self.need(1, "Byte")?;
                Tag::Byte(self.buf.get_i8())
            }
            TagType::Short => {
                self.need(2, "Short")?;
                Tag::Short(self.buf.get_i16())
            }
            TagType::Int => {
                self.need(4, "Int")?;
                Tag::Int(self.buf.get_i32())
            }
            TagType::Long => {
                self.need(8, "Long")?;
                Tag::Long(self.buf.get_i64())
            }
            TagType::Float => {
                self.need(4, "Float")?;
                Tag::Float(self.buf.get_f32())
            }
            TagType::Double => {
                self.need(8, "Double")?;
                Tag::Double(self.buf.get_f64())
            }
            TagType::ByteArray => {
                let len = self.count(1, "ByteArray")?;
                let (head, tail) = self.buf.split_at(len);
                self.buf = tail;
                Tag::ByteArray(head.to_vec())
            }
            TagType::String => Tag::String(self.string()?),
            TagType::List => Tag::List(self.list(depth + 1)?),
            TagType::Compound => Tag::Compound(self.compound(depth + 1)?),
            TagType::IntArray => {
                let len = self.count(4, "IntArray")?;
                Tag::IntArray((0..len).map(|_| self.buf.get_i32()).collect())
            }
            TagType::LongArray => {
                let len = self.count(8, "LongArray")?;
                Tag::LongArray((0..len).map(|_| self.buf.get_i64()).collect())
            }
        };
        Ok(tag)
    }

    fn list(&mut self, depth: usize) -> Result<List> {
        check_depth(depth)?;
        self.need(1, "list element type")?;
        let id = self.buf.get_u8();
        let elem_type = TagType::from_id(id).ok_or_else(|| {
            StoreError::Format(format!("unknown list element type 0x{:02x}", id))
        })?;
        let len = self.count(elem_type.min_payload_size(), "List")?;

        if elem_type == TagType::End && len > 0 {
            return Err(StoreError::Format(format!(
                "list of End declares {} elements",
                len
            )));
        }

        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(self.payload(elem_type, depth)?);
        }
        Ok(List::from_raw(elem_type, items))
    }

    fn compound(&mut self, depth: usize) -> Result<Compound> {
        check_depth(depth)?;
        let mut compound = Compound::new();
        loop {
            let ty = self.tag_type()?;
            if ty == TagType::End {
                return Ok(compound);
            }
            let name = self.string()?;
            let child = self.payload(ty, depth)?;
            if compound.insert(name.clone(), child).is_some() {
                return Err(StoreError::Format(format!(
                    "duplicate compound key {:?}",
                    name
                )));
            }
        }
    }
}

fn check_depth(depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(StoreError::Format(format!(
            "nesting deeper than {} levels",
            MAX_DEPTH
        )));
    }
    Ok(())
}
