//! Tagged-Tree Module
//!
//! The self-describing record format every chunk is persisted in.
//!
//! ## Responsibilities
//! - Closed `Tag` type covering every node kind
//! - Homogeneous lists, insertion-ordered compounds
//! - Binary encode/decode (big-endian)
//! - Optional gzip/zlib envelope around a whole stream
//!
//! ## Stream Format
//! ```text
//! ┌──────────┬────────────────────────┬──────────────────────┐
//! │ Type (1) │ Name (u16 len + UTF-8) │ Payload (by type)    │
//! └──────────┴────────────────────────┴──────────────────────┘
//! ```
//!
//! ### Payload by Type
//! - Byte/Short/Int/Long/Float/Double: fixed width
//! - ByteArray/IntArray/LongArray: i32 count + elements
//! - String: u16 length + UTF-8
//! - List: element type (1) + i32 count + payloads
//! - Compound: (type, name, payload)* terminated by End (0x00)

mod codec;
mod compression;
mod tag;

pub use codec::{decode, decode_uncompressed, encode, encode_compressed, MAX_DEPTH};
pub use compression::{Compression, MAX_INFLATED_SIZE};
pub use tag::{Compound, List, Tag, TagType};
