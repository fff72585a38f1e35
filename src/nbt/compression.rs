//! Compression envelope
//!
//! One-byte compression ids shared by whole-stream envelopes and region
//! extents.

use std::io::{self, ErrorKind, Read, Write};

use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression as Level;

/// Largest stream `decompress` will inflate to
pub const MAX_INFLATED_SIZE: usize = 32 * 1024 * 1024;

/// Compression applied to an encoded stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Compression {
    Gzip = 1,
    Zlib = 2,
    None = 3,
}

impl Compression {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Compression::Gzip),
            2 => Some(Compression::Zlib),
            3 => Some(Compression::None),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    /// Identify the envelope of a stream from its leading bytes
    ///
    /// gzip starts `1f 8b`; a zlib header is `78 xx` with the 16-bit
    /// header divisible by 31. Anything else is taken as raw.
    pub fn detect(bytes: &[u8]) -> Self {
        match bytes {
            [0x1f, 0x8b, ..] => Compression::Gzip,
            [cmf @ 0x78, flg, ..] if (u16::from(*cmf) << 8 | u16::from(*flg)) % 31 == 0 => {
                Compression::Zlib
            }
            _ => Compression::None,
        }
    }

    pub fn compress(self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        match self {
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Level::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            Compression::Zlib => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Level::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            Compression::None => Ok(data.to_vec()),
        }
    }

    /// Inflate up to `MAX_INFLATED_SIZE` bytes
    pub fn decompress(self, data: &[u8]) -> io::Result<Vec<u8>> {
        self.decompress_limited(data, MAX_INFLATED_SIZE)
    }

    /// Inflate, failing with `InvalidData` once the output passes `limit`
    pub fn decompress_limited(self, data: &[u8], limit: usize) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        let cap = limit as u64 + 1;
        match self {
            Compression::Gzip => {
                GzDecoder::new(data).take(cap).read_to_end(&mut out)?;
            }
            Compression::Zlib => {
                ZlibDecoder::new(data).take(cap).read_to_end(&mut out)?;
            }
            Compression::None => {
                data.take(cap).read_to_end(&mut out)?;
            }
        }
        if out.len() > limit {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                format!("{} stream inflates past {} bytes", self, limit),
            ));
        }
        Ok(out)
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Compression::Gzip => "gzip",
            Compression::Zlib => "zlib",
            Compression::None => "none",
        };
        f.write_str(name)
    }
}
