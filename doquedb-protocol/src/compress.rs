//! Optional payload compression for strings and binaries.
//!
//! Wire layout after the tag:
//!
//! ```text
//! +------------------+-------------+--------------------+
//! | uncompressed_len | stored_len  | stored bytes       |
//! | i32              | i32         | stored_len bytes   |
//! +------------------+-------------+--------------------+
//! ```
//!
//! Payloads longer than [`COMPRESSION_THRESHOLD`] are deflated (zlib
//! framing) and kept compressed only when that makes them smaller. Equal
//! lengths mean the bytes were stored verbatim.

use crate::error::ProtocolError;
use crate::frame::{checked_length, WireRead};
use bytes::BufMut;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use std::sync::OnceLock;

/// Payloads at or below this many bytes are never compressed.
pub const COMPRESSION_THRESHOLD: usize = 1024;

/// A string or binary payload as carried by the compressed tags.
///
/// Inflation is deferred until the bytes are first asked for.
#[derive(Debug)]
pub struct CompressedPayload {
    uncompressed_len: usize,
    stored: Vec<u8>,
    inflated: OnceLock<Vec<u8>>,
}

impl CompressedPayload {
    /// Builds the payload for `raw`, compressing it when worthwhile.
    pub fn compress(raw: &[u8]) -> Result<Self, ProtocolError> {
        if raw.len() > COMPRESSION_THRESHOLD {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(raw).map_err(ProtocolError::Compression)?;
            let deflated = encoder.finish().map_err(ProtocolError::Compression)?;
            if deflated.len() < raw.len() {
                return Ok(Self {
                    uncompressed_len: raw.len(),
                    stored: deflated,
                    inflated: OnceLock::new(),
                });
            }
        }
        Ok(Self::verbatim(raw.to_vec()))
    }

    fn verbatim(raw: Vec<u8>) -> Self {
        Self {
            uncompressed_len: raw.len(),
            stored: raw,
            inflated: OnceLock::new(),
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.stored.len() != self.uncompressed_len
    }

    pub fn uncompressed_len(&self) -> usize {
        self.uncompressed_len
    }

    pub fn stored_len(&self) -> usize {
        self.stored.len()
    }

    pub fn is_inflated(&self) -> bool {
        self.inflated.get().is_some()
    }

    /// Returns the uncompressed bytes, inflating them on first access.
    pub fn get(&self) -> Result<&[u8], ProtocolError> {
        if !self.is_compressed() {
            return Ok(&self.stored);
        }
        if let Some(bytes) = self.inflated.get() {
            return Ok(bytes);
        }
        let bytes = self.inflate()?;
        Ok(self.inflated.get_or_init(|| bytes))
    }

    /// Consumes the payload, returning the uncompressed bytes.
    pub fn into_bytes(mut self) -> Result<Vec<u8>, ProtocolError> {
        if !self.is_compressed() {
            return Ok(self.stored);
        }
        match self.inflated.take() {
            Some(bytes) => Ok(bytes),
            None => self.inflate(),
        }
    }

    fn inflate(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut out = Vec::with_capacity(self.uncompressed_len);
        ZlibDecoder::new(&self.stored[..])
            .read_to_end(&mut out)
            .map_err(ProtocolError::Compression)?;
        if out.len() != self.uncompressed_len {
            return Err(ProtocolError::Compression(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "inflated {} bytes, expected {}",
                    out.len(),
                    self.uncompressed_len
                ),
            )));
        }
        Ok(out)
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_i32(self.uncompressed_len as i32);
        buf.put_i32(self.stored.len() as i32);
        buf.put_slice(&self.stored);
    }

    pub fn decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, ProtocolError> {
        let uncompressed_len = checked_length(i64::from(reader.read_i32_wire()?))?;
        let stored_len = checked_length(i64::from(reader.read_i32_wire()?))?;
        let mut stored = vec![0u8; stored_len];
        reader.read_exact_wire(&mut stored)?;
        Ok(Self {
            uncompressed_len,
            stored,
            inflated: OnceLock::new(),
        })
    }
}
