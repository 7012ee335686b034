//! Frame primitives shared by every value layout.
//!
//! All multi-byte quantities are big-endian:
//!
//! ```text
//! +---------+----------+----------+----------+-------------------------+
//! | i32/u32 | i64      | f32      | f64      | string                  |
//! | 4 bytes | 8 bytes  | 4 bytes  | 8 bytes  | u32 units + units * u16 |
//! +---------+----------+----------+----------+-------------------------+
//! ```
//!
//! Writing goes through [`bytes::BufMut`]; reading goes through the
//! [`WireRead`] extension trait over any [`std::io::Read`], so values can be
//! decoded straight off a socket without buffering a whole response.

use crate::error::ProtocolError;
use crate::MAX_LENGTH;
use bytes::BufMut;
use std::io::{ErrorKind, Read};

/// Extension methods for writing frame primitives.
pub trait WireWrite: BufMut {
    /// Writes a length-prefixed UTF-16 string.
    fn put_wire_string(&mut self, s: &str) {
        let units: Vec<u16> = s.encode_utf16().collect();
        self.put_u32(units.len() as u32);
        for unit in units {
            self.put_u16(unit);
        }
    }

    /// Writes a length-prefixed byte sequence.
    fn put_wire_bytes(&mut self, bytes: &[u8]) {
        self.put_u32(bytes.len() as u32);
        self.put_slice(bytes);
    }

    fn put_wire_bool(&mut self, value: bool) {
        self.put_u8(u8::from(value));
    }
}

impl<B: BufMut + ?Sized> WireWrite for B {}

/// Extension methods for reading frame primitives.
pub trait WireRead: Read {
    fn read_exact_wire(&mut self, buf: &mut [u8]) -> Result<(), ProtocolError> {
        self.read_exact(buf).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                ProtocolError::UnexpectedEnd
            } else {
                ProtocolError::Io(e)
            }
        })
    }

    fn read_u8_wire(&mut self) -> Result<u8, ProtocolError> {
        let mut buf = [0u8; 1];
        self.read_exact_wire(&mut buf)?;
        Ok(buf[0])
    }

    fn read_bool_wire(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_u8_wire()? != 0)
    }

    fn read_i32_wire(&mut self) -> Result<i32, ProtocolError> {
        let mut buf = [0u8; 4];
        self.read_exact_wire(&mut buf)?;
        Ok(i32::from_be_bytes(buf))
    }

    fn read_u32_wire(&mut self) -> Result<u32, ProtocolError> {
        let mut buf = [0u8; 4];
        self.read_exact_wire(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    fn read_i64_wire(&mut self) -> Result<i64, ProtocolError> {
        let mut buf = [0u8; 8];
        self.read_exact_wire(&mut buf)?;
        Ok(i64::from_be_bytes(buf))
    }

    fn read_f32_wire(&mut self) -> Result<f32, ProtocolError> {
        let mut buf = [0u8; 4];
        self.read_exact_wire(&mut buf)?;
        Ok(f32::from_be_bytes(buf))
    }

    fn read_f64_wire(&mut self) -> Result<f64, ProtocolError> {
        let mut buf = [0u8; 8];
        self.read_exact_wire(&mut buf)?;
        Ok(f64::from_be_bytes(buf))
    }

    /// Reads an `i32` count and validates it as a collection length.
    fn read_count_wire(&mut self) -> Result<usize, ProtocolError> {
        let count = self.read_i32_wire()?;
        checked_length(i64::from(count))
    }

    /// Reads a length-prefixed UTF-16 string.
    fn read_string_wire(&mut self) -> Result<String, ProtocolError> {
        let len = checked_length(i64::from(self.read_u32_wire()?))?;
        let mut raw = vec![0u8; len * 2];
        self.read_exact_wire(&mut raw)?;
        utf16_be_to_string(&raw)
    }

    /// Reads a length-prefixed byte sequence.
    fn read_bytes_wire(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let len = checked_length(i64::from(self.read_u32_wire()?))?;
        let mut raw = vec![0u8; len];
        self.read_exact_wire(&mut raw)?;
        Ok(raw)
    }
}

impl<R: Read + ?Sized> WireRead for R {}

/// Validates a length read off the wire before anything is allocated for it.
pub fn checked_length(len: i64) -> Result<usize, ProtocolError> {
    if len < 0 || len > MAX_LENGTH as i64 {
        return Err(ProtocolError::LengthOutOfRange(len));
    }
    Ok(len as usize)
}

/// Encodes a string as big-endian UTF-16 code units without a length prefix.
pub fn string_to_utf16_be(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len() * 2);
    for unit in s.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    out
}

/// Decodes big-endian UTF-16 code units into a string.
pub fn utf16_be_to_string(raw: &[u8]) -> Result<String, ProtocolError> {
    if raw.len() % 2 != 0 {
        return Err(ProtocolError::InvalidUtf16);
    }
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| ProtocolError::InvalidUtf16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use std::io::Cursor;

    #[test]
    fn test_string_layout() {
        let mut buf = BytesMut::new();
        buf.put_wire_string("ab");
        assert_eq!(&buf[..], &[0, 0, 0, 2, 0, b'a', 0, b'b']);
    }

    #[test]
    fn test_string_counts_code_units() {
        // U+1F600 is a surrogate pair: two code units.
        let mut buf = BytesMut::new();
        buf.put_wire_string("\u{1F600}");
        assert_eq!(&buf[..4], &[0, 0, 0, 2]);
        assert_eq!(buf.len(), 8);

        let decoded = Cursor::new(buf.to_vec()).read_string_wire().unwrap();
        assert_eq!(decoded, "\u{1F600}");
    }

    #[test]
    fn test_lone_surrogate_rejected() {
        let raw = [0, 0, 0, 1, 0xD8, 0x00];
        let result = Cursor::new(raw.to_vec()).read_string_wire();
        assert!(matches!(result, Err(ProtocolError::InvalidUtf16)));
    }

    #[test]
    fn test_truncated_input() {
        let result = Cursor::new(vec![0, 0, 1]).read_i32_wire();
        assert!(matches!(result, Err(ProtocolError::UnexpectedEnd)));
    }

    #[test]
    fn test_negative_count_rejected() {
        let result = Cursor::new((-1i32).to_be_bytes().to_vec()).read_count_wire();
        assert!(matches!(result, Err(ProtocolError::LengthOutOfRange(-1))));
    }

    #[test]
    fn test_numeric_primitives() {
        let mut buf = BytesMut::new();
        buf.put_i32(-7);
        buf.put_i64(1 << 40);
        buf.put_f32(1.5);
        buf.put_f64(-2.25);
        buf.put_wire_bool(true);

        let mut cursor = Cursor::new(buf.to_vec());
        assert_eq!(cursor.read_i32_wire().unwrap(), -7);
        assert_eq!(cursor.read_i64_wire().unwrap(), 1 << 40);
        assert_eq!(cursor.read_f32_wire().unwrap(), 1.5);
        assert_eq!(cursor.read_f64_wire().unwrap(), -2.25);
        assert!(cursor.read_bool_wire().unwrap());
    }
}
