//! Encoder and decoder for tagged values.
//!
//! Decoding reads the tag, then dispatches to the layout for that tag. The
//! dispatch table is the exhaustive `match` in [`decode_body`]; adding a tag
//! without a layout does not compile.

use crate::compress::CompressedPayload;
use crate::datetime::{Date, DateTime};
use crate::decimal::Decimal;
use crate::error::ProtocolError;
use crate::exception::ExceptionInfo;
use crate::frame::{checked_length, string_to_utf16_be, utf16_be_to_string, WireRead};
use crate::locale::LocaleTagSet;
use crate::message::{ErrorLevel, Request, Status};
use crate::meta::{ColumnMeta, ResultSetMeta};
use crate::tag::Tag;
use crate::value::Value;
use crate::word::Word;
use bytes::{BufMut, BytesMut};
use std::io::Read;

/// Encodes values, optionally compressing large string and binary payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct Encoder {
    compression: bool,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends strings and binaries under the compressed tags.
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    pub fn compression(&self) -> bool {
        self.compression
    }

    /// Appends one tagged value to `buf`.
    pub fn encode(&self, value: &Value, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        if !self.compression {
            value.encode(buf);
            return Ok(());
        }
        match value {
            Value::String(s) => {
                let payload = CompressedPayload::compress(&string_to_utf16_be(s))?;
                buf.put_i32(Tag::CompressedString.code());
                payload.encode(buf);
            }
            Value::Binary(bytes) => {
                let payload = CompressedPayload::compress(bytes)?;
                buf.put_i32(Tag::CompressedBinary.code());
                payload.encode(buf);
            }
            Value::Array(values) => {
                buf.put_i32(Tag::DataArray.code());
                buf.put_i32(values.len() as i32);
                for v in values {
                    self.encode(v, buf)?;
                }
            }
            other => other.encode(buf),
        }
        Ok(())
    }

    /// Appends the end-of-data marker.
    pub fn encode_end_of_data(&self, buf: &mut BytesMut) {
        buf.put_i32(Tag::None.code());
    }
}

/// Reads one value. Returns `None` at the end-of-data marker.
pub fn decode<R: Read + ?Sized>(reader: &mut R) -> Result<Option<Value>, ProtocolError> {
    let tag = Tag::try_from(reader.read_i32_wire()?)?;
    if tag == Tag::None {
        return Ok(None);
    }
    decode_body(tag, reader).map(Some)
}

/// Reads one value into `dest`, reusing its allocation when the incoming
/// value has the same shape. Returns `false` at the end-of-data marker, in
/// which case `dest` is left untouched.
pub fn decode_into<R: Read + ?Sized>(
    reader: &mut R,
    dest: &mut Value,
) -> Result<bool, ProtocolError> {
    let tag = Tag::try_from(reader.read_i32_wire()?)?;
    if tag == Tag::None {
        return Ok(false);
    }
    decode_body_into(tag, reader, dest)?;
    Ok(true)
}

fn decode_body_into<R: Read + ?Sized>(
    tag: Tag,
    reader: &mut R,
    dest: &mut Value,
) -> Result<(), ProtocolError> {
    match (tag, dest) {
        (Tag::DataArray, Value::Array(elements)) => {
            let count = reader.read_count_wire()?;
            elements.truncate(count);
            let reused = elements.len();
            for element in elements.iter_mut() {
                let element_tag = Tag::try_from(reader.read_i32_wire()?)?;
                decode_element_into(element_tag, reader, element)?;
            }
            for _ in reused..count {
                let element_tag = Tag::try_from(reader.read_i32_wire()?)?;
                elements.push(decode_element(element_tag, reader)?);
            }
        }
        (Tag::String, Value::String(s)) => {
            let len = checked_length(i64::from(reader.read_u32_wire()?))?;
            let mut raw = vec![0u8; len * 2];
            reader.read_exact_wire(&mut raw)?;
            s.clear();
            s.push_str(&utf16_be_to_string(&raw)?);
        }
        (Tag::Binary, Value::Binary(bytes)) => {
            let len = checked_length(i64::from(reader.read_u32_wire()?))?;
            bytes.resize(len, 0);
            reader.read_exact_wire(bytes)?;
        }
        (tag, dest) => *dest = decode_body(tag, reader)?,
    }
    Ok(())
}

fn decode_element<R: Read + ?Sized>(tag: Tag, reader: &mut R) -> Result<Value, ProtocolError> {
    if tag == Tag::None {
        return Ok(Value::Null);
    }
    decode_body(tag, reader)
}

fn decode_element_into<R: Read + ?Sized>(
    tag: Tag,
    reader: &mut R,
    dest: &mut Value,
) -> Result<(), ProtocolError> {
    if tag == Tag::None {
        *dest = Value::Null;
        return Ok(());
    }
    decode_body_into(tag, reader, dest)
}

/// Reads the layout for `tag`. `tag` must not be [`Tag::None`].
pub fn decode_body<R: Read + ?Sized>(tag: Tag, reader: &mut R) -> Result<Value, ProtocolError> {
    Ok(match tag {
        Tag::None => {
            return Err(ProtocolError::UnexpectedType {
                expected: "value",
                actual: Tag::None.name(),
            })
        }
        Tag::Status => Value::Status(Status::try_from(reader.read_i32_wire()?)?),
        Tag::Request => Value::Request(Request::try_from(reader.read_i32_wire()?)?),
        Tag::ErrorLevel => Value::ErrorLevel(ErrorLevel::try_from(reader.read_i32_wire()?)?),
        Tag::Integer => Value::Integer(reader.read_i32_wire()?),
        Tag::Integer64 => Value::Integer64(reader.read_i64_wire()?),
        Tag::Float => Value::Float(reader.read_f32_wire()?),
        Tag::Double => Value::Double(reader.read_f64_wire()?),
        Tag::Decimal => Value::Decimal(Decimal::decode(reader)?),
        Tag::String => Value::String(reader.read_string_wire()?),
        Tag::Binary => Value::Binary(reader.read_bytes_wire()?),
        Tag::CompressedString => {
            let raw = CompressedPayload::decode(reader)?.into_bytes()?;
            Value::String(utf16_be_to_string(&raw)?)
        }
        Tag::CompressedBinary => Value::Binary(CompressedPayload::decode(reader)?.into_bytes()?),
        Tag::Date => Value::Date(Date::decode(reader)?),
        Tag::DateTime => Value::DateTime(DateTime::decode(reader)?),
        Tag::LocaleTagSet => Value::LocaleTagSet(LocaleTagSet::decode(reader)?),
        Tag::Word => Value::Word(Word::decode(reader)?),
        Tag::Null => Value::Null,
        Tag::DataArray => {
            let count = reader.read_count_wire()?;
            let mut values = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                let element_tag = Tag::try_from(reader.read_i32_wire()?)?;
                values.push(decode_element(element_tag, reader)?);
            }
            Value::Array(values)
        }
        Tag::IntegerArray => {
            let count = reader.read_count_wire()?;
            let mut values = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                values.push(reader.read_i32_wire()?);
            }
            Value::IntegerArray(values)
        }
        Tag::StringArray => {
            let count = reader.read_count_wire()?;
            let mut values = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                values.push(reader.read_string_wire()?);
            }
            Value::StringArray(values)
        }
        Tag::ColumnMeta => Value::ColumnMeta(ColumnMeta::decode(reader)?),
        Tag::ResultSetMeta => Value::ResultSetMeta(ResultSetMeta::decode(reader)?),
        Tag::ExceptionInfo => Value::ExceptionInfo(ExceptionInfo::decode(reader)?),
    })
}
