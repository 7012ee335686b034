//! The closed set of wire values.

use crate::datetime::{Date, DateTime};
use crate::decimal::Decimal;
use crate::error::ProtocolError;
use crate::exception::ExceptionInfo;
use crate::frame::WireWrite;
use crate::locale::LocaleTagSet;
use crate::message::{ErrorLevel, Request, Status};
use crate::meta::{ColumnMeta, ResultSetMeta};
use crate::tag::Tag;
use crate::word::Word;
use bytes::BufMut;
use serde::ser::{Serialize, SerializeSeq, Serializer};
use std::fmt;

/// A tagged wire value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Status(Status),
    Request(Request),
    Integer(i32),
    Integer64(i64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    String(String),
    Binary(Vec<u8>),
    Date(Date),
    DateTime(DateTime),
    LocaleTagSet(LocaleTagSet),
    Word(Word),
    Null,
    Array(Vec<Value>),
    IntegerArray(Vec<i32>),
    StringArray(Vec<String>),
    ColumnMeta(ColumnMeta),
    ResultSetMeta(ResultSetMeta),
    ExceptionInfo(ExceptionInfo),
    ErrorLevel(ErrorLevel),
}

impl Value {
    pub fn tag(&self) -> Tag {
        match self {
            Value::Status(_) => Tag::Status,
            Value::Request(_) => Tag::Request,
            Value::Integer(_) => Tag::Integer,
            Value::Integer64(_) => Tag::Integer64,
            Value::Float(_) => Tag::Float,
            Value::Double(_) => Tag::Double,
            Value::Decimal(_) => Tag::Decimal,
            Value::String(_) => Tag::String,
            Value::Binary(_) => Tag::Binary,
            Value::Date(_) => Tag::Date,
            Value::DateTime(_) => Tag::DateTime,
            Value::LocaleTagSet(_) => Tag::LocaleTagSet,
            Value::Word(_) => Tag::Word,
            Value::Null => Tag::Null,
            Value::Array(_) => Tag::DataArray,
            Value::IntegerArray(_) => Tag::IntegerArray,
            Value::StringArray(_) => Tag::StringArray,
            Value::ColumnMeta(_) => Tag::ColumnMeta,
            Value::ResultSetMeta(_) => Tag::ResultSetMeta,
            Value::ExceptionInfo(_) => Tag::ExceptionInfo,
            Value::ErrorLevel(_) => Tag::ErrorLevel,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.tag().name()
    }

    /// An empty value of the kind `tag` decodes into.
    pub fn default_for(tag: Tag) -> Value {
        match tag.decoded() {
            Tag::Status => Value::Status(Status::Success),
            Tag::Request => Value::Request(Request::BeginConnection),
            Tag::Integer => Value::Integer(0),
            Tag::Integer64 => Value::Integer64(0),
            Tag::Float => Value::Float(0.0),
            Tag::Double => Value::Double(0.0),
            Tag::Decimal => Value::Decimal(Decimal::zero(1, 0)),
            Tag::String => Value::String(String::new()),
            Tag::Binary => Value::Binary(Vec::new()),
            Tag::Date => Value::Date(Date {
                year: 1970,
                month: 1,
                day: 1,
            }),
            Tag::DateTime => Value::DateTime(DateTime {
                date: Date {
                    year: 1970,
                    month: 1,
                    day: 1,
                },
                hour: 0,
                minute: 0,
                second: 0,
                millisecond: 0,
            }),
            Tag::LocaleTagSet => Value::LocaleTagSet(LocaleTagSet::new()),
            Tag::Word => Value::Word(Word::default()),
            Tag::DataArray => Value::Array(Vec::new()),
            Tag::IntegerArray => Value::IntegerArray(Vec::new()),
            Tag::StringArray => Value::StringArray(Vec::new()),
            Tag::ColumnMeta => Value::ColumnMeta(ColumnMeta::default()),
            Tag::ResultSetMeta => Value::ResultSetMeta(ResultSetMeta::default()),
            Tag::ExceptionInfo => Value::ExceptionInfo(ExceptionInfo::default()),
            Tag::ErrorLevel => Value::ErrorLevel(ErrorLevel::User),
            Tag::None | Tag::Null | Tag::CompressedString | Tag::CompressedBinary => Value::Null,
        }
    }

    /// Writes the tag followed by the value's layout.
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_i32(self.tag().code());
        self.encode_body(buf);
    }

    /// Writes the value's layout without the tag.
    pub fn encode_body<B: BufMut>(&self, buf: &mut B) {
        match self {
            Value::Status(status) => buf.put_i32(status.code()),
            Value::Request(request) => buf.put_i32(request.code()),
            Value::Integer(v) => buf.put_i32(*v),
            Value::Integer64(v) => buf.put_i64(*v),
            Value::Float(v) => buf.put_f32(*v),
            Value::Double(v) => buf.put_f64(*v),
            Value::Decimal(v) => v.encode(buf),
            Value::String(v) => buf.put_wire_string(v),
            Value::Binary(v) => buf.put_wire_bytes(v),
            Value::Date(v) => v.encode(buf),
            Value::DateTime(v) => v.encode(buf),
            Value::LocaleTagSet(v) => v.encode(buf),
            Value::Word(v) => v.encode(buf),
            Value::Null => {}
            Value::Array(values) => {
                buf.put_i32(values.len() as i32);
                for value in values {
                    value.encode(buf);
                }
            }
            Value::IntegerArray(values) => {
                buf.put_i32(values.len() as i32);
                for v in values {
                    buf.put_i32(*v);
                }
            }
            Value::StringArray(values) => {
                buf.put_i32(values.len() as i32);
                for v in values {
                    buf.put_wire_string(v);
                }
            }
            Value::ColumnMeta(v) => v.encode(buf),
            Value::ResultSetMeta(v) => v.encode(buf),
            Value::ExceptionInfo(v) => v.encode(buf),
            Value::ErrorLevel(level) => buf.put_i32(level.code()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(i64::from(*v)),
            Value::Integer64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(f64::from(*v)),
            Value::Integer64(v) => Some(*v as f64),
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            Value::Decimal(v) => Some(v.to_f64()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    fn unexpected(&self, expected: &'static str) -> ProtocolError {
        ProtocolError::UnexpectedType {
            expected,
            actual: self.type_name(),
        }
    }

    pub fn into_integer(self) -> Result<i32, ProtocolError> {
        match self {
            Value::Integer(v) => Ok(v),
            other => Err(other.unexpected("Integer")),
        }
    }

    pub fn into_string(self) -> Result<String, ProtocolError> {
        match self {
            Value::String(v) => Ok(v),
            other => Err(other.unexpected("String")),
        }
    }

    pub fn into_status(self) -> Result<Status, ProtocolError> {
        match self {
            Value::Status(v) => Ok(v),
            other => Err(other.unexpected("Status")),
        }
    }

    pub fn into_array(self) -> Result<Vec<Value>, ProtocolError> {
        match self {
            Value::Array(v) => Ok(v),
            other => Err(other.unexpected("DataArray")),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<Date> for Value {
    fn from(v: Date) -> Self {
        Value::Date(v)
    }
}

impl From<DateTime> for Value {
    fn from(v: DateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<chrono::NaiveDate> for Value {
    fn from(v: chrono::NaiveDate) -> Self {
        Value::Date(v.into())
    }
}

impl From<chrono::NaiveDateTime> for Value {
    fn from(v: chrono::NaiveDateTime) -> Self {
        Value::DateTime(v.into())
    }
}

impl From<LocaleTagSet> for Value {
    fn from(v: LocaleTagSet) -> Self {
        Value::LocaleTagSet(v)
    }
}

impl From<Word> for Value {
    fn from(v: Word) -> Self {
        Value::Word(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<Status> for Value {
    fn from(v: Status) -> Self {
        Value::Status(v)
    }
}

impl From<Request> for Value {
    fn from(v: Request) -> Self {
        Value::Request(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    f.write_str("0x")?;
    for b in bytes {
        write!(f, "{b:02x}")?;
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Status(v) => write!(f, "{v}"),
            Value::Request(v) => write!(f, "{v}"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Integer64(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Decimal(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
            Value::Binary(v) => write_hex(f, v),
            Value::Date(v) => write!(f, "{v}"),
            Value::DateTime(v) => write!(f, "{v}"),
            Value::LocaleTagSet(v) => write!(f, "{v}"),
            Value::Word(v) => write!(f, "{v}"),
            Value::Null => f.write_str("(null)"),
            Value::Array(values) => {
                f.write_str("{")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("}")
            }
            Value::IntegerArray(values) => {
                let parts: Vec<String> = values.iter().map(i32::to_string).collect();
                write!(f, "{{{}}}", parts.join(","))
            }
            Value::StringArray(values) => write!(f, "{{{}}}", values.join(",")),
            Value::ColumnMeta(v) => f.write_str(v.label()),
            Value::ResultSetMeta(v) => {
                let labels: Vec<&str> = v.columns.iter().map(ColumnMeta::label).collect();
                write!(f, "[{}]", labels.join(", "))
            }
            Value::ExceptionInfo(v) => write!(f, "{v}"),
            Value::ErrorLevel(v) => write!(f, "{v}"),
        }
    }
}

/// Serializes values for human-facing output such as JSON lines. Numeric
/// kinds map to numbers; exact and structured kinds map to their text form.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Integer(v) => serializer.serialize_i32(*v),
            Value::Integer64(v) => serializer.serialize_i64(*v),
            Value::Float(v) => serializer.serialize_f32(*v),
            Value::Double(v) => serializer.serialize_f64(*v),
            Value::String(v) => serializer.serialize_str(v),
            Value::Array(values) => {
                let mut seq = serializer.serialize_seq(Some(values.len()))?;
                for v in values {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
            Value::IntegerArray(values) => values.serialize(serializer),
            Value::StringArray(values) => values.serialize(serializer),
            other => serializer.collect_str(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_match_variants() {
        assert_eq!(Value::Integer(1).tag(), Tag::Integer);
        assert_eq!(Value::Array(vec![]).tag(), Tag::DataArray);
        assert_eq!(Value::Null.tag(), Tag::Null);
        assert_eq!(Value::from("x").tag(), Tag::String);
    }

    #[test]
    fn test_default_for_every_tag() {
        for tag in Tag::ALL {
            let value = Value::default_for(tag);
            match tag {
                Tag::None => assert!(value.is_null()),
                _ => assert_eq!(value.tag(), tag.decoded()),
            }
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Null.to_string(), "(null)");
        assert_eq!(Value::Binary(vec![0x0a, 0xff]).to_string(), "0x0aff");
        let array = Value::Array(vec![Value::Integer(1), Value::from("a"), Value::Null]);
        assert_eq!(array.to_string(), "{1,a,(null)}");
        assert_eq!(Value::IntegerArray(vec![3, 4]).to_string(), "{3,4}");
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some(5)), Value::Integer(5));
    }

    #[test]
    fn test_into_accessors() {
        assert_eq!(Value::Integer(7).into_integer().unwrap(), 7);
        let err = Value::from("seven").into_integer().unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::UnexpectedType {
                expected: "Integer",
                actual: "String"
            }
        ));
        assert_eq!(
            Value::Status(Status::Success).into_status().unwrap(),
            Status::Success
        );
    }

    #[test]
    fn test_numeric_widening() {
        assert_eq!(Value::Integer(3).as_i64(), Some(3));
        assert_eq!(Value::Float(1.5).as_f64(), Some(1.5));
        let decimal: Decimal = "2.25".parse().unwrap();
        assert_eq!(Value::Decimal(decimal).as_f64(), Some(2.25));
        assert_eq!(Value::from("x").as_f64(), None);
    }
}
