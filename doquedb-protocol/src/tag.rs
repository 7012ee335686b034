//! Type tags.
//!
//! Every value on the wire starts with an `i32` tag naming its layout. The
//! mapping is closed: a tag not listed here is a protocol error.

use crate::error::ProtocolError;

/// Wire type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Tag {
    /// End-of-data marker; carries no body.
    None = 0,
    Status = 1,
    Integer = 2,
    Integer64 = 4,
    Float = 6,
    Double = 7,
    Decimal = 8,
    String = 9,
    Date = 10,
    DateTime = 11,
    IntegerArray = 12,
    StringArray = 14,
    DataArray = 15,
    Binary = 16,
    Null = 17,
    ExceptionInfo = 18,
    CompressedString = 21,
    CompressedBinary = 22,
    Request = 24,
    LocaleTagSet = 25,
    ColumnMeta = 27,
    ResultSetMeta = 28,
    Word = 29,
    ErrorLevel = 30,
}

impl Tag {
    pub const ALL: [Tag; 24] = [
        Tag::None,
        Tag::Status,
        Tag::Integer,
        Tag::Integer64,
        Tag::Float,
        Tag::Double,
        Tag::Decimal,
        Tag::String,
        Tag::Date,
        Tag::DateTime,
        Tag::IntegerArray,
        Tag::StringArray,
        Tag::DataArray,
        Tag::Binary,
        Tag::Null,
        Tag::ExceptionInfo,
        Tag::CompressedString,
        Tag::CompressedBinary,
        Tag::Request,
        Tag::LocaleTagSet,
        Tag::ColumnMeta,
        Tag::ResultSetMeta,
        Tag::Word,
        Tag::ErrorLevel,
    ];

    pub fn code(self) -> i32 {
        self as i32
    }

    /// The tag a value decoded under `self` ends up carrying. Compressed
    /// payloads decode into their plain counterparts.
    pub fn decoded(self) -> Tag {
        match self {
            Tag::CompressedString => Tag::String,
            Tag::CompressedBinary => Tag::Binary,
            other => other,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Tag::None => "None",
            Tag::Status => "Status",
            Tag::Integer => "Integer",
            Tag::Integer64 => "Integer64",
            Tag::Float => "Float",
            Tag::Double => "Double",
            Tag::Decimal => "Decimal",
            Tag::String => "String",
            Tag::Date => "Date",
            Tag::DateTime => "DateTime",
            Tag::IntegerArray => "IntegerArray",
            Tag::StringArray => "StringArray",
            Tag::DataArray => "DataArray",
            Tag::Binary => "Binary",
            Tag::Null => "Null",
            Tag::ExceptionInfo => "ExceptionInfo",
            Tag::CompressedString => "CompressedString",
            Tag::CompressedBinary => "CompressedBinary",
            Tag::Request => "Request",
            Tag::LocaleTagSet => "LocaleTagSet",
            Tag::ColumnMeta => "ColumnMeta",
            Tag::ResultSetMeta => "ResultSetMeta",
            Tag::Word => "Word",
            Tag::ErrorLevel => "ErrorLevel",
        }
    }
}

impl TryFrom<i32> for Tag {
    type Error = ProtocolError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => Tag::None,
            1 => Tag::Status,
            2 => Tag::Integer,
            4 => Tag::Integer64,
            6 => Tag::Float,
            7 => Tag::Double,
            8 => Tag::Decimal,
            9 => Tag::String,
            10 => Tag::Date,
            11 => Tag::DateTime,
            12 => Tag::IntegerArray,
            14 => Tag::StringArray,
            15 => Tag::DataArray,
            16 => Tag::Binary,
            17 => Tag::Null,
            18 => Tag::ExceptionInfo,
            21 => Tag::CompressedString,
            22 => Tag::CompressedBinary,
            24 => Tag::Request,
            25 => Tag::LocaleTagSet,
            27 => Tag::ColumnMeta,
            28 => Tag::ResultSetMeta,
            29 => Tag::Word,
            30 => Tag::ErrorLevel,
            other => return Err(ProtocolError::UnknownType(other)),
        })
    }
}
