//! Column and result-set metadata.

use crate::error::ProtocolError;
use crate::frame::{WireRead, WireWrite};
use crate::tag::Tag;
use crate::value::Value;
use bytes::BufMut;
use std::io::Read;

/// SQL column types reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Unknown,
    Character,
    CharacterVarying,
    NationalCharacter,
    NationalCharacterVarying,
    Binary,
    BinaryVarying,
    Clob,
    Nclob,
    Blob,
    Numeric,
    SmallInt,
    Integer,
    BigInt,
    Decimal,
    Float,
    Real,
    DoublePrecision,
    Boolean,
    Date,
    Time,
    Timestamp,
    Language,
    Word,
}

impl SqlType {
    /// Maps a wire code; codes outside the table read as `Unknown`.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => SqlType::Character,
            2 => SqlType::CharacterVarying,
            3 => SqlType::NationalCharacter,
            4 => SqlType::NationalCharacterVarying,
            5 => SqlType::Binary,
            6 => SqlType::BinaryVarying,
            7 => SqlType::Clob,
            8 => SqlType::Nclob,
            9 => SqlType::Blob,
            10 => SqlType::Numeric,
            11 => SqlType::SmallInt,
            12 => SqlType::Integer,
            13 => SqlType::BigInt,
            14 => SqlType::Decimal,
            15 => SqlType::Float,
            16 => SqlType::Real,
            17 => SqlType::DoublePrecision,
            18 => SqlType::Boolean,
            19 => SqlType::Date,
            20 => SqlType::Time,
            21 => SqlType::Timestamp,
            22 => SqlType::Language,
            23 => SqlType::Word,
            _ => SqlType::Unknown,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            SqlType::Unknown => 0,
            SqlType::Character => 1,
            SqlType::CharacterVarying => 2,
            SqlType::NationalCharacter => 3,
            SqlType::NationalCharacterVarying => 4,
            SqlType::Binary => 5,
            SqlType::BinaryVarying => 6,
            SqlType::Clob => 7,
            SqlType::Nclob => 8,
            SqlType::Blob => 9,
            SqlType::Numeric => 10,
            SqlType::SmallInt => 11,
            SqlType::Integer => 12,
            SqlType::BigInt => 13,
            SqlType::Decimal => 14,
            SqlType::Float => 15,
            SqlType::Real => 16,
            SqlType::DoublePrecision => 17,
            SqlType::Boolean => 18,
            SqlType::Date => 19,
            SqlType::Time => 20,
            SqlType::Timestamp => 21,
            SqlType::Language => 22,
            SqlType::Word => 23,
        }
    }

    /// The tag a scalar of this type arrives with.
    pub fn value_tag(self) -> Tag {
        match self {
            SqlType::Character
            | SqlType::CharacterVarying
            | SqlType::NationalCharacter
            | SqlType::NationalCharacterVarying
            | SqlType::Clob
            | SqlType::Nclob => Tag::String,
            SqlType::Binary | SqlType::BinaryVarying | SqlType::Blob => Tag::Binary,
            SqlType::SmallInt | SqlType::Integer | SqlType::Boolean => Tag::Integer,
            SqlType::BigInt => Tag::Integer64,
            SqlType::Numeric | SqlType::Decimal => Tag::Decimal,
            SqlType::Float | SqlType::Real | SqlType::DoublePrecision => Tag::Double,
            SqlType::Date => Tag::Date,
            SqlType::Time | SqlType::Timestamp => Tag::DateTime,
            SqlType::Language => Tag::LocaleTagSet,
            SqlType::Word => Tag::Word,
            SqlType::Unknown => Tag::Null,
        }
    }
}

/// Description of one result column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMeta {
    pub type_code: i32,
    pub type_name: String,
    pub column_name: String,
    pub table_name: String,
    pub database_name: String,
    pub column_alias: String,
    pub table_alias: String,
    pub display_size: i32,
    pub precision: i32,
    pub scale: i32,
    /// Maximum array length; zero for scalar columns.
    pub cardinality: i32,
    pub flags: i32,
}

impl ColumnMeta {
    pub const AUTO_INCREMENT: i32 = 1 << 0;
    pub const CASE_INSENSITIVE: i32 = 1 << 1;
    pub const UNSIGNED: i32 = 1 << 2;
    pub const NOT_SEARCHABLE: i32 = 1 << 3;
    pub const READ_ONLY: i32 = 1 << 4;
    pub const NOT_NULL: i32 = 1 << 5;
    pub const UNIQUE: i32 = 1 << 6;

    const STRING_FIELDS: i32 = 6;
    const INT_FIELDS: i32 = 4;

    pub fn new(sql_type: SqlType, column_name: impl Into<String>) -> Self {
        Self {
            type_code: sql_type.code(),
            column_name: column_name.into(),
            ..Default::default()
        }
    }

    pub fn sql_type(&self) -> SqlType {
        SqlType::from_code(self.type_code)
    }

    pub fn is_array(&self) -> bool {
        self.cardinality != 0
    }

    pub fn is_auto_increment(&self) -> bool {
        self.flags & Self::AUTO_INCREMENT != 0
    }

    pub fn is_case_insensitive(&self) -> bool {
        self.flags & Self::CASE_INSENSITIVE != 0
    }

    pub fn is_unsigned(&self) -> bool {
        self.flags & Self::UNSIGNED != 0
    }

    pub fn is_searchable(&self) -> bool {
        self.flags & Self::NOT_SEARCHABLE == 0
    }

    pub fn is_read_only(&self) -> bool {
        self.flags & Self::READ_ONLY != 0
    }

    pub fn is_nullable(&self) -> bool {
        self.flags & Self::NOT_NULL == 0
    }

    pub fn is_unique(&self) -> bool {
        self.flags & Self::UNIQUE != 0
    }

    /// Label shown for the column: the alias when present.
    pub fn label(&self) -> &str {
        if self.column_alias.is_empty() {
            &self.column_name
        } else {
            &self.column_alias
        }
    }

    /// An empty value shaped like this column's data.
    pub fn template(&self) -> Value {
        if self.is_array() {
            Value::Array(Vec::new())
        } else {
            Value::default_for(self.sql_type().value_tag())
        }
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_i32(self.type_code);
        buf.put_i32(Self::STRING_FIELDS);
        for field in [
            &self.type_name,
            &self.column_name,
            &self.table_name,
            &self.database_name,
            &self.column_alias,
            &self.table_alias,
        ] {
            buf.put_wire_string(field);
        }
        buf.put_i32(Self::INT_FIELDS);
        buf.put_i32(self.display_size);
        buf.put_i32(self.precision);
        buf.put_i32(self.scale);
        buf.put_i32(self.cardinality);
        buf.put_i32(self.flags);
    }

    /// Reads a column description. Shorter field lists from older servers
    /// leave the remaining fields at their defaults; longer ones are skipped.
    pub fn decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, ProtocolError> {
        let mut meta = Self {
            type_code: reader.read_i32_wire()?,
            ..Default::default()
        };

        let string_count = reader.read_count_wire()?;
        for i in 0..string_count {
            let value = reader.read_string_wire()?;
            match i {
                0 => meta.type_name = value,
                1 => meta.column_name = value,
                2 => meta.table_name = value,
                3 => meta.database_name = value,
                4 => meta.column_alias = value,
                5 => meta.table_alias = value,
                _ => {}
            }
        }

        let int_count = reader.read_count_wire()?;
        for i in 0..int_count {
            let value = reader.read_i32_wire()?;
            match i {
                0 => meta.display_size = value,
                1 => meta.precision = value,
                2 => meta.scale = value,
                3 => meta.cardinality = value,
                _ => {}
            }
        }

        meta.flags = reader.read_i32_wire()?;
        Ok(meta)
    }
}

/// Description of a whole result row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSetMeta {
    pub columns: Vec<ColumnMeta>,
}

impl ResultSetMeta {
    pub fn new(columns: Vec<ColumnMeta>) -> Self {
        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, index: usize) -> Option<&ColumnMeta> {
        self.columns.get(index)
    }

    /// A row value shaped like the result, used as the first decode target.
    pub fn row_template(&self) -> Value {
        Value::Array(self.columns.iter().map(ColumnMeta::template).collect())
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_i32(self.columns.len() as i32);
        for column in &self.columns {
            column.encode(buf);
        }
    }

    pub fn decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, ProtocolError> {
        let count = reader.read_count_wire()?;
        let mut columns = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            columns.push(ColumnMeta::decode(reader)?);
        }
        Ok(Self { columns })
    }
}
