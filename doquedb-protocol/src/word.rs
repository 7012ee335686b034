//! Full-text search words.

use crate::error::ProtocolError;
use crate::frame::{WireRead, WireWrite};
use crate::locale::LocaleTagSet;
use bytes::BufMut;
use std::fmt;
use std::io::Read;

/// Role of a word in a relevance-feedback query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WordCategory {
    #[default]
    Undefined,
    Essential,
    Important,
    Helpful,
    EssentialRelated,
    ImportantRelated,
    HelpfulRelated,
    Prohibitive,
    ProhibitiveRelated,
    /// A code this client does not know; carried through unchanged.
    Other(i32),
}

impl WordCategory {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => WordCategory::Undefined,
            1 => WordCategory::Essential,
            2 => WordCategory::Important,
            3 => WordCategory::Helpful,
            4 => WordCategory::EssentialRelated,
            5 => WordCategory::ImportantRelated,
            6 => WordCategory::HelpfulRelated,
            7 => WordCategory::Prohibitive,
            8 => WordCategory::ProhibitiveRelated,
            other => WordCategory::Other(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            WordCategory::Undefined => 0,
            WordCategory::Essential => 1,
            WordCategory::Important => 2,
            WordCategory::Helpful => 3,
            WordCategory::EssentialRelated => 4,
            WordCategory::ImportantRelated => 5,
            WordCategory::HelpfulRelated => 6,
            WordCategory::Prohibitive => 7,
            WordCategory::ProhibitiveRelated => 8,
            WordCategory::Other(code) => code,
        }
    }
}

/// A search term with its language, category and weighting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Word {
    pub term: String,
    pub language: LocaleTagSet,
    pub category: WordCategory,
    pub scale: f64,
    pub document_frequency: i32,
}

impl Word {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            ..Default::default()
        }
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_wire_string(&self.term);
        self.language.encode(buf);
        buf.put_i32(self.category.code());
        buf.put_f64(self.scale);
        buf.put_i32(self.document_frequency);
    }

    pub fn decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, ProtocolError> {
        Ok(Self {
            term: reader.read_string_wire()?,
            language: LocaleTagSet::decode(reader)?,
            category: WordCategory::from_code(reader.read_i32_wire()?),
            scale: reader.read_f64_wire()?,
            document_frequency: reader.read_i32_wire()?,
        })
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.term)?;
        if !self.language.is_empty() {
            write!(f, " lang {}", self.language)?;
        }
        write!(
            f,
            " category {} scale {} df {}",
            self.category.code(),
            self.scale,
            self.document_frequency
        )
    }
}
