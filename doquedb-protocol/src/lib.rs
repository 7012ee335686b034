//! # doquedb-protocol
//!
//! Wire codec for the DoqueDB client protocol.
//!
//! This crate provides:
//! - Big-endian frame primitives and length-prefixed UTF-16 strings
//! - The closed set of tagged [`Value`] kinds with encode/decode dispatch
//! - Decimal, date/time and locale-set sub-codecs
//! - Optional zlib compression for large string and binary payloads
//! - Request codes, statuses, error levels and handshake words

pub mod codec;
pub mod compress;
pub mod datetime;
pub mod decimal;
pub mod error;
pub mod exception;
pub mod frame;
pub mod locale;
pub mod message;
pub mod meta;
pub mod tag;
pub mod value;
pub mod version;
pub mod word;

pub use codec::{decode, decode_into, Encoder};
pub use datetime::{Date, DateTime};
pub use decimal::Decimal;
pub use error::ProtocolError;
pub use exception::ExceptionInfo;
pub use locale::{LocaleTag, LocaleTagSet};
pub use message::{AvailabilityTarget, ErrorLevel, Request, Status};
pub use meta::{ColumnMeta, ResultSetMeta, SqlType};
pub use tag::Tag;
pub use value::Value;
pub use version::{AuthMode, ProtocolVersion};
pub use word::{Word, WordCategory};

/// Default port of a DoqueDB server.
pub const DEFAULT_PORT: u16 = 54321;

/// Largest length accepted from the wire for any string, binary or array.
pub const MAX_LENGTH: usize = 1 << 28;

/// Slave id requesting "any channel" from the server.
pub const ANY_SLAVE_ID: i32 = -1;
