//! Protocol error types.

use thiserror::Error;

/// Errors raised while encoding or decoding wire values.
///
/// Every decode failure is fatal to the exchange in progress: the channel the
/// bytes came from is in an unknown position and must be discarded.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown type tag: {0}")]
    UnknownType(i32),

    #[error("unexpected value: expected {expected}, got {actual}")]
    UnexpectedType {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("unexpected end of data")]
    UnexpectedEnd,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid UTF-16 in string payload")]
    InvalidUtf16,

    #[error("invalid decimal: {0}")]
    InvalidDecimal(String),

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("invalid status code: {0}")]
    InvalidStatus(i32),

    #[error("invalid error level: {0}")]
    InvalidErrorLevel(i32),

    #[error("invalid request code: {0}")]
    InvalidRequest(i32),

    #[error("invalid locale tag: {0}")]
    InvalidLocale(String),

    #[error("length out of range: {0}")]
    LengthOutOfRange(i64),

    #[error("compression error: {0}")]
    Compression(std::io::Error),
}

impl ProtocolError {
    /// Returns whether the error originated in the underlying reader or
    /// writer rather than in the byte stream itself.
    pub fn is_io(&self) -> bool {
        matches!(self, ProtocolError::Io(_) | ProtocolError::UnexpectedEnd)
    }
}
