//! Client error types.

use crate::config::ConfigError;
use doquedb_protocol::{ErrorLevel, ExceptionInfo, ProtocolError, ProtocolVersion, Status};
use thiserror::Error;

/// Error number the default translator maps to [`ClientError::UnknownRequest`].
///
/// Servers built with a different message catalog can supply their own
/// [`ErrorTranslator`].
pub const UNKNOWN_REQUEST_ERRNO: i32 = 0x0001_0a05;

/// An error raised by the server, as received over a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    pub level: ErrorLevel,
    pub info: ExceptionInfo,
}

impl ServerError {
    pub fn errno(&self) -> i32 {
        self.info.errno
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.level, self.info)
    }
}

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("server error: {0}")]
    Server(ServerError),

    #[error("request not understood by server: {0}")]
    UnknownRequest(ServerError),

    #[error("data source is not open")]
    NotOpen,

    #[error("every control connection to the server was lost")]
    ConnectionLost,

    #[error("session is closed")]
    InvalidSession,

    #[error("prepared statement is closed")]
    InvalidPrepareStatement,

    #[error("{operation} requires protocol {required}, server speaks {negotiated}")]
    NotSupported {
        operation: &'static str,
        required: ProtocolVersion,
        negotiated: ProtocolVersion,
    },

    #[error("unexpected status: {0}")]
    UnexpectedStatus(Status),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// Returns whether the underlying connection failed. The channel the
    /// error came from has been closed.
    pub fn is_transport(&self) -> bool {
        match self {
            ClientError::Io(_) | ClientError::ConnectionLost => true,
            ClientError::Protocol(e) => e.is_io(),
            _ => false,
        }
    }

    /// Returns whether the channel the error came from is still usable.
    pub fn is_reusable(&self) -> bool {
        match self {
            ClientError::Server(e) | ClientError::UnknownRequest(e) => e.level.is_user(),
            _ => false,
        }
    }

    pub fn server_error(&self) -> Option<&ServerError> {
        match self {
            ClientError::Server(e) | ClientError::UnknownRequest(e) => Some(e),
            _ => None,
        }
    }
}

/// Maps server exception payloads to typed errors.
///
/// Deployments with a generated message catalog plug their mapping in
/// through [`crate::DataSource::with_error_translator`].
pub trait ErrorTranslator: Send + Sync {
    fn translate(&self, level: ErrorLevel, info: ExceptionInfo) -> ClientError;
}

/// Built-in mapping: recognizes the unknown-request error and reports
/// everything else as a generic server error.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorTranslator;

impl ErrorTranslator for DefaultErrorTranslator {
    fn translate(&self, level: ErrorLevel, info: ExceptionInfo) -> ClientError {
        let error = ServerError { level, info };
        if error.errno() == UNKNOWN_REQUEST_ERRNO {
            ClientError::UnknownRequest(error)
        } else {
            ClientError::Server(error)
        }
    }
}
