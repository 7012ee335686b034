//! # doquedb-client
//!
//! Blocking client runtime for DoqueDB.
//!
//! This crate provides:
//! - Transport channels speaking the tagged wire codec
//! - Control connections that start and cancel server workers
//! - A data source pooling idle channels behind a background reaper
//! - Sessions, prepared statements and streaming result sets

pub mod channel;
pub mod config;
pub mod connection;
pub mod datasource;
pub mod error;
pub mod maintenance;
pub mod prepare;
pub mod result_set;
pub mod session;

pub use channel::Channel;
pub use config::{ConfigError, DataSourceConfig};
pub use connection::ClientConnection;
pub use datasource::DataSource;
pub use error::{ClientError, DefaultErrorTranslator, ErrorTranslator, ServerError};
pub use maintenance::MaintenanceStats;
pub use prepare::PrepareStatement;
pub use result_set::{CancelHandle, ResultSet, ResultStatus, Rows};
pub use session::Session;
