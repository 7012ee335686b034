//! Server exception payloads.

use crate::error::ProtocolError;
use crate::frame::{WireRead, WireWrite};
use bytes::BufMut;
use std::fmt;
use std::io::Read;

/// Error details sent by the server after an error-level marker.
///
/// The error number selects a message template from the server's catalog;
/// the arguments fill it in. Module, file and line locate the raise site.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionInfo {
    pub errno: i32,
    pub args: Vec<String>,
    pub module: String,
    pub file: String,
    pub line: i32,
}

impl ExceptionInfo {
    pub fn new(errno: i32) -> Self {
        Self {
            errno,
            ..Default::default()
        }
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_location(mut self, module: &str, file: &str, line: i32) -> Self {
        self.module = module.to_string();
        self.file = file.to_string();
        self.line = line;
        self
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_i32(self.errno);
        buf.put_i32(self.args.len() as i32);
        for arg in &self.args {
            buf.put_wire_string(arg);
        }
        buf.put_wire_string(&self.module);
        buf.put_wire_string(&self.file);
        buf.put_i32(self.line);
    }

    pub fn decode<R: Read + ?Sized>(reader: &mut R) -> Result<Self, ProtocolError> {
        let errno = reader.read_i32_wire()?;
        let argc = reader.read_count_wire()?;
        let mut args = Vec::with_capacity(argc.min(64));
        for _ in 0..argc {
            args.push(reader.read_string_wire()?);
        }
        let module = reader.read_string_wire()?;
        let file = reader.read_string_wire()?;
        let line = reader.read_i32_wire()?;
        Ok(Self {
            errno,
            args,
            module,
            file,
            line,
        })
    }
}

impl fmt::Display for ExceptionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error {:#010x}", self.errno)?;
        if !self.args.is_empty() {
            write!(f, ": {}", self.args.join(", "))?;
        }
        if !self.file.is_empty() {
            write!(f, " ({} {}:{})", self.module, self.file, self.line)?;
        }
        Ok(())
    }
}
