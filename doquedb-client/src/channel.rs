//! Transport channel: one TCP connection carrying one exchange at a time.

use crate::config::DataSourceConfig;
use crate::error::{ClientError, ErrorTranslator};
use bytes::{BufMut, BytesMut};
use doquedb_protocol::frame::WireRead;
use doquedb_protocol::version::handshake_word;
use doquedb_protocol::{
    decode, decode_into, AuthMode, Encoder, ErrorLevel, ProtocolError, ProtocolVersion, Request,
    Status, Value,
};
use std::fmt;
use std::io::{BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;

/// Read buffer size for a channel socket.
pub const READ_BUFFER_SIZE: usize = 16 * 1024;

/// A TCP connection to the server after the open handshake.
///
/// Writes are buffered until [`Channel::flush`]. A read that meets an
/// [`ErrorLevel`] marker consumes the exception info that follows and returns
/// the translated error; a user-level error leaves the channel reusable.
/// Any I/O or framing failure closes the channel.
pub struct Channel {
    stream: Option<BufReader<TcpStream>>,
    peer: SocketAddr,
    write_buf: BytesMut,
    encoder: Encoder,
    translator: Arc<dyn ErrorTranslator>,
    slave_id: i32,
    worker_id: i32,
    master_word: i32,
    reusable: bool,
}

impl Channel {
    /// Connects and performs the open handshake, requesting `slave_id`
    /// ([`doquedb_protocol::ANY_SLAVE_ID`] for a fresh one).
    pub fn open(
        config: &DataSourceConfig,
        slave_id: i32,
        translator: Arc<dyn ErrorTranslator>,
    ) -> Result<Self, ClientError> {
        let stream = connect(config)?;
        let peer = stream.peer_addr()?;
        let mut channel = Self {
            stream: Some(BufReader::with_capacity(READ_BUFFER_SIZE, stream)),
            peer,
            write_buf: BytesMut::with_capacity(256),
            encoder: Encoder::new().with_compression(config.compress_payloads),
            translator,
            slave_id,
            worker_id: 0,
            master_word: 0,
            reusable: false,
        };

        let word = handshake_word(config.protocol_version, config.effective_auth_mode());
        channel.write_buf.put_i32(word);
        channel.write_buf.put_i32(slave_id);
        channel.flush()?;

        let reader = channel.reader()?;
        let handshake = reader
            .read_i32_wire()
            .and_then(|master| Ok((master, reader.read_i32_wire()?)));
        let (master_word, assigned) = match handshake {
            Ok(v) => v,
            Err(e) => {
                channel.close();
                return Err(e.into());
            }
        };
        channel.master_word = master_word;
        channel.slave_id = assigned;

        tracing::debug!(
            "Opened channel to {} (slave_id={}, protocol={}, auth={:?})",
            peer,
            assigned,
            channel.master_id(),
            channel.authorization()
        );
        Ok(channel)
    }

    pub fn slave_id(&self) -> i32 {
        self.slave_id
    }

    pub fn worker_id(&self) -> i32 {
        self.worker_id
    }

    pub fn set_worker_id(&mut self, worker_id: i32) {
        self.worker_id = worker_id;
    }

    /// Protocol version the server agreed to.
    pub fn master_id(&self) -> ProtocolVersion {
        ProtocolVersion::from_word(self.master_word)
    }

    pub fn authorization(&self) -> AuthMode {
        AuthMode::from_word(self.master_word)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref()?.get_ref().local_addr().ok()
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Whether the last server error left this channel usable.
    pub fn is_reusable(&self) -> bool {
        self.reusable
    }

    /// Clears per-exchange state before the channel goes back to the pool.
    pub fn reset(&mut self) {
        self.reusable = false;
        self.worker_id = 0;
        self.write_buf.clear();
    }

    /// Buffers one value.
    pub fn write_value(&mut self, value: &Value) -> Result<(), ClientError> {
        if self.stream.is_none() {
            return Err(ClientError::NotOpen);
        }
        self.encoder.encode(value, &mut self.write_buf)?;
        Ok(())
    }

    pub fn write_request(&mut self, request: Request) -> Result<(), ClientError> {
        self.write_value(&Value::Request(request))
    }

    /// Sends everything buffered since the last flush.
    pub fn flush(&mut self) -> Result<(), ClientError> {
        let stream = match self.stream.as_mut() {
            Some(reader) => reader.get_mut(),
            None => return Err(ClientError::NotOpen),
        };
        let result = stream.write_all(&self.write_buf).and_then(|_| stream.flush());
        self.write_buf.clear();
        if let Err(e) = result {
            self.close();
            return Err(e.into());
        }
        Ok(())
    }

    /// Reads one value. `None` is the end-of-data marker.
    pub fn read_value(&mut self) -> Result<Option<Value>, ClientError> {
        let result = decode(self.reader()?);
        match result {
            Ok(Some(Value::ErrorLevel(level))) => Err(self.read_server_error(level)),
            Ok(value) => Ok(value),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Reads one value into `dest`, reusing its allocation when the incoming
    /// value has the same shape. Returns `false` at the end-of-data marker.
    pub fn read_value_into(&mut self, dest: &mut Value) -> Result<bool, ClientError> {
        let result = decode_into(self.reader()?, dest);
        match result {
            Ok(true) => match dest {
                Value::ErrorLevel(level) => {
                    let level = *level;
                    Err(self.read_server_error(level))
                }
                _ => Ok(true),
            },
            Ok(false) => Ok(false),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Reads a value that must be present.
    pub fn read_required(&mut self, expected: &'static str) -> Result<Value, ClientError> {
        match self.read_value()? {
            Some(value) => Ok(value),
            None => Err(self.fail(ProtocolError::UnexpectedType {
                expected,
                actual: "end of data",
            })),
        }
    }

    pub fn read_integer(&mut self) -> Result<i32, ClientError> {
        let value = self.read_required("Integer")?;
        value.into_integer().map_err(|e| self.fail(e))
    }

    pub fn read_string(&mut self) -> Result<String, ClientError> {
        let value = self.read_required("String")?;
        value.into_string().map_err(|e| self.fail(e))
    }

    pub fn read_status(&mut self) -> Result<Status, ClientError> {
        let value = self.read_required("Status")?;
        value.into_status().map_err(|e| self.fail(e))
    }

    /// Reads the closing status of a control exchange.
    pub fn expect_success(&mut self) -> Result<(), ClientError> {
        match self.read_status()? {
            Status::Success => Ok(()),
            other => Err(ClientError::UnexpectedStatus(other)),
        }
    }

    /// Closes the socket. Safe to call more than once.
    pub fn close(&mut self) {
        self.reusable = false;
        if let Some(reader) = self.stream.take() {
            tracing::debug!("Closing channel {} (slave_id={})", self.peer, self.slave_id);
            let _ = reader.get_ref().shutdown(Shutdown::Both);
        }
    }

    fn reader(&mut self) -> Result<&mut BufReader<TcpStream>, ClientError> {
        self.stream.as_mut().ok_or(ClientError::NotOpen)
    }

    fn read_server_error(&mut self, level: ErrorLevel) -> ClientError {
        let info = match self.read_value() {
            Ok(Some(Value::ExceptionInfo(info))) => info,
            Ok(Some(other)) => {
                return self.fail(ProtocolError::UnexpectedType {
                    expected: "ExceptionInfo",
                    actual: other.type_name(),
                })
            }
            Ok(None) => {
                return self.fail(ProtocolError::UnexpectedType {
                    expected: "ExceptionInfo",
                    actual: "end of data",
                })
            }
            Err(e) => return e,
        };
        self.reusable = level.is_user();
        tracing::debug!(
            "Server error on slave {} (level={}, errno={:#x})",
            self.slave_id,
            level,
            info.errno
        );
        self.translator.translate(level, info)
    }

    fn fail(&mut self, error: ProtocolError) -> ClientError {
        self.close();
        error.into()
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("peer", &self.peer)
            .field("slave_id", &self.slave_id)
            .field("worker_id", &self.worker_id)
            .field("open", &self.is_open())
            .field("reusable", &self.reusable)
            .finish()
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

fn connect(config: &DataSourceConfig) -> Result<TcpStream, ClientError> {
    let mut last_err = None;
    for addr in (config.host.as_str(), config.port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, config.connect_timeout()) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                stream.set_read_timeout(config.read_timeout())?;
                return Ok(stream);
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err
        .unwrap_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                format!("no address for {}", config.addr()),
            )
        })
        .into())
}
