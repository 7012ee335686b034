//! Control connection.

use crate::channel::Channel;
use crate::datasource::Inner;
use crate::error::ClientError;
use doquedb_protocol::{AvailabilityTarget, Request, Value, ANY_SLAVE_ID};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// A control channel used for short exchanges: starting workers, cancelling
/// them, erasing database-scoped prepared statements, availability checks,
/// spawning sibling control connections and reporting evicted channels.
///
/// Exchanges are serialized by a connection-scoped lock.
#[derive(Debug)]
pub struct ClientConnection {
    channel: Mutex<Channel>,
    slave_id: i32,
    open: AtomicBool,
}

impl ClientConnection {
    pub(crate) fn new(channel: Channel) -> Self {
        Self {
            slave_id: channel.slave_id(),
            open: AtomicBool::new(channel.is_open()),
            channel: Mutex::new(channel),
        }
    }

    pub fn slave_id(&self) -> i32 {
        self.slave_id
    }

    /// Whether the channel survived its last exchange. Never waits for an
    /// exchange in progress.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Starts a worker and returns the channel bound to it.
    ///
    /// An idle pooled channel is offered to the server first; otherwise the
    /// server assigns a slave id and a new channel is opened for it. A
    /// channel abandoned by a failed exchange is expunged so the next
    /// eviction report names it.
    pub(crate) fn begin_worker(&self, ds: &Inner) -> Result<Channel, ClientError> {
        let pooled = ds.pop_port();
        let preferred = pooled.as_ref().map_or(ANY_SLAVE_ID, Channel::slave_id);

        let mut control = self.channel.lock();
        let head = (|| -> Result<i32, ClientError> {
            control.write_request(Request::BeginWorker)?;
            control.write_value(&Value::Integer(preferred))?;
            control.flush()?;
            control.read_integer()
        })();
        let slave_id = match head {
            Ok(id) => id,
            Err(e) => {
                self.note_state(&control);
                drop(control);
                if let Some(channel) = pooled {
                    ds.expunge_port(channel);
                }
                return Err(e);
            }
        };

        // The server binds the worker to the slave channel before answering
        // with its id, so a new channel is opened first.
        let worker_channel = match pooled {
            Some(channel) if channel.slave_id() == slave_id => Ok(channel),
            stale => {
                if let Some(channel) = stale {
                    ds.expunge_port(channel);
                }
                Channel::open(ds.config(), slave_id, ds.translator())
            }
        };

        let tail = (|| -> Result<i32, ClientError> {
            let worker_id = control.read_integer()?;
            control.expect_success()?;
            Ok(worker_id)
        })();
        self.note_state(&control);
        drop(control);

        let worker_id = match tail {
            Ok(id) => id,
            Err(e) => {
                if let Ok(channel) = worker_channel {
                    ds.expunge_port(channel);
                }
                return Err(e);
            }
        };
        let mut channel = worker_channel?;
        channel.set_worker_id(worker_id);
        tracing::debug!("Began worker {} on slave {}", worker_id, slave_id);
        Ok(channel)
    }

    pub fn cancel_worker(&self, worker_id: i32) -> Result<(), ClientError> {
        tracing::debug!("Cancelling worker {}", worker_id);
        self.exchange(|c| {
            c.write_request(Request::CancelWorker)?;
            c.write_value(&Value::Integer(worker_id))?;
            c.flush()?;
            c.expect_success()
        })
    }

    /// Erases a database-scoped prepared statement.
    pub fn erase_prepare_statement(&self, database: &str, prepare_id: i32) -> Result<(), ClientError> {
        self.exchange(|c| {
            c.write_request(Request::ErasePrepareStatement)?;
            c.write_value(&Value::from(database))?;
            c.write_value(&Value::Integer(prepare_id))?;
            c.flush()?;
            c.expect_success()
        })
    }

    pub fn check_availability(&self, target: AvailabilityTarget) -> Result<bool, ClientError> {
        self.exchange(|c| {
            c.write_request(Request::CheckAvailability)?;
            match target {
                AvailabilityTarget::Server => c.write_value(&Value::Integer(target.code()))?,
                AvailabilityTarget::Database(id) => {
                    c.write_value(&Value::Integer(target.code()))?;
                    c.write_value(&Value::Integer(id as i32))?;
                }
            }
            c.flush()?;
            let available = c.read_integer()?;
            c.expect_success()?;
            Ok(available == 1)
        })
    }

    /// Asks the server for a sibling control connection and opens it.
    pub(crate) fn begin_connection(&self, ds: &Inner) -> Result<ClientConnection, ClientError> {
        let host = local_host_name(&self.channel.lock());
        let slave_id = self.exchange(|c| {
            c.write_request(Request::BeginConnection)?;
            c.write_value(&Value::String(host))?;
            c.flush()?;
            let slave_id = c.read_integer()?;
            c.expect_success()?;
            Ok(slave_id)
        })?;
        let channel = Channel::open(ds.config(), slave_id, ds.translator())?;
        tracing::debug!("Opened sibling control connection on slave {}", slave_id);
        Ok(ClientConnection::new(channel))
    }

    /// Tells the server that the client discarded the given channels.
    pub fn disconnect_ports(&self, slave_ids: &[i32]) -> Result<(), ClientError> {
        self.exchange(|c| {
            c.write_request(Request::NoReuseConnection)?;
            c.write_value(&Value::IntegerArray(slave_ids.to_vec()))?;
            c.flush()?;
            c.expect_success()
        })
    }

    /// Ends the connection and closes the channel. The channel is closed even
    /// when the goodbye exchange fails.
    pub fn close(&self) -> Result<(), ClientError> {
        let mut control = self.channel.lock();
        if !control.is_open() {
            return Ok(());
        }
        let result = (|| -> Result<(), ClientError> {
            control.write_request(Request::EndConnection)?;
            control.flush()?;
            control.expect_success()
        })();
        control.close();
        self.note_state(&control);
        result
    }

    fn exchange<T>(
        &self,
        f: impl FnOnce(&mut Channel) -> Result<T, ClientError>,
    ) -> Result<T, ClientError> {
        let mut control = self.channel.lock();
        let result = f(&mut control);
        self.note_state(&control);
        result
    }

    fn note_state(&self, control: &Channel) {
        self.open.store(control.is_open(), Ordering::Release);
    }
}

/// Host name announced in BEGIN_CONNECTION.
pub(crate) fn local_host_name(channel: &Channel) -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| channel.local_addr().map(|a| a.ip().to_string()))
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataSourceConfig;
    use crate::error::DefaultErrorTranslator;
    use crate::testing::{accept_with, handshake, send};
    use doquedb_protocol::{decode, Status};
    use std::io::BufReader;
    use std::net::{Shutdown, TcpListener};
    use std::sync::Arc;

    #[test]
    fn test_control_exchanges() {
        let (config, server) = accept_with(|mut stream| {
            handshake(&mut stream, 5);
            let mut reader = BufReader::new(stream.try_clone().unwrap());

            assert_eq!(
                decode(&mut reader).unwrap(),
                Some(Value::Request(Request::CheckAvailability))
            );
            assert_eq!(decode(&mut reader).unwrap(), Some(Value::Integer(1)));
            assert_eq!(decode(&mut reader).unwrap(), Some(Value::Integer(7)));
            send(&mut stream, &[Value::Integer(0), Value::Status(Status::Success)]);

            assert_eq!(
                decode(&mut reader).unwrap(),
                Some(Value::Request(Request::NoReuseConnection))
            );
            assert_eq!(
                decode(&mut reader).unwrap(),
                Some(Value::IntegerArray(vec![11, 12]))
            );
            send(&mut stream, &[Value::Status(Status::Success)]);

            assert_eq!(
                decode(&mut reader).unwrap(),
                Some(Value::Request(Request::EndConnection))
            );
            send(&mut stream, &[Value::Status(Status::Success)]);
        });

        let channel =
            Channel::open(&config, ANY_SLAVE_ID, Arc::new(DefaultErrorTranslator)).unwrap();
        let conn = ClientConnection::new(channel);
        assert_eq!(conn.slave_id(), 5);

        let available = conn
            .check_availability(AvailabilityTarget::Database(7))
            .unwrap();
        assert!(!available);
        conn.disconnect_ports(&[11, 12]).unwrap();
        conn.close().unwrap();
        assert!(!conn.is_open());

        // Already closed: no exchange.
        conn.close().unwrap();
        server.join().unwrap();
    }

    #[test]
    fn test_failed_begin_worker_expunges_matched_channel() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            let (mut control, _) = listener.accept().unwrap();
            handshake(&mut control, 5);
            let (mut pooled, _) = listener.accept().unwrap();
            handshake(&mut pooled, 9);

            let mut reader = BufReader::new(control.try_clone().unwrap());
            assert_eq!(
                decode(&mut reader).unwrap(),
                Some(Value::Request(Request::BeginWorker))
            );
            assert_eq!(decode(&mut reader).unwrap(), Some(Value::Integer(9)));
            // Accept the pooled slave, then drop before the worker id.
            send(&mut control, &[Value::Integer(9)]);
            control.shutdown(Shutdown::Both).unwrap();
            pooled
        });

        let config = DataSourceConfig::new("127.0.0.1", port).with_pool_cap(0);
        let ds = Inner::new(config.clone(), Arc::new(DefaultErrorTranslator));
        let conn = ClientConnection::new(
            Channel::open(&config, ANY_SLAVE_ID, ds.translator()).unwrap(),
        );
        ds.push_port(Channel::open(&config, ANY_SLAVE_ID, ds.translator()).unwrap());

        let err = conn.begin_worker(&ds).unwrap_err();
        assert!(err.is_transport());
        assert!(!conn.is_open());
        assert!(ds.pop_port().is_none());
        assert_eq!(ds.trim_pool(), (0, vec![9]));
        let _pooled = server.join().unwrap();
    }
}
