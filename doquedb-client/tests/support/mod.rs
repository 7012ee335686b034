//! Scripted in-process DoqueDB server for integration tests.
//!
//! Every accepted connection gets its own thread. The server echoes the
//! client's protocol word, hands out slave, session, worker and prepare ids
//! from counters, and answers EXECUTE_STATEMENT according to the SQL text:
//!
//! - `select ...` streams metadata, two rows, the end marker and SUCCESS
//! - `multi` sends HAS_MORE_DATA, then behaves like `select`
//! - `fail` raises a user-level error
//! - `slow` sends metadata, then waits for CANCEL_WORKER and ends CANCELED
//! - anything else answers SUCCESS

#![allow(dead_code)]

use bytes::{BufMut, BytesMut};
use doquedb_client::error::UNKNOWN_REQUEST_ERRNO;
use doquedb_client::DataSourceConfig;
use doquedb_protocol::{
    decode, ColumnMeta, ErrorLevel, ExceptionInfo, Request, ResultSetMeta, SqlType, Status, Tag,
    Value, ANY_SLAVE_ID,
};
use std::collections::{HashMap, HashSet};
use std::io::{BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Errno raised for the `fail` script.
pub const SYNTAX_ERRNO: i32 = 0x0001_0b01;

#[derive(Default)]
struct Shared {
    next_slave: AtomicI32,
    next_session: AtomicI32,
    next_worker: AtomicI32,
    next_prepare: AtomicI32,
    refuse: AtomicBool,
    end_session_delay_ms: AtomicU64,
    streams: Mutex<Vec<TcpStream>>,
    workers: Mutex<HashMap<i32, i32>>,
    cancelled: Mutex<HashSet<i32>>,
    requests: Mutex<Vec<Request>>,
    begin_worker_on: Mutex<Vec<i32>>,
    executed_on: Mutex<Vec<i32>>,
    reported: Mutex<Vec<Vec<i32>>>,
    erased: Mutex<Vec<i32>>,
    users: Mutex<Vec<String>>,
}

pub struct MockServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
}

impl MockServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let shared = Arc::new(Shared::default());
        shared.next_slave.store(100, Ordering::SeqCst);
        shared.next_session.store(1, Ordering::SeqCst);
        shared.next_worker.store(500, Ordering::SeqCst);
        shared.next_prepare.store(1, Ordering::SeqCst);

        let accept_shared = shared.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                if accept_shared.refuse.load(Ordering::SeqCst) {
                    drop(stream);
                    continue;
                }
                accept_shared
                    .streams
                    .lock()
                    .unwrap()
                    .push(stream.try_clone().unwrap());
                let shared = accept_shared.clone();
                thread::spawn(move || {
                    let _ = Handler::new(stream, shared).run();
                });
            }
        });

        Self { addr, shared }
    }

    /// Client configuration pointing at this server.
    pub fn config(&self) -> DataSourceConfig {
        DataSourceConfig::new("127.0.0.1", self.addr.port())
            .with_read_timeout(Some(Duration::from_secs(5)))
    }

    /// Drops every established connection, as a server restart would.
    pub fn break_connections(&self) {
        for stream in self.shared.streams.lock().unwrap().drain(..) {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    /// Makes new connections fail during the handshake.
    pub fn refuse_new(&self, refuse: bool) {
        self.shared.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Holds every END_SESSION reply back for `delay`.
    pub fn stall_end_session(&self, delay: Duration) {
        self.shared
            .end_session_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Slave id of the control connection each BEGIN_WORKER arrived on.
    pub fn begin_worker_slaves(&self) -> Vec<i32> {
        self.shared.begin_worker_on.lock().unwrap().clone()
    }

    /// Slave id of the channel each EXECUTE_STATEMENT arrived on.
    pub fn execute_slaves(&self) -> Vec<i32> {
        self.shared.executed_on.lock().unwrap().clone()
    }

    /// Requests received so far, in arrival order across all connections.
    pub fn requests(&self) -> Vec<Request> {
        self.shared.requests.lock().unwrap().clone()
    }

    pub fn count(&self, request: Request) -> usize {
        self.requests().iter().filter(|r| **r == request).count()
    }

    /// Id lists received in NO_REUSE_CONNECTION, one entry per report.
    pub fn reported(&self) -> Vec<Vec<i32>> {
        self.shared.reported.lock().unwrap().clone()
    }

    /// Prepare ids erased, by either erase request.
    pub fn erased(&self) -> Vec<i32> {
        self.shared.erased.lock().unwrap().clone()
    }

    pub fn users(&self) -> Vec<String> {
        self.shared.users.lock().unwrap().clone()
    }
}

/// Polls `check` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    check()
}

pub fn result_meta() -> ResultSetMeta {
    ResultSetMeta::new(vec![
        ColumnMeta::new(SqlType::Integer, "id"),
        ColumnMeta::new(SqlType::CharacterVarying, "name"),
    ])
}

pub fn row(id: i32, name: &str) -> Value {
    Value::Array(vec![Value::Integer(id), Value::from(name)])
}

struct Handler {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    shared: Arc<Shared>,
    slave_id: i32,
    /// Opened with ANY and not yet past its first BEGIN_CONNECTION.
    fresh: bool,
}

impl Handler {
    fn new(stream: TcpStream, shared: Arc<Shared>) -> Self {
        let writer = stream.try_clone().unwrap();
        Self {
            reader: BufReader::new(stream),
            writer,
            shared,
            slave_id: 0,
            fresh: false,
        }
    }

    fn run(mut self) -> std::io::Result<()> {
        let mut hello = [0u8; 8];
        self.reader.read_exact(&mut hello)?;
        let word = i32::from_be_bytes([hello[0], hello[1], hello[2], hello[3]]);
        let requested = i32::from_be_bytes([hello[4], hello[5], hello[6], hello[7]]);
        self.fresh = requested == ANY_SLAVE_ID;
        self.slave_id = if self.fresh {
            self.shared.next_slave.fetch_add(1, Ordering::SeqCst)
        } else {
            requested
        };
        let mut reply = BytesMut::new();
        reply.put_i32(word);
        reply.put_i32(self.slave_id);
        self.writer.write_all(&reply)?;

        loop {
            let request = match decode(&mut self.reader) {
                Ok(Some(Value::Request(request))) => request,
                _ => return Ok(()),
            };
            self.shared.requests.lock().unwrap().push(request);
            self.handle(request)?;
        }
    }

    fn arg(&mut self) -> Value {
        decode(&mut self.reader).unwrap().unwrap()
    }

    fn int_arg(&mut self) -> i32 {
        match self.arg() {
            Value::Integer(v) => v,
            other => panic!("expected integer argument, got {:?}", other),
        }
    }

    fn string_arg(&mut self) -> String {
        match self.arg() {
            Value::String(s) => s,
            other => panic!("expected string argument, got {:?}", other),
        }
    }

    fn send(&mut self, values: &[Value]) -> std::io::Result<()> {
        let mut buf = BytesMut::new();
        for v in values {
            v.encode(&mut buf);
        }
        self.writer.write_all(&buf)
    }

    fn send_end_of_data(&mut self) -> std::io::Result<()> {
        let mut buf = BytesMut::new();
        buf.put_i32(Tag::None.code());
        self.writer.write_all(&buf)
    }

    fn success(&mut self) -> std::io::Result<()> {
        self.send(&[Value::Status(Status::Success)])
    }

    fn user_error(&mut self, errno: i32, arg: &str) -> std::io::Result<()> {
        self.send(&[
            Value::ErrorLevel(ErrorLevel::User),
            Value::ExceptionInfo(ExceptionInfo::new(errno).with_arg(arg)),
        ])
    }

    fn handle(&mut self, request: Request) -> std::io::Result<()> {
        match request {
            Request::BeginConnection => {
                let _host = self.string_arg();
                if self.fresh {
                    self.fresh = false;
                    self.success()
                } else {
                    let slave = self.shared.next_slave.fetch_add(1, Ordering::SeqCst);
                    self.send(&[Value::Integer(slave), Value::Status(Status::Success)])
                }
            }
            Request::EndConnection => self.success(),
            Request::BeginWorker => {
                let preferred = self.int_arg();
                self.shared.begin_worker_on.lock().unwrap().push(self.slave_id);
                let slave = if preferred == ANY_SLAVE_ID {
                    self.shared.next_slave.fetch_add(1, Ordering::SeqCst)
                } else {
                    preferred
                };
                let worker = self.shared.next_worker.fetch_add(1, Ordering::SeqCst);
                self.shared.workers.lock().unwrap().insert(slave, worker);
                self.send(&[
                    Value::Integer(slave),
                    Value::Integer(worker),
                    Value::Status(Status::Success),
                ])
            }
            Request::CancelWorker => {
                let worker = self.int_arg();
                self.shared.cancelled.lock().unwrap().insert(worker);
                self.success()
            }
            Request::BeginSession => {
                let _database = self.string_arg();
                self.begin_session()
            }
            Request::BeginSession2 => {
                let _database = self.string_arg();
                let _user = self.string_arg();
                let _password = self.string_arg();
                self.begin_session()
            }
            Request::EndSession | Request::EndSession2 => {
                let _session = self.int_arg();
                let delay = self.shared.end_session_delay_ms.load(Ordering::SeqCst);
                if delay > 0 {
                    thread::sleep(Duration::from_millis(delay));
                }
                self.success()
            }
            Request::ExecuteStatement => {
                self.shared.executed_on.lock().unwrap().push(self.slave_id);
                let _session = self.int_arg();
                let sql = self.string_arg();
                let _params = self.arg();
                self.execute(&sql)
            }
            Request::ExecutePrepareStatement => {
                let _session = self.int_arg();
                let _prepare = self.int_arg();
                let _params = self.arg();
                self.execute("select")
            }
            Request::PrepareStatement => {
                let _database = self.string_arg();
                let _sql = self.string_arg();
                self.prepare()
            }
            Request::PrepareStatement2 => {
                let _session = self.int_arg();
                let _sql = self.string_arg();
                self.prepare()
            }
            Request::ErasePrepareStatement => {
                let _database = self.string_arg();
                let id = self.int_arg();
                self.shared.erased.lock().unwrap().push(id);
                self.success()
            }
            Request::ErasePrepareStatement2 => {
                let _session = self.int_arg();
                let id = self.int_arg();
                self.shared.erased.lock().unwrap().push(id);
                self.success()
            }
            Request::NoReuseConnection => {
                let ids = match self.arg() {
                    Value::IntegerArray(ids) => ids,
                    other => panic!("expected id array, got {:?}", other),
                };
                self.shared.reported.lock().unwrap().push(ids);
                self.success()
            }
            Request::ReuseConnection => self.success(),
            Request::CheckAvailability => {
                if self.int_arg() == 1 {
                    let _database = self.int_arg();
                }
                self.send(&[Value::Integer(1), Value::Status(Status::Success)])
            }
            Request::Shutdown2 => {
                let _user = self.string_arg();
                let _password = self.string_arg();
                self.user_error(UNKNOWN_REQUEST_ERRNO, "Shutdown2")
            }
            Request::Shutdown => self.success(),
            Request::QueryProductVersion => {
                let _session = self.int_arg();
                self.send(&[
                    Value::from("DoqueDB mock 16.0"),
                    Value::Status(Status::Success),
                ])
            }
            Request::CreateUser => {
                let _session = self.int_arg();
                let user = self.string_arg();
                let _password = self.string_arg();
                let _id = self.int_arg();
                self.shared.users.lock().unwrap().push(user);
                self.success()
            }
            Request::DropUser => {
                let _session = self.int_arg();
                let user = self.string_arg();
                let _grants = self.int_arg();
                self.shared.users.lock().unwrap().retain(|u| *u != user);
                self.success()
            }
            Request::ChangeOwnPassword => {
                let _session = self.int_arg();
                let _password = self.string_arg();
                self.success()
            }
            Request::ChangePassword => {
                let _session = self.int_arg();
                let _user = self.string_arg();
                let _password = self.string_arg();
                self.success()
            }
        }
    }

    fn begin_session(&mut self) -> std::io::Result<()> {
        let session = self.shared.next_session.fetch_add(1, Ordering::SeqCst);
        self.send(&[Value::Integer(session), Value::Status(Status::Success)])
    }

    fn prepare(&mut self) -> std::io::Result<()> {
        let id = self.shared.next_prepare.fetch_add(1, Ordering::SeqCst);
        self.send(&[Value::Integer(id), Value::Status(Status::Success)])
    }

    fn execute(&mut self, sql: &str) -> std::io::Result<()> {
        if sql.starts_with("select") {
            self.send(&[
                Value::ResultSetMeta(result_meta()),
                row(1, "alpha"),
                row(2, "beta"),
            ])?;
            self.send_end_of_data()?;
            self.success()
        } else if sql == "multi" {
            self.send(&[Value::Status(Status::HasMoreData)])?;
            self.execute("select")
        } else if sql == "fail" {
            self.user_error(SYNTAX_ERRNO, "fail")
        } else if sql == "slow" {
            self.send(&[Value::ResultSetMeta(result_meta())])?;
            let worker = self.shared.workers.lock().unwrap().get(&self.slave_id).copied();
            let cancelled = wait_for(Duration::from_secs(5), || {
                worker.map_or(false, |w| self.shared.cancelled.lock().unwrap().contains(&w))
            });
            if cancelled {
                self.send(&[Value::Status(Status::Canceled)])
            } else {
                self.success()
            }
        } else {
            self.success()
        }
    }
}
