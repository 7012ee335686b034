//! Connection pool.
//!
//! A [`DataSource`] owns three independently locked structures:
//! - the round-robin list of control connections,
//! - the pool of idle worker channels keyed by slave id (plus the ids of
//!   channels discarded client-side),
//! - the registry of live sessions.
//!
//! A background reaper trims the idle pool and reports evicted channels to
//! the server (see [`crate::maintenance`]).

use crate::channel::Channel;
use crate::config::DataSourceConfig;
use crate::connection::{local_host_name, ClientConnection};
use crate::error::{ClientError, DefaultErrorTranslator, ErrorTranslator};
use crate::maintenance::{MaintenanceCounters, MaintenanceStats, Reaper};
use crate::prepare::PrepareStatement;
use crate::session::{Session, SessionState};
use doquedb_protocol::version::handshake_word;
use doquedb_protocol::{AuthMode, AvailabilityTarget, ProtocolVersion, Request, Value, ANY_SLAVE_ID};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Pooled connection entry point.
///
/// Dropping a data source closes it.
pub struct DataSource {
    inner: Arc<Inner>,
}

impl DataSource {
    /// Creates a closed data source.
    pub fn new(config: DataSourceConfig) -> Self {
        Self::with_error_translator(config, Arc::new(DefaultErrorTranslator))
    }

    /// Creates a closed data source that maps server exceptions with `translator`.
    pub fn with_error_translator(
        config: DataSourceConfig,
        translator: Arc<dyn ErrorTranslator>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner::new(config, translator)),
        }
    }

    /// Opens the first control connection and starts the reaper.
    pub fn open(&self) -> Result<(), ClientError> {
        self.inner.open()
    }

    /// Stops the reaper and closes every session, control connection and
    /// pooled channel. Safe to call more than once.
    pub fn close(&self) {
        self.inner.close();
    }

    pub fn is_open(&self) -> bool {
        self.inner.state() == State::Open
    }

    pub fn config(&self) -> &DataSourceConfig {
        &self.inner.config
    }

    /// Creates a session on `database`.
    pub fn create_session(&self, database: &str) -> Result<Session, ClientError> {
        self.inner.create_session(database, None)
    }

    /// Creates an authenticated session. Servers older than protocol v5 have
    /// no user management; the credentials are dropped and a plain session
    /// is created.
    pub fn create_session_with_credentials(
        &self,
        database: &str,
        user: &str,
        password: &str,
    ) -> Result<Session, ClientError> {
        if !self.master_id().at_least(ProtocolVersion::V5) {
            tracing::debug!("Server speaks {}, ignoring credentials", self.master_id());
            return self.create_session(database);
        }
        self.inner.create_session(database, Some((user, password)))
    }

    /// Prepares `sql` against `database`, independent of any session.
    pub fn create_prepare_statement(
        &self,
        database: &str,
        sql: &str,
    ) -> Result<PrepareStatement, ClientError> {
        let prepare_id = self.inner.worker_exchange(|c| {
            c.write_request(Request::PrepareStatement)?;
            c.write_value(&Value::from(database))?;
            c.write_value(&Value::from(sql))?;
            c.flush()?;
            let id = c.read_integer()?;
            c.expect_success()?;
            Ok(id)
        })?;
        Ok(PrepareStatement::for_database(
            self.inner.clone(),
            database,
            sql,
            prepare_id,
        ))
    }

    /// Stops the server.
    pub fn shutdown(&self) -> Result<(), ClientError> {
        self.inner.shutdown(None)
    }

    /// Stops a server that requires authentication. Falls back to the plain
    /// request when the server does not know the authenticated one.
    pub fn shutdown_with_credentials(&self, user: &str, password: &str) -> Result<(), ClientError> {
        match self.inner.shutdown(Some((user, password))) {
            Err(ClientError::UnknownRequest(e)) => {
                tracing::debug!("SHUTDOWN2 not understood ({}), retrying with SHUTDOWN", e);
                self.inner.shutdown(None)
            }
            other => other,
        }
    }

    pub fn is_server_available(&self) -> Result<bool, ClientError> {
        self.inner
            .client_connection()?
            .check_availability(AvailabilityTarget::Server)
    }

    /// Checks one database, or all of them with [`AvailabilityTarget::DATABASE_ALL`].
    pub fn is_database_available(&self, database_id: u32) -> Result<bool, ClientError> {
        self.inner
            .client_connection()?
            .check_availability(AvailabilityTarget::Database(database_id))
    }

    /// Protocol version the server agreed to on open.
    pub fn master_id(&self) -> ProtocolVersion {
        self.inner.master_id()
    }

    pub fn authorization(&self) -> AuthMode {
        self.inner.authorization()
    }

    /// Runs one maintenance cycle immediately.
    pub fn maintain(&self) {
        crate::maintenance::run_cycle(&self.inner);
    }

    pub fn stats(&self) -> MaintenanceStats {
        self.inner.counters.snapshot()
    }

    pub fn session_count(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.lock().list.len()
    }

    pub fn pooled_channels(&self) -> usize {
        self.inner.pool.lock().ports.len()
    }
}

impl Drop for DataSource {
    fn drop(&mut self) {
        self.inner.close();
    }
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource")
            .field("addr", &self.inner.config.addr())
            .field("state", &self.inner.state())
            .field("connections", &self.connection_count())
            .field("sessions", &self.session_count())
            .field("pooled", &self.pooled_channels())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    Closed,
    Open,
    /// `close` is ending sessions outside the lifecycle lock.
    Closing,
    /// Closed by a failed reconnect; the next session request reopens.
    Broken,
}

struct Lifecycle {
    state: State,
    reaper: Option<Reaper>,
}

#[derive(Default)]
struct ConnectionList {
    list: Vec<Arc<ClientConnection>>,
    next: usize,
    /// Set once a dead connection was pruned; cleared on open and close.
    lost: bool,
}

impl ConnectionList {
    fn take_all(&mut self) -> Vec<Arc<ClientConnection>> {
        self.next = 0;
        self.lost = false;
        std::mem::take(&mut self.list)
    }

    /// Next live connection, round-robin. Connections whose channel died in
    /// an earlier exchange are dropped from the rotation.
    fn next(&mut self) -> Option<Arc<ClientConnection>> {
        let before = self.list.len();
        self.list.retain(|conn| conn.is_open());
        if self.list.len() < before {
            tracing::warn!(
                "Dropped {} dead control connection(s), {} left",
                before - self.list.len(),
                self.list.len()
            );
            self.lost = true;
        }
        if self.list.is_empty() {
            return None;
        }
        if self.next >= self.list.len() {
            self.next = 0;
        }
        let conn = self.list[self.next].clone();
        self.next += 1;
        Some(conn)
    }
}

struct PooledChannel {
    seq: u64,
    channel: Channel,
}

#[derive(Default)]
struct PortPool {
    ports: HashMap<i32, PooledChannel>,
    expunged: Vec<i32>,
    seq: u64,
}

/// Shared state behind a [`DataSource`], also held by its sessions, result
/// sets and prepared statements.
pub(crate) struct Inner {
    config: DataSourceConfig,
    translator: Arc<dyn ErrorTranslator>,
    lifecycle: Mutex<Lifecycle>,
    connections: Mutex<ConnectionList>,
    pool: Mutex<PortPool>,
    sessions: Mutex<HashMap<i32, Arc<SessionState>>>,
    master_word: AtomicI32,
    pub(crate) counters: MaintenanceCounters,
}

impl Inner {
    pub(crate) fn new(config: DataSourceConfig, translator: Arc<dyn ErrorTranslator>) -> Self {
        Self {
            config,
            translator,
            lifecycle: Mutex::new(Lifecycle {
                state: State::Closed,
                reaper: None,
            }),
            connections: Mutex::new(ConnectionList::default()),
            pool: Mutex::new(PortPool::default()),
            sessions: Mutex::new(HashMap::new()),
            master_word: AtomicI32::new(0),
            counters: MaintenanceCounters::default(),
        }
    }

    pub(crate) fn config(&self) -> &DataSourceConfig {
        &self.config
    }

    pub(crate) fn translator(&self) -> Arc<dyn ErrorTranslator> {
        self.translator.clone()
    }

    pub(crate) fn state(&self) -> State {
        self.lifecycle.lock().state
    }

    pub(crate) fn master_id(&self) -> ProtocolVersion {
        ProtocolVersion::from_word(self.master_word.load(Ordering::Acquire))
    }

    pub(crate) fn authorization(&self) -> AuthMode {
        AuthMode::from_word(self.master_word.load(Ordering::Acquire))
    }

    fn open(self: &Arc<Self>) -> Result<(), ClientError> {
        let mut life = self.lifecycle.lock();
        if life.state == State::Open {
            return Ok(());
        }
        self.open_locked(&mut life)
    }

    fn open_locked(self: &Arc<Self>, life: &mut Lifecycle) -> Result<(), ClientError> {
        self.config.validate()?;
        let mut channel = Channel::open(&self.config, ANY_SLAVE_ID, self.translator())?;
        let host = local_host_name(&channel);
        channel.write_request(Request::BeginConnection)?;
        channel.write_value(&Value::String(host))?;
        channel.flush()?;
        channel.expect_success()?;

        let master = channel.master_id();
        let auth = channel.authorization();
        self.master_word
            .store(handshake_word(master, auth), Ordering::Release);
        {
            let mut conns = self.connections.lock();
            conns.list.push(Arc::new(ClientConnection::new(channel)));
            conns.next = 0;
            conns.lost = false;
        }

        if life.reaper.is_none() {
            life.reaper = Some(Reaper::start(
                Arc::downgrade(self),
                self.config.check_pool_period(),
            )?);
        }
        life.state = State::Open;
        tracing::info!(
            "Data source open on {} (protocol={}, auth={:?})",
            self.config.addr(),
            master,
            auth
        );
        Ok(())
    }

    /// Ends live sessions without holding the lifecycle lock, then closes
    /// the control connections and the pool. A concurrent `close` returns
    /// at once; a concurrent `open` wins and keeps the source open.
    fn close(&self) {
        let sessions: Vec<Arc<SessionState>> = {
            let mut life = self.lifecycle.lock();
            if let Some(reaper) = life.reaper.take() {
                reaper.stop();
            }
            match life.state {
                State::Open => {}
                State::Closing => return,
                State::Closed | State::Broken => {
                    life.state = State::Closed;
                    return;
                }
            }
            life.state = State::Closing;
            self.sessions.lock().values().cloned().collect()
        };

        for session in sessions {
            self.close_session(&session);
        }

        let mut life = self.lifecycle.lock();
        if life.state != State::Closing {
            return;
        }
        self.release_connections();
        life.state = State::Closed;
        tracing::info!("Data source on {} closed", self.config.addr());
    }

    /// Closes every control connection and pooled channel.
    fn release_connections(&self) {
        let connections = self.connections.lock().take_all();
        for conn in connections {
            if let Err(e) = conn.close() {
                self.swallow("closing control connection", e);
            }
        }

        let mut pool = self.pool.lock();
        pool.ports.clear();
        pool.expunged.clear();
    }

    /// Closes everything and opens again, assuming the server restarted.
    /// Only called with no live session.
    fn reset(self: &Arc<Self>) -> Result<(), ClientError> {
        let mut life = self.lifecycle.lock();
        match life.state {
            State::Closed | State::Closing => return Err(ClientError::NotOpen),
            State::Open => {
                if let Some(reaper) = life.reaper.take() {
                    reaper.stop();
                }
                self.release_connections();
                life.state = State::Broken;
            }
            State::Broken => {}
        }
        self.open_locked(&mut life)
    }

    fn reopen_if_broken(self: &Arc<Self>) -> Result<(), ClientError> {
        let mut life = self.lifecycle.lock();
        match life.state {
            State::Open => Ok(()),
            State::Closed | State::Closing => Err(ClientError::NotOpen),
            State::Broken => {
                tracing::info!("Reopening data source on {}", self.config.addr());
                self.open_locked(&mut life)
            }
        }
    }

    /// Picks the next control connection, round-robin.
    pub(crate) fn client_connection(&self) -> Result<Arc<ClientConnection>, ClientError> {
        let mut conns = self.connections.lock();
        match conns.next() {
            Some(conn) => Ok(conn),
            None if conns.lost => Err(ClientError::ConnectionLost),
            None => Err(ClientError::NotOpen),
        }
    }

    pub(crate) fn begin_worker(&self) -> Result<Channel, ClientError> {
        self.client_connection()?.begin_worker(self)
    }

    /// Runs one request/response exchange on a worker channel, then pools
    /// the channel or closes it.
    pub(crate) fn worker_exchange<T>(
        &self,
        f: impl FnOnce(&mut Channel) -> Result<T, ClientError>,
    ) -> Result<T, ClientError> {
        let mut channel = self.begin_worker()?;
        let result = f(&mut channel);
        self.release(channel, result.is_ok());
        result
    }

    /// Returns a channel after use: pooled when the exchange succeeded or
    /// the server error left it reusable, closed otherwise.
    pub(crate) fn release(&self, channel: Channel, succeeded: bool) {
        if channel.is_open() && (succeeded || channel.is_reusable()) {
            self.push_port(channel);
        } else {
            tracing::debug!("Discarding channel on slave {}", channel.slave_id());
        }
    }

    /// Removes an idle channel from the pool, most recently pooled first.
    pub(crate) fn pop_port(&self) -> Option<Channel> {
        let mut pool = self.pool.lock();
        let slave_id = pool
            .ports
            .iter()
            .max_by_key(|(_, pooled)| pooled.seq)
            .map(|(id, _)| *id)?;
        pool.ports.remove(&slave_id).map(|pooled| pooled.channel)
    }

    /// Resets a channel and returns it to the pool.
    pub(crate) fn push_port(&self, mut channel: Channel) {
        channel.reset();
        if !channel.is_open() {
            return;
        }
        let mut pool = self.pool.lock();
        pool.seq += 1;
        let seq = pool.seq;
        pool.ports
            .insert(channel.slave_id(), PooledChannel { seq, channel });
    }

    /// Closes a channel and remembers its id for the next eviction report.
    pub(crate) fn expunge_port(&self, mut channel: Channel) {
        let mut pool = self.pool.lock();
        pool.expunged.push(channel.slave_id());
        channel.close();
    }

    /// Evicts the oldest idle channels beyond the configured cap once the
    /// pool plus discarded ids exceed it. Returns the ids to report, evicted
    /// first, then discarded.
    pub(crate) fn trim_pool(&self) -> (usize, Vec<i32>) {
        let cap = self.config.max_pooled_channels;
        let mut pool = self.pool.lock();
        if pool.ports.len() + pool.expunged.len() <= cap {
            return (0, Vec::new());
        }

        let surplus = pool.ports.len().saturating_sub(cap);
        let mut by_age: Vec<(u64, i32)> = pool
            .ports
            .iter()
            .map(|(id, pooled)| (pooled.seq, *id))
            .collect();
        by_age.sort_unstable();

        let mut ids = Vec::with_capacity(surplus + pool.expunged.len());
        for (_, id) in by_age.into_iter().take(surplus) {
            if let Some(mut pooled) = pool.ports.remove(&id) {
                pooled.channel.close();
                ids.push(id);
            }
        }
        let evicted = ids.len();
        ids.append(&mut pool.expunged);
        (evicted, ids)
    }

    fn create_session(
        self: &Arc<Self>,
        database: &str,
        credentials: Option<(&str, &str)>,
    ) -> Result<Session, ClientError> {
        let mut channel = self.session_worker()?;

        let exchange = (|| -> Result<i32, ClientError> {
            match credentials {
                Some((user, password)) => {
                    channel.write_request(Request::BeginSession2)?;
                    channel.write_value(&Value::from(database))?;
                    channel.write_value(&Value::from(user))?;
                    channel.write_value(&Value::from(password))?;
                }
                None => {
                    channel.write_request(Request::BeginSession)?;
                    channel.write_value(&Value::from(database))?;
                }
            }
            channel.flush()?;
            let id = channel.read_integer()?;
            channel.expect_success()?;
            Ok(id)
        })();
        self.release(channel, exchange.is_ok());
        let session_id = exchange?;

        let state = Arc::new(SessionState::new(
            session_id,
            database,
            credentials.map(|(user, _)| user.to_string()),
        ));
        self.sessions.lock().insert(session_id, state.clone());
        tracing::debug!("Began session {} on '{}'", session_id, database);

        self.grow_connections();
        Ok(Session::new(self.clone(), state))
    }

    /// Starts the worker for a new session. A transport failure while no
    /// session is live triggers one full reconnect; with live sessions the
    /// failure surfaces unchanged.
    fn session_worker(self: &Arc<Self>) -> Result<Channel, ClientError> {
        self.reopen_if_broken()?;
        match self.begin_worker() {
            Err(e) if e.is_transport() && !self.has_sessions() => {
                self.counters.record_reconnect();
                tracing::warn!("Lost connection to {} ({}), reconnecting", self.config.addr(), e);
                match self.reset().and_then(|()| self.begin_worker()) {
                    Ok(channel) => Ok(channel),
                    Err(retry) => {
                        tracing::debug!("Reconnect failed: {}", retry);
                        Err(e)
                    }
                }
            }
            other => other,
        }
    }

    /// Opens another control connection once live sessions exceed the
    /// threshold per connection.
    fn grow_connections(&self) {
        let sessions = self.sessions.lock().len();
        let count = self.connections.lock().list.len();
        if count == 0 || sessions <= self.config.connection_threshold * count {
            return;
        }
        let result = self
            .client_connection()
            .and_then(|conn| conn.begin_connection(self));
        match result {
            Ok(sibling) => {
                let mut conns = self.connections.lock();
                conns.list.push(Arc::new(sibling));
                self.counters.record_connection_spawned();
                tracing::info!(
                    "Opened control connection #{} ({} sessions)",
                    conns.list.len(),
                    sessions
                );
            }
            Err(e) => tracing::warn!("Failed to open another control connection: {}", e),
        }
    }

    pub(crate) fn has_sessions(&self) -> bool {
        !self.sessions.lock().is_empty()
    }

    /// Erases the session's cached prepared statements, then ends it on the
    /// server. Idempotent; failures are logged.
    pub(crate) fn close_session(&self, state: &SessionState) {
        let Some((session_id, prepared)) = state.invalidate() else { return };
        self.sessions.lock().remove(&session_id);

        for prepare_id in prepared {
            if let Err(e) = self.erase_session_prepared(session_id, prepare_id) {
                self.swallow("erasing prepared statement", e);
            }
        }

        let request = if state.user().is_some() {
            Request::EndSession2
        } else {
            Request::EndSession
        };
        let result = self.worker_exchange(|c| {
            c.write_request(request)?;
            c.write_value(&Value::Integer(session_id))?;
            c.flush()?;
            c.expect_success()
        });
        match result {
            Ok(()) => tracing::debug!("Ended session {}", session_id),
            Err(e) => self.swallow("ending session", e),
        }
    }

    pub(crate) fn erase_session_prepared(
        &self,
        session_id: i32,
        prepare_id: i32,
    ) -> Result<(), ClientError> {
        self.worker_exchange(|c| {
            c.write_request(Request::ErasePrepareStatement2)?;
            c.write_value(&Value::Integer(session_id))?;
            c.write_value(&Value::Integer(prepare_id))?;
            c.flush()?;
            c.expect_success()
        })
    }

    fn shutdown(&self, credentials: Option<(&str, &str)>) -> Result<(), ClientError> {
        let mut channel = Channel::open(&self.config, ANY_SLAVE_ID, self.translator())?;
        match credentials {
            Some((user, password)) => {
                channel.write_request(Request::Shutdown2)?;
                channel.write_value(&Value::from(user))?;
                channel.write_value(&Value::from(password))?;
            }
            None => channel.write_request(Request::Shutdown)?,
        }
        channel.flush()?;
        let result = channel.expect_success();
        channel.close();
        if result.is_ok() {
            tracing::info!("Server on {} shut down", self.config.addr());
        }
        result
    }

    /// Logs a failure on a best-effort teardown path and counts it.
    pub(crate) fn swallow(&self, what: &str, error: ClientError) {
        tracing::warn!("Ignoring failure while {}: {}", what, error);
        self.counters.record_swallowed();
    }
}
