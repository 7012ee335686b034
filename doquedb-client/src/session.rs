//! Sessions.

use crate::channel::Channel;
use crate::datasource::{Inner, State};
use crate::error::ClientError;
use crate::prepare::{PrepareState, PrepareStatement};
use crate::result_set::ResultSet;
use doquedb_protocol::{ProtocolVersion, Request, Value};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// User id asking the server to pick one.
pub const AUTO_USER_ID: i32 = -1;

/// Server-side state of a session, shared with the data source registry
/// and with the prepared statements it created.
#[derive(Debug)]
pub(crate) struct SessionState {
    id: AtomicI32,
    database: String,
    user: Option<String>,
    prepared: Mutex<HashMap<String, Arc<PrepareState>>>,
}

impl SessionState {
    pub fn new(id: i32, database: &str, user: Option<String>) -> Self {
        Self {
            id: AtomicI32::new(id),
            database: database.to_string(),
            user,
            prepared: Mutex::new(HashMap::new()),
        }
    }

    /// Session id, 0 once closed.
    pub fn id(&self) -> i32 {
        self.id.load(Ordering::Acquire)
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Marks the session closed and invalidates its cached prepared
    /// statements. The first call returns the session id and the prepare
    /// ids still to erase on the server; later calls return `None`.
    pub fn invalidate(&self) -> Option<(i32, Vec<i32>)> {
        let id = self.id.swap(0, Ordering::AcqRel);
        if id == 0 {
            return None;
        }
        let prepared = self
            .prepared
            .lock()
            .drain()
            .filter_map(|(_, prepared)| prepared.invalidate())
            .collect();
        Some((id, prepared))
    }

    pub fn forget_prepared(&self, sql: &str) {
        self.prepared.lock().remove(sql);
    }
}

/// A server execution context on one database.
///
/// Closing is best-effort and idempotent; dropping a session closes it.
pub struct Session {
    inner: Arc<Inner>,
    state: Arc<SessionState>,
}

impl Session {
    pub(crate) fn new(inner: Arc<Inner>, state: Arc<SessionState>) -> Self {
        Self { inner, state }
    }

    /// Session id, 0 once closed.
    pub fn id(&self) -> i32 {
        self.state.id()
    }

    pub fn database(&self) -> &str {
        &self.state.database
    }

    pub fn user(&self) -> Option<&str> {
        self.state.user()
    }

    pub fn is_valid(&self) -> bool {
        self.state.id() != 0 && self.inner.state() == State::Open
    }

    /// Sends `sql` with `params` and returns the result stream. The first
    /// status is read lazily by the result set.
    pub fn execute_statement(&self, sql: &str, params: &[Value]) -> Result<ResultSet, ClientError> {
        let session_id = self.session_id()?;
        tracing::debug!("Session {} executing: {}", session_id, sql);
        self.start(|c| {
            c.write_request(Request::ExecuteStatement)?;
            c.write_value(&Value::Integer(session_id))?;
            c.write_value(&Value::from(sql))?;
            c.write_value(&Value::Array(params.to_vec()))
        })
    }

    /// Executes a prepared statement with `params`.
    pub fn execute_prepared_statement(
        &self,
        prepare: &PrepareStatement,
        params: &[Value],
    ) -> Result<ResultSet, ClientError> {
        let session_id = self.session_id()?;
        let prepare_id = prepare.id();
        if prepare_id == 0 {
            return Err(ClientError::InvalidPrepareStatement);
        }
        tracing::debug!("Session {} executing prepared {}", session_id, prepare_id);
        self.start(|c| {
            c.write_request(Request::ExecutePrepareStatement)?;
            c.write_value(&Value::Integer(session_id))?;
            c.write_value(&Value::Integer(prepare_id))?;
            c.write_value(&Value::Array(params.to_vec()))
        })
    }

    /// Compiles `sql` on the server. Statements are cached per SQL text for
    /// the life of the session.
    pub fn create_prepared_statement(&self, sql: &str) -> Result<PrepareStatement, ClientError> {
        let session_id = self.session_id()?;
        self.require(ProtocolVersion::V3, "create_prepared_statement")?;

        let cached = self.state.prepared.lock().get(sql).cloned();
        if let Some(state) = cached.filter(|s| s.id() != 0) {
            return Ok(PrepareStatement::for_session(
                self.inner.clone(),
                self.state.clone(),
                state,
            ));
        }

        let prepare_id = self.inner.worker_exchange(|c| {
            c.write_request(Request::PrepareStatement2)?;
            c.write_value(&Value::Integer(session_id))?;
            c.write_value(&Value::from(sql))?;
            c.flush()?;
            let id = c.read_integer()?;
            c.expect_success()?;
            Ok(id)
        })?;

        let state = Arc::new(PrepareState::new(prepare_id, sql));
        self.state
            .prepared
            .lock()
            .insert(sql.to_string(), state.clone());
        tracing::debug!("Session {} prepared {} as {}", session_id, sql, prepare_id);
        Ok(PrepareStatement::for_session(
            self.inner.clone(),
            self.state.clone(),
            state,
        ))
    }

    /// Creates a user. `user_id` of `None` lets the server assign one.
    pub fn create_user(
        &self,
        user: &str,
        password: &str,
        user_id: Option<i32>,
    ) -> Result<(), ClientError> {
        let session_id = self.session_id()?;
        self.require(ProtocolVersion::V5, "create_user")?;
        self.simple_exchange(|c| {
            c.write_request(Request::CreateUser)?;
            c.write_value(&Value::Integer(session_id))?;
            c.write_value(&Value::from(user))?;
            c.write_value(&Value::from(password))?;
            c.write_value(&Value::Integer(user_id.unwrap_or(AUTO_USER_ID)))
        })
    }

    /// Drops a user, optionally revoking everything granted to it.
    pub fn drop_user(&self, user: &str, drop_grants: bool) -> Result<(), ClientError> {
        let session_id = self.session_id()?;
        self.require(ProtocolVersion::V5, "drop_user")?;
        self.simple_exchange(|c| {
            c.write_request(Request::DropUser)?;
            c.write_value(&Value::Integer(session_id))?;
            c.write_value(&Value::from(user))?;
            c.write_value(&Value::Integer(i32::from(drop_grants)))
        })
    }

    pub fn change_own_password(&self, password: &str) -> Result<(), ClientError> {
        let session_id = self.session_id()?;
        self.require(ProtocolVersion::V5, "change_own_password")?;
        self.simple_exchange(|c| {
            c.write_request(Request::ChangeOwnPassword)?;
            c.write_value(&Value::Integer(session_id))?;
            c.write_value(&Value::from(password))
        })
    }

    pub fn change_password(&self, user: &str, password: &str) -> Result<(), ClientError> {
        let session_id = self.session_id()?;
        self.require(ProtocolVersion::V5, "change_password")?;
        self.simple_exchange(|c| {
            c.write_request(Request::ChangePassword)?;
            c.write_value(&Value::Integer(session_id))?;
            c.write_value(&Value::from(user))?;
            c.write_value(&Value::from(password))
        })
    }

    /// Returns the server's product version string.
    pub fn query_product_version(&self) -> Result<String, ClientError> {
        let session_id = self.session_id()?;
        self.inner.worker_exchange(|c| {
            c.write_request(Request::QueryProductVersion)?;
            c.write_value(&Value::Integer(session_id))?;
            c.flush()?;
            let version = c.read_string()?;
            c.expect_success()?;
            Ok(version)
        })
    }

    /// Ends the session on the server. Failures are logged, never returned.
    pub fn close(&self) {
        self.inner.close_session(&self.state);
    }

    fn session_id(&self) -> Result<i32, ClientError> {
        match self.state.id() {
            0 => Err(ClientError::InvalidSession),
            id => Ok(id),
        }
    }

    fn require(&self, required: ProtocolVersion, operation: &'static str) -> Result<(), ClientError> {
        let negotiated = self.inner.master_id();
        if negotiated.at_least(required) {
            Ok(())
        } else {
            Err(ClientError::NotSupported {
                operation,
                required,
                negotiated,
            })
        }
    }

    fn start(
        &self,
        write: impl FnOnce(&mut Channel) -> Result<(), ClientError>,
    ) -> Result<ResultSet, ClientError> {
        let mut channel = self.inner.begin_worker()?;
        let sent = write(&mut channel).and_then(|()| channel.flush());
        if let Err(e) = sent {
            self.inner.release(channel, false);
            return Err(e);
        }
        Ok(ResultSet::new(self.inner.clone(), channel))
    }

    fn simple_exchange(
        &self,
        write: impl FnOnce(&mut Channel) -> Result<(), ClientError>,
    ) -> Result<(), ClientError> {
        self.inner.worker_exchange(|c| {
            write(c)?;
            c.flush()?;
            c.expect_success()
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("database", &self.database())
            .field("user", &self.user())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalidate_is_once() {
        let state = SessionState::new(7, "db", None);
        let prepared = Arc::new(PrepareState::new(3, "select 1"));
        state
            .prepared
            .lock()
            .insert("select 1".to_string(), prepared.clone());

        assert_eq!(state.invalidate(), Some((7, vec![3])));
        assert_eq!(state.id(), 0);
        assert_eq!(prepared.id(), 0);
        assert!(state.prepared.lock().is_empty());
        assert_eq!(state.invalidate(), None);
    }

    #[test]
    fn test_forget_prepared() {
        let state = SessionState::new(1, "db", Some("alice".to_string()));
        state
            .prepared
            .lock()
            .insert("q".to_string(), Arc::new(PrepareState::new(4, "q")));
        state.forget_prepared("q");
        assert!(state.prepared.lock().is_empty());
        assert_eq!(state.user(), Some("alice"));
    }
}
