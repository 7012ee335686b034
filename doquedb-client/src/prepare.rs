//! Prepared statement handles.

use crate::datasource::Inner;
use crate::session::SessionState;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Prepare id and SQL text, shared by every handle to the same statement.
#[derive(Debug)]
pub(crate) struct PrepareState {
    id: AtomicI32,
    sql: String,
}

impl PrepareState {
    pub fn new(id: i32, sql: &str) -> Self {
        Self {
            id: AtomicI32::new(id),
            sql: sql.to_string(),
        }
    }

    /// Prepare id, 0 once erased.
    pub fn id(&self) -> i32 {
        self.id.load(Ordering::Acquire)
    }

    /// Returns the id the first time only.
    pub fn invalidate(&self) -> Option<i32> {
        match self.id.swap(0, Ordering::AcqRel) {
            0 => None,
            id => Some(id),
        }
    }
}

#[derive(Clone)]
enum Owner {
    Session(Arc<SessionState>),
    Database(String),
}

/// A server-compiled statement.
///
/// Handles are cheap to clone and share one server statement; closing any
/// of them erases it for all.
#[derive(Clone)]
pub struct PrepareStatement {
    inner: Arc<Inner>,
    owner: Owner,
    state: Arc<PrepareState>,
}

impl PrepareStatement {
    pub(crate) fn for_session(
        inner: Arc<Inner>,
        session: Arc<SessionState>,
        state: Arc<PrepareState>,
    ) -> Self {
        Self {
            inner,
            owner: Owner::Session(session),
            state,
        }
    }

    pub(crate) fn for_database(inner: Arc<Inner>, database: &str, sql: &str, prepare_id: i32) -> Self {
        Self {
            inner,
            owner: Owner::Database(database.to_string()),
            state: Arc::new(PrepareState::new(prepare_id, sql)),
        }
    }

    /// Prepare id, 0 once closed.
    pub fn id(&self) -> i32 {
        self.state.id()
    }

    pub fn sql(&self) -> &str {
        &self.state.sql
    }

    pub fn is_valid(&self) -> bool {
        self.state.id() != 0
    }

    /// Erases the statement on the server. Idempotent; failures are logged.
    pub fn close(&self) {
        let Some(prepare_id) = self.state.invalidate() else { return };
        let result = match &self.owner {
            Owner::Session(session) => {
                session.forget_prepared(&self.state.sql);
                match session.id() {
                    // The server dropped it with the session.
                    0 => Ok(()),
                    session_id => self.inner.erase_session_prepared(session_id, prepare_id),
                }
            }
            Owner::Database(database) => self
                .inner
                .client_connection()
                .and_then(|conn| conn.erase_prepare_statement(database, prepare_id)),
        };
        match result {
            Ok(()) => tracing::debug!("Erased prepared statement {}", prepare_id),
            Err(e) => self.inner.swallow("erasing prepared statement", e),
        }
    }
}

impl std::fmt::Debug for PrepareStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrepareStatement")
            .field("id", &self.id())
            .field("sql", &self.sql())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalidate_sentinel() {
        let state = PrepareState::new(12, "select * from t");
        assert_eq!(state.id(), 12);
        assert_eq!(state.invalidate(), Some(12));
        assert_eq!(state.invalidate(), None);
        assert_eq!(state.id(), 0);
    }
}
