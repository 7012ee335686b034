//! Result streaming.
//!
//! A [`ResultSet`] owns its worker channel and advances one decoded value
//! at a time:
//!
//! | Value read          | Status            |
//! |---------------------|-------------------|
//! | `ResultSetMeta`     | `MetaData`        |
//! | row (`DataArray`)   | `Data`            |
//! | end-of-data marker  | `EndOfData`       |
//! | `Status` value      | `Success`, `Canceled` or `HasMoreData` |
//! | server error        | `Error`           |
//!
//! The channel goes back to the pool on `Success`, on `Canceled` when the
//! server speaks protocol v3 or later, and on a user-level error. Any other
//! terminal state closes it. Either way it is released exactly once.

use crate::channel::Channel;
use crate::datasource::Inner;
use crate::error::ClientError;
use doquedb_protocol::{ProtocolError, ProtocolVersion, ResultSetMeta, Status, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Position of a result set in its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultStatus {
    MetaData,
    Data,
    EndOfData,
    /// One statement of a compound script finished; more results follow.
    HasMoreData,
    Success,
    Canceled,
    Error,
}

impl ResultStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ResultStatus::Success | ResultStatus::Canceled | ResultStatus::Error
        )
    }
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResultStatus::MetaData => "META_DATA",
            ResultStatus::Data => "DATA",
            ResultStatus::EndOfData => "END_OF_DATA",
            ResultStatus::HasMoreData => "HAS_MORE_DATA",
            ResultStatus::Success => "SUCCESS",
            ResultStatus::Canceled => "CANCELED",
            ResultStatus::Error => "ERROR",
        };
        write!(f, "{}", s)
    }
}

/// Rows and statuses of one executed statement.
pub struct ResultSet {
    inner: Arc<Inner>,
    channel: Option<Channel>,
    worker_id: i32,
    status: ResultStatus,
    meta: Option<ResultSetMeta>,
    row: Value,
    released: Arc<AtomicBool>,
}

impl ResultSet {
    pub(crate) fn new(inner: Arc<Inner>, channel: Channel) -> Self {
        Self {
            inner,
            worker_id: channel.worker_id(),
            channel: Some(channel),
            status: ResultStatus::Data,
            meta: None,
            row: Value::Null,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn status(&self) -> ResultStatus {
        self.status
    }

    /// Column descriptions of the current statement, once read.
    pub fn meta(&self) -> Option<&ResultSetMeta> {
        self.meta.as_ref()
    }

    /// The row decoded by the last `Data` step.
    pub fn row(&self) -> &Value {
        &self.row
    }

    /// Whether the result set still holds its channel.
    pub fn holds_channel(&self) -> bool {
        self.channel.is_some()
    }

    /// Reads one value and returns the new status. On `Data` the row is
    /// copied into `tuple`, reusing its allocation.
    pub fn get_next_tuple(&mut self, tuple: &mut Value) -> Result<ResultStatus, ClientError> {
        let status = self.step()?;
        if status == ResultStatus::Data {
            tuple.clone_from(&self.row);
        }
        Ok(status)
    }

    /// Reads until a terminal status. Unless `skip_all` is set, also stops
    /// at the end of the first statement of a compound script.
    pub fn get_status(&mut self, skip_all: bool) -> Result<ResultStatus, ClientError> {
        loop {
            match self.step()? {
                status if status.is_terminal() => return Ok(status),
                ResultStatus::HasMoreData if !skip_all => return Ok(ResultStatus::HasMoreData),
                _ => {}
            }
        }
    }

    /// Asks the server to stop the statement. The data channel then ends
    /// with `Canceled`, which a following read observes.
    pub fn cancel(&self) -> Result<(), ClientError> {
        self.cancel_handle().cancel()
    }

    /// Returns a handle that cancels this statement from another thread,
    /// typically while this one is blocked in [`get_status`](Self::get_status).
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            inner: self.inner.clone(),
            worker_id: self.worker_id,
            released: self.released.clone(),
        }
    }

    /// Iterates over the rows of the current statement.
    pub fn rows(&mut self) -> Rows<'_> {
        Rows {
            result_set: self,
            done: false,
        }
    }

    /// Drains the stream to its terminal status, releasing the channel.
    pub fn close(&mut self) -> Result<ResultStatus, ClientError> {
        if self.status.is_terminal() {
            return Ok(self.status);
        }
        self.get_status(true)
    }

    fn step(&mut self) -> Result<ResultStatus, ClientError> {
        if self.status.is_terminal() {
            return Ok(self.status);
        }
        let Some(channel) = self.channel.as_mut() else {
            return Ok(self.status);
        };

        let read = channel.read_value_into(&mut self.row);
        match read {
            Ok(false) => self.status = ResultStatus::EndOfData,
            Ok(true) => self.on_value()?,
            Err(e) => {
                self.status = ResultStatus::Error;
                let reusable = self.channel.as_ref().map_or(false, Channel::is_reusable);
                self.release(reusable);
                return Err(e);
            }
        }
        Ok(self.status)
    }

    fn on_value(&mut self) -> Result<(), ClientError> {
        match std::mem::replace(&mut self.row, Value::Null) {
            Value::ResultSetMeta(meta) => {
                self.row = meta.row_template();
                self.meta = Some(meta);
                self.status = ResultStatus::MetaData;
            }
            row @ Value::Array(_) => {
                self.row = row;
                self.status = ResultStatus::Data;
            }
            Value::Status(status) => {
                self.restore_row_shape();
                self.on_status(status);
            }
            other => {
                self.status = ResultStatus::Error;
                if let Some(channel) = self.channel.as_mut() {
                    channel.close();
                }
                self.release(false);
                return Err(ProtocolError::UnexpectedType {
                    expected: "result value",
                    actual: other.type_name(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn on_status(&mut self, status: Status) {
        match status {
            Status::Success => {
                self.status = ResultStatus::Success;
                self.release(true);
            }
            Status::Canceled => {
                self.status = ResultStatus::Canceled;
                let reuse = self.inner.master_id().at_least(ProtocolVersion::V3);
                self.release(reuse);
            }
            Status::HasMoreData => self.status = ResultStatus::HasMoreData,
            Status::Error => {
                self.status = ResultStatus::Error;
                self.release(false);
            }
        }
    }

    /// Puts the row buffer back in the shape of the current columns after a
    /// status value was decoded into it.
    fn restore_row_shape(&mut self) {
        self.row = match &self.meta {
            Some(meta) => meta.row_template(),
            None => Value::Null,
        };
    }

    fn release(&mut self, reuse: bool) {
        if let Some(channel) = self.channel.take() {
            self.released.store(true, Ordering::Release);
            tracing::debug!(
                "Releasing channel {} at {} (reuse={})",
                channel.slave_id(),
                self.status,
                reuse
            );
            if reuse {
                self.inner.push_port(channel);
            }
        }
    }
}

impl Drop for ResultSet {
    fn drop(&mut self) {
        if self.channel.is_none() {
            return;
        }
        if let Err(e) = self.close() {
            self.inner.swallow("draining result set", e);
        }
    }
}

impl std::fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("status", &self.status)
            .field("worker_id", &self.worker_id)
            .field("columns", &self.meta.as_ref().map(ResultSetMeta::len))
            .finish()
    }
}

/// Cancels the statement of one [`ResultSet`] through a control connection.
///
/// Once the result set has released its channel the handle does nothing.
#[derive(Clone)]
pub struct CancelHandle {
    inner: Arc<Inner>,
    worker_id: i32,
    released: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) -> Result<(), ClientError> {
        if self.released.load(Ordering::Acquire) {
            return Ok(());
        }
        self.inner.client_connection()?.cancel_worker(self.worker_id)
    }

    pub fn worker_id(&self) -> i32 {
        self.worker_id
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("worker_id", &self.worker_id)
            .field("released", &self.released.load(Ordering::Acquire))
            .finish()
    }
}

/// Rows of the current statement, ending at its end-of-data marker or at a
/// terminal status.
pub struct Rows<'a> {
    result_set: &'a mut ResultSet,
    done: bool,
}

impl Iterator for Rows<'_> {
    type Item = Result<Vec<Value>, ClientError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.result_set.step() {
                Ok(ResultStatus::MetaData) => continue,
                Ok(ResultStatus::Data) => {
                    let row = match &self.result_set.row {
                        Value::Array(values) => values.clone(),
                        other => vec![other.clone()],
                    };
                    return Some(Ok(row));
                }
                Ok(_) => self.done = true,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(ResultStatus::Success.is_terminal());
        assert!(ResultStatus::Canceled.is_terminal());
        assert!(ResultStatus::Error.is_terminal());
        assert!(!ResultStatus::HasMoreData.is_terminal());
        assert!(!ResultStatus::EndOfData.is_terminal());
        assert!(!ResultStatus::Data.is_terminal());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ResultStatus::MetaData.to_string(), "META_DATA");
        assert_eq!(ResultStatus::HasMoreData.to_string(), "HAS_MORE_DATA");
    }
}
