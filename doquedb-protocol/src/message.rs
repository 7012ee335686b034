//! Request codes, response statuses and error levels.

use crate::error::ProtocolError;
use std::fmt;

/// Request codes understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Request {
    // Connection management
    BeginConnection = 1,
    EndConnection = 2,
    ReuseConnection = 12,
    NoReuseConnection = 13,

    // Sessions and workers
    BeginSession = 3,
    EndSession = 4,
    BeginWorker = 5,
    CancelWorker = 6,
    BeginSession2 = 17,
    EndSession2 = 18,

    // Statements
    ExecuteStatement = 8,
    PrepareStatement = 9,
    ExecutePrepareStatement = 10,
    ErasePrepareStatement = 11,
    PrepareStatement2 = 15,
    ErasePrepareStatement2 = 16,

    // Server
    Shutdown = 7,
    Shutdown2 = 23,
    CheckAvailability = 14,
    QueryProductVersion = 201,

    // User management
    CreateUser = 19,
    DropUser = 20,
    ChangeOwnPassword = 21,
    ChangePassword = 22,
}

impl Request {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for Request {
    type Error = ProtocolError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Ok(match code {
            1 => Request::BeginConnection,
            2 => Request::EndConnection,
            3 => Request::BeginSession,
            4 => Request::EndSession,
            5 => Request::BeginWorker,
            6 => Request::CancelWorker,
            7 => Request::Shutdown,
            8 => Request::ExecuteStatement,
            9 => Request::PrepareStatement,
            10 => Request::ExecutePrepareStatement,
            11 => Request::ErasePrepareStatement,
            12 => Request::ReuseConnection,
            13 => Request::NoReuseConnection,
            14 => Request::CheckAvailability,
            15 => Request::PrepareStatement2,
            16 => Request::ErasePrepareStatement2,
            17 => Request::BeginSession2,
            18 => Request::EndSession2,
            19 => Request::CreateUser,
            20 => Request::DropUser,
            21 => Request::ChangeOwnPassword,
            22 => Request::ChangePassword,
            23 => Request::Shutdown2,
            201 => Request::QueryProductVersion,
            other => return Err(ProtocolError::InvalidRequest(other)),
        })
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Request::BeginConnection => "BEGIN_CONNECTION",
            Request::EndConnection => "END_CONNECTION",
            Request::ReuseConnection => "REUSE_CONNECTION",
            Request::NoReuseConnection => "NO_REUSE_CONNECTION",
            Request::BeginSession => "BEGIN_SESSION",
            Request::EndSession => "END_SESSION",
            Request::BeginWorker => "BEGIN_WORKER",
            Request::CancelWorker => "CANCEL_WORKER",
            Request::BeginSession2 => "BEGIN_SESSION2",
            Request::EndSession2 => "END_SESSION2",
            Request::ExecuteStatement => "EXECUTE_STATEMENT",
            Request::PrepareStatement => "PREPARE_STATEMENT",
            Request::ExecutePrepareStatement => "EXECUTE_PREPARE_STATEMENT",
            Request::ErasePrepareStatement => "ERASE_PREPARE_STATEMENT",
            Request::PrepareStatement2 => "PREPARE_STATEMENT2",
            Request::ErasePrepareStatement2 => "ERASE_PREPARE_STATEMENT2",
            Request::Shutdown => "SHUTDOWN",
            Request::Shutdown2 => "SHUTDOWN2",
            Request::CheckAvailability => "CHECK_AVAILABILITY",
            Request::QueryProductVersion => "QUERY_PRODUCT_VERSION",
            Request::CreateUser => "CREATE_USER",
            Request::DropUser => "DROP_USER",
            Request::ChangeOwnPassword => "CHANGE_OWN_PASSWORD",
            Request::ChangePassword => "CHANGE_PASSWORD",
        };
        f.write_str(name)
    }
}

/// Status value closing a response or a statement within a result stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Status {
    Success = 0,
    Error = 1,
    Canceled = 2,
    HasMoreData = 3,
}

impl Status {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for Status {
    type Error = ProtocolError;

    fn try_from(code: i32) -> Result<Self, ProtocolError> {
        match code {
            0 => Ok(Status::Success),
            1 => Ok(Status::Error),
            2 => Ok(Status::Canceled),
            3 => Ok(Status::HasMoreData),
            other => Err(ProtocolError::InvalidStatus(other)),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Success => write!(f, "SUCCESS"),
            Status::Error => write!(f, "ERROR"),
            Status::Canceled => write!(f, "CANCELED"),
            Status::HasMoreData => write!(f, "HAS_MORE_DATA"),
        }
    }
}

/// Severity marker preceding exception info on a channel.
///
/// A user-level error leaves the channel in a consistent state, so it may be
/// pooled again. A system-level error means the channel must be discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorLevel {
    User = 1,
    System = 2,
}

impl ErrorLevel {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn is_user(self) -> bool {
        self == ErrorLevel::User
    }
}

impl TryFrom<i32> for ErrorLevel {
    type Error = ProtocolError;

    fn try_from(code: i32) -> Result<Self, ProtocolError> {
        match code {
            1 => Ok(ErrorLevel::User),
            2 => Ok(ErrorLevel::System),
            other => Err(ProtocolError::InvalidErrorLevel(other)),
        }
    }
}

impl fmt::Display for ErrorLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorLevel::User => write!(f, "USER"),
            ErrorLevel::System => write!(f, "SYSTEM"),
        }
    }
}

/// Target of a CHECK_AVAILABILITY request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityTarget {
    Server,
    Database(u32),
}

impl AvailabilityTarget {
    /// Database id addressing every database at once.
    pub const DATABASE_ALL: u32 = u32::MAX;

    pub fn code(self) -> i32 {
        match self {
            AvailabilityTarget::Server => 0,
            AvailabilityTarget::Database(_) => 1,
        }
    }
}
