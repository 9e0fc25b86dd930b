//! Error types for scopefs core

use serde::Serialize;
use thiserror::Error;

/// Main error type for scopefs operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid path: {0}")]
    Validation(#[from] ValidationError),

    #[error("Permission error: {0}")]
    Permission(#[from] PermissionError),

    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),

    #[error("Limit exceeded: {0}")]
    LimitExceeded(#[from] LimitError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Path shape violations raised before any filesystem lookup
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("path is empty or names the root, a file name is required")]
    Empty,

    #[error("path traversal is not allowed: {0}")]
    Traversal(String),

    #[error("absolute paths are not allowed: {0}")]
    Absolute(String),

    #[error("access to sensitive location is blocked: {0}")]
    Sensitive(String),
}

/// Missing, denied or cancelled grants
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PermissionError {
    #[error("no directory access granted, request access first")]
    NoActiveGrant,

    #[error("permission denied for {0}")]
    Denied(String),

    #[error("picker was cancelled")]
    Cancelled,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("file not found: {0}")]
    File(String),

    #[error("directory not found: {0}")]
    Directory(String),

    #[error("grant not found: {0}")]
    Grant(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LimitError {
    #[error("file {name} is {size} bytes, limit is {limit} bytes")]
    FileTooLarge { name: String, size: u64, limit: u64 },

    #[error("file type not allowed: {0}")]
    DisallowedType(String),
}

/// Durable store errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Corrupt record {id}: {reason}")]
    CorruptRecord { id: String, reason: String },

    #[error("Storage task failed: {0}")]
    Task(String),
}

/// Capability provider malfunctions unrelated to user choice
#[derive(Error, Debug)]
pub enum HostError {
    #[error("capability token is no longer valid: {0}")]
    StaleToken(String),

    #[error("operation not allowed by host for {0}")]
    NotAllowed(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("invalid entry name: {0}")]
    InvalidName(String),

    #[error("stream already closed")]
    StreamClosed,

    #[error("host API failure: {0}")]
    Api(String),
}

/// Stable error classification reported across the command boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Permission,
    NotFound,
    LimitExceeded,
    Storage,
    HostApi,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Permission(_) => ErrorKind::Permission,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::LimitExceeded(_) => ErrorKind::LimitExceeded,
            Error::Storage(_) => ErrorKind::Storage,
            Error::Host(_) | Error::Io(_) => ErrorKind::HostApi,
            Error::Json(_) | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Map an IO failure on `path`, keeping "not found" distinguishable
    pub(crate) fn from_io(err: std::io::Error, missing: NotFoundError) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(missing),
            std::io::ErrorKind::PermissionDenied => {
                Error::Host(HostError::NotAllowed(err.to_string()))
            }
            _ => Error::Io(err),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(StorageError::Database(err.to_string()))
    }
}

impl From<r2d2::Error> for Error {
    fn from(err: r2d2::Error) -> Self {
        Error::Storage(StorageError::Pool(err.to_string()))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Storage(StorageError::Task(err.to_string()))
    }
}

impl serde::Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;
