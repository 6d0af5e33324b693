/// sqlrun Error Module
///
/// This module defines the error types for sqlrun. Driver implementations
/// report failures as [`DriverError`]; the engine classifies them into the
/// categories of [`SqlrunError`] that callers observe.
use std::fmt;
use thiserror::Error;

/// The driver operation that produced a [`DriverError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    Connect,
    Prepare,
    Bind,
    Execute,
    Fetch,
    Transaction,
}

impl fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriverErrorKind::Connect => "connect",
            DriverErrorKind::Prepare => "prepare",
            DriverErrorKind::Bind => "bind",
            DriverErrorKind::Execute => "execute",
            DriverErrorKind::Fetch => "fetch",
            DriverErrorKind::Transaction => "transaction",
        };
        f.write_str(name)
    }
}

/// A failure reported by a database driver.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind} failed: {message}")]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub message: String,
}

impl DriverError {
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        DriverError {
            kind,
            message: message.into(),
        }
    }
}

/// Result type returned by driver implementations.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Error type for the sqlrun engine.
///
/// - Connection establishment failures
/// - Transient disconnects that could not be recovered
/// - Permanent query failures (syntax, constraints, ...)
/// - Malformed input to the parameter rewriter or write helpers
/// - Configuration loading
#[derive(Error, Debug)]
pub enum SqlrunError {
    /// The database could not be reached
    #[error("Connection error: {0}")]
    Connect(DriverError),

    /// The server dropped the connection and no retry was possible
    #[error("Connection lost: {source}")]
    Disconnected { source: DriverError, sql: String },

    /// Any other statement failure; never retried
    #[error("Query error: {source}")]
    Query { source: DriverError, sql: String },

    /// Transaction control failed
    #[error("Transaction error: {0}")]
    Transaction(DriverError),

    /// Parameters or rows that cannot be turned into valid SQL
    #[error("Shape error: {0}")]
    Shape(String),

    /// A row cursor was used after it reached the end of its result set
    #[error("Cursor error: cursor is closed; run the query again")]
    CursorClosed,

    /// The failure was handed to the fail channel and the operation stopped
    #[error("Operation aborted: {0}")]
    Aborted(String),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("Configuration error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl SqlrunError {
    /// The driver failure behind this error, if any.
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            SqlrunError::Connect(e) | SqlrunError::Transaction(e) => Some(e),
            SqlrunError::Disconnected { source, .. } | SqlrunError::Query { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }

    /// The SQL text that was running when the error occurred.
    pub fn sql(&self) -> Option<&str> {
        match self {
            SqlrunError::Disconnected { sql, .. } | SqlrunError::Query { sql, .. } => Some(sql),
            _ => None,
        }
    }
}

/// Type alias for Result to use SqlrunError as the error type.
pub type Result<T> = std::result::Result<T, SqlrunError>;
