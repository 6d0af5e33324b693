/// Connection Recovery Module
///
/// Holds the connection state shared by every operation of one engine and
/// decides, for each failure, whether the operation is re-run on a fresh
/// connection or fails.
///
/// A retry needs all of: automatic reconnect enabled, an error message
/// carrying one of the disconnect signatures, a re-runnable operation, no
/// open transaction, and a retry count below the ceiling. The count lives
/// on the connection state and is only reset by a successful statement, so
/// repeated failures across different calls still run out of retries.
use crate::core::error::{DriverError, DriverErrorKind};
use crate::core::SqlrunError;

/// Default retry ceiling.
pub const RETRY_ATTEMPTS: u32 = 3;

/// Connection handle plus retry bookkeeping.
#[derive(Debug)]
pub struct ConnectionState<C> {
    pub(crate) handle: Option<C>,
    pub(crate) retry_count: u32,
}

impl<C> Default for ConnectionState<C> {
    fn default() -> Self {
        ConnectionState {
            handle: None,
            retry_count: 0,
        }
    }
}

impl<C> ConnectionState<C> {
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Drops the current handle. The next operation connects afresh.
    pub fn invalidate(&mut self) {
        self.handle = None;
    }

    pub(crate) fn record_success(&mut self) {
        self.retry_count = 0;
    }
}

/// Outcome of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Retry,
    Fail,
}

/// When and how often failed operations are re-run.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryPolicy {
    pub auto_reconnect: bool,
    pub max_retries: u32,
    signatures: Vec<String>,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        RecoveryPolicy::new(
            true,
            RETRY_ATTEMPTS,
            ["server has gone away", "lost connection", "connection lost"],
        )
    }
}

impl RecoveryPolicy {
    pub fn new<I, S>(auto_reconnect: bool, max_retries: u32, signatures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        RecoveryPolicy {
            auto_reconnect,
            max_retries,
            signatures: signatures
                .into_iter()
                .map(|s| s.as_ref().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Never retries.
    pub fn disabled() -> Self {
        RecoveryPolicy {
            auto_reconnect: false,
            ..RecoveryPolicy::default()
        }
    }

    pub fn signatures(&self) -> &[String] {
        &self.signatures
    }

    /// True if the message matches a disconnect signature (case-insensitive).
    pub fn is_transient(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.signatures.iter().any(|s| message.contains(s.as_str()))
    }

    /// Decides what to do with a failure of operation `method`.
    pub fn decide<C>(
        &self,
        state: &ConnectionState<C>,
        method: Option<&str>,
        in_transaction: bool,
        error: &DriverError,
    ) -> Decision {
        let can_retry = self.auto_reconnect
            && state.retry_count < self.max_retries
            && self.is_transient(&error.message)
            && method.is_some_and(|m| !m.is_empty())
            && !in_transaction;
        if can_retry {
            Decision::Retry
        } else {
            Decision::Fail
        }
    }

    /// Turns a driver failure that will not be retried into the error the
    /// caller sees.
    pub fn classify(&self, error: DriverError, sql: &str) -> SqlrunError {
        if self.is_transient(&error.message) {
            return SqlrunError::Disconnected {
                source: error,
                sql: sql.to_string(),
            };
        }
        match error.kind {
            DriverErrorKind::Connect => SqlrunError::Connect(error),
            DriverErrorKind::Transaction => SqlrunError::Transaction(error),
            _ => SqlrunError::Query {
                source: error,
                sql: sql.to_string(),
            },
        }
    }
}
