// Core infrastructure modules
pub mod core;

// Environment: configuration, logging and failure reporting
pub mod config;
pub mod fail;
pub mod log;

// Drivers
pub mod sqlite;

#[cfg(test)]
mod test_utils;

pub use crate::core::db::{CursorOutcome, Database, QueryOutcome, RecoveryPolicy, RowCursor};
pub use crate::core::{Param, Params, Result, Row, SqlrunError, Value};
pub use crate::sqlite::SqliteDriver;
