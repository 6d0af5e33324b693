/// Core Module for sqlrun
///
/// Driver capabilities, values and errors shared by every layer, plus the
/// query engine in [`db`].

pub mod db;
pub mod driver;
pub mod error;
pub mod value;

// Re-export commonly used types for convenience
pub use error::{DriverError, DriverErrorKind, DriverResult, Result, SqlrunError};
pub use value::{FetchMode, Param, Params, Row, Value};
