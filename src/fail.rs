/// Fail channel for request-serving environments
///
/// Outside a request context errors go back to the caller. Inside one, the
/// engine hands a formatted message to a [`FailChannel`] (which typically
/// ends the request with a server error) and stops the operation.
use crate::core::SqlrunError;
use std::fmt;

/// Receives fatal failures when running inside a request context.
pub trait FailChannel: Send {
    fn report_fatal(&self, message: &str);
}

/// How failures that will not be retried leave the engine.
#[derive(Default)]
pub enum FailurePolicy {
    /// Return the error to the caller
    #[default]
    Propagate,
    /// Report to the channel, then return [`SqlrunError::Aborted`]
    Report(Box<dyn FailChannel>),
}

impl fmt::Debug for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Propagate => f.write_str("Propagate"),
            FailurePolicy::Report(_) => f.write_str("Report(..)"),
        }
    }
}

/// Message handed to the fail channel.
pub fn fatal_message(error: &SqlrunError) -> String {
    format!(
        "Unhandled Exception. {}. You can find the error back in the log.",
        error
    )
}
