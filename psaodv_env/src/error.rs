//! Error types for the mobility abstraction.

use thiserror::Error;

/// Errors that can occur while talking to a mobility source.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The source failed to start or to advance (fatal for the run)
    #[error("Mobility source unavailable: {0}")]
    SourceUnavailable(String),

    /// `close()` was called on a source that is already closed
    #[error("Mobility source already closed")]
    AlreadyClosed,

    /// A trace record could not be parsed
    #[error("Trace error at line {line}: {reason}")]
    Trace { line: usize, reason: String },

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EnvError {
    /// Creates a source-unavailable error.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::SourceUnavailable(msg.into())
    }

    /// Creates a trace parse error.
    pub fn trace(line: usize, reason: impl std::fmt::Display) -> Self {
        Self::Trace {
            line,
            reason: reason.to_string(),
        }
    }

    /// Returns true if the error must abort the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, EnvError::AlreadyClosed)
    }
}
