//! Error types for the traitor-executor crate.

use thiserror::Error;

/// Errors raised before a run exists. Once a run has started, every failure
/// is reported through its [`RunOutcome`](crate::types::RunOutcome) instead.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Interpreter could not be spawned.
    #[error("spawn error: {0}")]
    Spawn(String),

    /// The run was cancelled before it started.
    #[error("run cancelled before start")]
    Cancelled,

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExecError>;
