use thiserror::Error;

use crate::cron::CronError;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A timing job carries a cron expression that does not parse.
    #[error("Invalid cron expression: {0}")]
    InvalidCron(#[from] CronError),

    /// The job definition is incomplete or inconsistent.
    #[error("Invalid job: {0}")]
    Validation(String),

    /// No job with the given ID exists in the store.
    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    /// A stored row could not be decoded.
    #[error("Corrupt job record: {0}")]
    Corrupt(String),
}

impl SchedulerError {
    pub fn not_found(id: &str) -> Self {
        Self::JobNotFound { id: id.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
