use thiserror::Error;
use traitor_executor::ExecError;
use traitor_scheduler::SchedulerError;

#[derive(Debug, Error)]
pub enum DebugError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// The caller already has a live session for this job.
    #[error("A debug session for job {job_id} is already active")]
    SessionActive { job_id: String },

    #[error(transparent)]
    Store(SchedulerError),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl From<SchedulerError> for DebugError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::JobNotFound { id } => DebugError::JobNotFound(id),
            other => DebugError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, DebugError>;
