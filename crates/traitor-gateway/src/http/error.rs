use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;
use traitor_debug::DebugError;
use traitor_protocol::frames::ErrorBody;
use traitor_scheduler::SchedulerError;

/// Errors surfaced over HTTP and on debug connections.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidCron(String),

    #[error("{0}")]
    InvalidJob(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    SessionActive(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidCron(_) => "INVALID_CRON",
            ApiError::InvalidJob(_) => "INVALID_JOB",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::SessionActive(_) => "SESSION_ACTIVE",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidCron(_) | ApiError::InvalidJob(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::SessionActive(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(ErrorBody::new(self.code(), self.to_string())),
        )
            .into_response()
    }
}

impl From<SchedulerError> for ApiError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::InvalidCron(c) => ApiError::InvalidCron(c.to_string()),
            SchedulerError::Validation(msg) => ApiError::InvalidJob(msg),
            SchedulerError::JobNotFound { id } => ApiError::NotFound(format!("job not found: {id}")),
            other => {
                error!("store error: {other}");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl From<DebugError> for ApiError {
    fn from(e: DebugError) -> Self {
        match e {
            DebugError::JobNotFound(id) => ApiError::NotFound(format!("job not found: {id}")),
            e @ DebugError::SessionActive { .. } => ApiError::SessionActive(e.to_string()),
            DebugError::Store(inner) => inner.into(),
            DebugError::Exec(inner) => {
                error!("debug run failed to start: {inner}");
                ApiError::Internal(inner.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::InvalidJob(e.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        ApiError::InvalidJob(e.body_text())
    }
}
