use serde::{Deserialize, Serialize};

/// Server → Client frame on a debug connection.
///
/// A session sends any number of `output` frames followed by exactly one
/// `done` frame, or a single `error` frame when the session could not start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DebugFrame {
    /// Wire: `{ "type": "output", "seq": 1, "stream": "stdout", "text": "hello" }`
    Output {
        seq: u64,
        stream: String,
        text: String,
    },
    /// Wire: `{ "type": "done", "status": "failed", "exitCode": 1, "message": "...", "durationMs": 12 }`
    Done {
        status: String,
        #[serde(rename = "exitCode", skip_serializing_if = "Option::is_none", default)]
        exit_code: Option<i32>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        message: Option<String>,
        #[serde(rename = "durationMs")]
        duration_ms: u64,
    },
    /// Wire: `{ "type": "error", "code": "NOT_FOUND", "message": "job not found: x" }`
    Error { code: String, message: String },
}

impl DebugFrame {
    pub fn output(seq: u64, stream: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Output {
            seq,
            stream: stream.into(),
            text: text.into(),
        }
    }

    pub fn error(code: &str, message: &str) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    /// True for frames after which the server closes the connection.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Output { .. })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
}

/// HTTP error body.
/// Wire: `{ "error": { "code": "INVALID_CRON", "message": "..." } }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorShape,
}

impl ErrorBody {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            error: ErrorShape {
                code: code.to_string(),
                message: message.into(),
            },
        }
    }
}
