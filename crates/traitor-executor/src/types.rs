//! Shared data types for traitor-executor.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use traitor_core::config::ExecutorConfig;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// Opaque identifier for one script execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a fresh random run ID (UUIDv4).
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Where an output chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
    /// Messages produced by the executor itself (exit status, timeout, …).
    System,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
            OutputStream::System => "system",
        }
    }
}

/// One line of output. `seq` starts at 1 and increases by one per chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputChunk {
    pub seq: u64,
    pub stream: OutputStream,
    pub text: String,
}

// ---------------------------------------------------------------------------
// RunStatus / RunOutcome
// ---------------------------------------------------------------------------

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    /// Script error, non-zero exit, timeout or executor failure.
    Failed,
    /// Stopped on request (disconnect, job deletion, shutdown).
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Terminal result of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    /// Process exit code, when the process exited on its own.
    pub exit_code: Option<i32>,
    /// Human-readable reason for `Failed` / `Cancelled`.
    pub message: Option<String>,
    /// True when the run was killed because it exceeded its deadline.
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl RunOutcome {
    pub fn succeeded(duration_ms: u64) -> Self {
        Self {
            status: RunStatus::Succeeded,
            exit_code: Some(0),
            message: None,
            timed_out: false,
            duration_ms,
        }
    }

    pub fn failed(message: impl Into<String>, exit_code: Option<i32>, duration_ms: u64) -> Self {
        Self {
            status: RunStatus::Failed,
            exit_code,
            message: Some(message.into()),
            timed_out: false,
            duration_ms,
        }
    }

    pub fn timed_out(message: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            timed_out: true,
            ..Self::failed(message, None, duration_ms)
        }
    }

    pub fn cancelled(duration_ms: u64) -> Self {
        Self {
            status: RunStatus::Cancelled,
            exit_code: None,
            message: Some("run cancelled".to_string()),
            timed_out: false,
            duration_ms,
        }
    }
}

/// Event produced by a running script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Output(OutputChunk),
    /// Always the last event of a run.
    Finished(RunOutcome),
}

// ---------------------------------------------------------------------------
// ExecOptions
// ---------------------------------------------------------------------------

/// Configuration knobs for the process executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecOptions {
    /// Program used to run scripts (e.g. `sh`, `node`, `python3`).
    pub interpreter: String,

    /// Arguments placed before the script body.
    pub args: Vec<String>,

    /// Per-run deadline. The child is killed if it runs longer.
    pub timeout: Duration,

    /// How long a cancelled child may take to exit after SIGTERM.
    pub grace_period: Duration,

    /// Lines longer than this are truncated, see `truncate::LineBuffer`.
    pub max_line_chars: usize,

    /// Buffered events per run before the producer waits for the consumer.
    pub channel_capacity: usize,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self::from(&ExecutorConfig::default())
    }
}

impl From<&ExecutorConfig> for ExecOptions {
    fn from(cfg: &ExecutorConfig) -> Self {
        Self {
            interpreter: cfg.interpreter.clone(),
            args: cfg.args.clone(),
            timeout: Duration::from_secs(cfg.run_timeout_secs()),
            grace_period: Duration::from_millis(cfg.grace_period_ms),
            max_line_chars: cfg.max_line_chars.max(16),
            channel_capacity: 64,
        }
    }
}
