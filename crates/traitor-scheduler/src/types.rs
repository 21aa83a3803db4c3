use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a job decides when to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecType {
    /// Recurring, driven by a cron expression.
    Timing,
    /// One-shot at an absolute instant.
    Delay,
}

impl std::fmt::Display for ExecType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ExecType::Timing => "timing",
            ExecType::Delay => "delay",
        })
    }
}

impl std::str::FromStr for ExecType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "timing" => Ok(ExecType::Timing),
            "delay" => Ok(ExecType::Delay),
            other => Err(format!("unknown exec type: {other}")),
        }
    }
}

/// Whether the scheduler may dispatch a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Enabled,
    /// Never dispatched, still editable and debuggable.
    #[default]
    Disabled,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            JobState::Enabled => "enabled",
            JobState::Disabled => "disabled",
        })
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "enabled" => Ok(JobState::Enabled),
            "disabled" => Ok(JobState::Disabled),
            other => Err(format!("unknown job state: {other}")),
        }
    }
}

/// A persisted job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// UUID v4 string, primary key, never reused.
    pub id: String,
    pub name: String,
    pub description: String,
    pub exec_type: ExecType,
    /// Six-field cron expression; required for `timing` jobs.
    pub cron: Option<String>,
    /// Fire instant; required for `delay` jobs.
    pub exec_at: Option<DateTime<Utc>>,
    pub script: String,
    pub state: JobState,
    /// Start of the most recent scheduler dispatch. Debug runs never set it.
    pub last_exec_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn is_enabled(&self) -> bool {
        self.state == JobState::Enabled
    }

    /// A delay job has fired once it was dispatched at or after `execAt`.
    pub fn fired(&self) -> bool {
        match (self.last_exec_time, self.exec_at) {
            (Some(last), Some(at)) => last >= at,
            _ => false,
        }
    }
}

/// Fields accepted when creating a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub exec_type: ExecType,
    #[serde(default)]
    pub cron: Option<String>,
    #[serde(default)]
    pub exec_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub script: String,
    #[serde(default)]
    pub state: JobState,
}

impl JobDraft {
    pub fn timing(name: &str, cron: &str, script: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            exec_type: ExecType::Timing,
            cron: Some(cron.to_string()),
            exec_at: None,
            script: script.to_string(),
            state: JobState::Disabled,
        }
    }

    pub fn delay(name: &str, exec_at: DateTime<Utc>, script: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            exec_type: ExecType::Delay,
            cron: None,
            exec_at: Some(exec_at),
            script: script.to_string(),
            state: JobState::Disabled,
        }
    }

    pub fn enabled(mut self) -> Self {
        self.state = JobState::Enabled;
        self
    }
}

/// Partial update. `None` leaves a field unchanged. `id`, `state` and
/// `lastExecTime` are not part of a patch and are ignored if sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub exec_type: Option<ExecType>,
    #[serde(default)]
    pub cron: Option<String>,
    #[serde(default)]
    pub exec_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub script: Option<String>,
}

impl JobPatch {
    pub fn apply(self, job: &mut Job) {
        if let Some(name) = self.name {
            job.name = name;
        }
        if let Some(description) = self.description {
            job.description = description;
        }
        if let Some(exec_type) = self.exec_type {
            job.exec_type = exec_type;
        }
        if let Some(cron) = self.cron {
            job.cron = Some(cron);
        }
        if let Some(exec_at) = self.exec_at {
            job.exec_at = Some(exec_at);
        }
        if let Some(script) = self.script {
            job.script = script;
        }
    }
}

/// Who started an in-flight run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOrigin {
    Scheduler,
    Debug,
}

/// Snapshot of one in-flight execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInfo {
    pub run_id: String,
    pub job_id: String,
    pub origin: RunOrigin,
    pub started_at: DateTime<Utc>,
    pub status: traitor_executor::RunStatus,
    /// Schedule instant a scheduler run covers; absent for debug sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fire_time: Option<DateTime<Utc>>,
}
