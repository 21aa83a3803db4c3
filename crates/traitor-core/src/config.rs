use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 18790;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_RUN_TIMEOUT_SECS: u64 = 30;
pub const MAX_RUN_TIMEOUT_SECS: u64 = 3_600; // hard ceiling per run
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 2_000;
pub const DEFAULT_MAX_LINE_CHARS: usize = 4_096;
pub const DEFAULT_FIRST_MESSAGE_TIMEOUT_MS: u64 = 10_000; // debug WS must name a job in 10s
pub const DEFAULT_MIN_DELAY_SECS: i64 = 5;

/// Top-level config (traitor.toml + TRAITOR_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TraitorConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub debug: DebugConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Scheduler tick loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// When false the tick loop is not started (jobs can still be debugged).
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Offset from UTC, in minutes, used when evaluating cron expressions.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            utc_offset_minutes: 0,
        }
    }
}

/// How scripts are executed.
///
/// The script body is appended as the last argument:
/// `<interpreter> <args...> <script>`. The default runs it through `sh -c`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    #[serde(default = "default_interpreter_args")]
    pub args: Vec<String>,
    /// Per-run deadline. Clamped to `MAX_RUN_TIMEOUT_SECS`.
    #[serde(default = "default_run_timeout_secs")]
    pub timeout_secs: u64,
    /// Time a cancelled script gets to exit after SIGTERM before SIGKILL.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    #[serde(default = "default_max_line_chars")]
    pub max_line_chars: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            args: default_interpreter_args(),
            timeout_secs: DEFAULT_RUN_TIMEOUT_SECS,
            grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
            max_line_chars: DEFAULT_MAX_LINE_CHARS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugConfig {
    /// How long a debug connection may wait before naming its job.
    #[serde(default = "default_first_message_timeout_ms")]
    pub first_message_timeout_ms: u64,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            first_message_timeout_ms: DEFAULT_FIRST_MESSAGE_TIMEOUT_MS,
        }
    }
}

/// Validation applied to job writes coming through the HTTP API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Delay jobs must be scheduled at least this far in the future.
    #[serde(default = "default_min_delay_secs")]
    pub min_delay_secs: i64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            min_delay_secs: DEFAULT_MIN_DELAY_SECS,
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}
fn default_interpreter() -> String {
    "sh".to_string()
}
fn default_interpreter_args() -> Vec<String> {
    vec!["-c".to_string()]
}
fn default_run_timeout_secs() -> u64 {
    DEFAULT_RUN_TIMEOUT_SECS
}
fn default_grace_period_ms() -> u64 {
    DEFAULT_GRACE_PERIOD_MS
}
fn default_max_line_chars() -> usize {
    DEFAULT_MAX_LINE_CHARS
}
fn default_first_message_timeout_ms() -> u64 {
    DEFAULT_FIRST_MESSAGE_TIMEOUT_MS
}
fn default_min_delay_secs() -> i64 {
    DEFAULT_MIN_DELAY_SECS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.traitor/traitor.db", home)
}

impl TraitorConfig {
    /// Load config from a TOML file with TRAITOR_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `TRAITOR_SCHEDULER__TICK_INTERVAL_MS=500`.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.traitor/traitor.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: TraitorConfig = Figment::from(Serialized::defaults(TraitorConfig::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed("TRAITOR_").split("__"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        if !std::path::Path::new(&path).exists() {
            tracing::debug!(path = %path, "config file not found, using defaults and env");
        }
        Ok(config)
    }
}

impl ExecutorConfig {
    /// Effective per-run timeout after clamping.
    pub fn run_timeout_secs(&self) -> u64 {
        self.timeout_secs.clamp(1, MAX_RUN_TIMEOUT_SECS)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.traitor/traitor.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sane() {
        let cfg = TraitorConfig::default();
        assert_eq!(cfg.gateway.port, DEFAULT_PORT);
        assert_eq!(cfg.executor.interpreter, "sh");
        assert_eq!(cfg.executor.args, vec!["-c".to_string()]);
        assert_eq!(cfg.scheduler.tick_interval_ms, 1_000);
        assert!(cfg.scheduler.enabled);
        assert_eq!(cfg.jobs.min_delay_secs, 5);
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[gateway]
port = 9000

[executor]
interpreter = "node"
args = ["-e"]
timeout_secs = 5

[scheduler]
utc_offset_minutes = 480
"#
        )
        .unwrap();

        let cfg = TraitorConfig::load(file.path().to_str()).unwrap();
        assert_eq!(cfg.gateway.port, 9000);
        assert_eq!(cfg.gateway.bind, DEFAULT_BIND);
        assert_eq!(cfg.executor.interpreter, "node");
        assert_eq!(cfg.executor.args, vec!["-e".to_string()]);
        assert_eq!(cfg.executor.timeout_secs, 5);
        assert_eq!(cfg.executor.grace_period_ms, DEFAULT_GRACE_PERIOD_MS);
        assert_eq!(cfg.scheduler.utc_offset_minutes, 480);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = TraitorConfig::load(Some("/nonexistent/traitor.toml")).unwrap();
        assert_eq!(cfg.database.path, default_db_path());
    }

    #[test]
    fn run_timeout_is_clamped() {
        let mut cfg = TraitorConfig::default();
        cfg.executor.timeout_secs = 0;
        assert_eq!(cfg.executor.run_timeout_secs(), 1);
        cfg.executor.timeout_secs = 1_000_000;
        assert_eq!(cfg.executor.run_timeout_secs(), MAX_RUN_TIMEOUT_SECS);
    }
}
