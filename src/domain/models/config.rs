use serde::{Deserialize, Serialize};

/// Main configuration structure for eventcore
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Engine sizing and timing
    #[serde(default)]
    pub engine: EngineConfig,

    /// Definition store configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observer location for sun-relative schedules
    #[serde(default)]
    pub location: LocationConfig,
}

/// Engine sizing and timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// Number of worker threads executing actions (1-256)
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Capacity of the action queue between producers and the dispatcher
    #[serde(default = "default_action_queue_capacity")]
    pub action_queue_capacity: usize,

    /// Upper bound on how long the scheduler loop sleeps between checks
    #[serde(default = "default_scheduler_poll_ms")]
    pub scheduler_poll_ms: u64,

    /// How often the dispatcher re-checks for shutdown while idle
    #[serde(default = "default_dispatcher_poll_ms")]
    pub dispatcher_poll_ms: u64,

    /// How long the trigger listener waits on the feed per cycle
    #[serde(default = "default_trigger_poll_ms")]
    pub trigger_poll_ms: u64,

    /// How long a producer waits on a full action queue before dropping
    #[serde(default = "default_trigger_backpressure_ms")]
    pub trigger_backpressure_ms: u64,

    /// Bound on waiting for all engine threads at shutdown
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Scope loaded from the definition store at startup and on reload
    #[serde(default = "default_root_scope")]
    pub root_scope: String,
}

const fn default_worker_count() -> usize {
    16
}

const fn default_action_queue_capacity() -> usize {
    256
}

const fn default_scheduler_poll_ms() -> u64 {
    1000
}

const fn default_dispatcher_poll_ms() -> u64 {
    250
}

const fn default_trigger_poll_ms() -> u64 {
    500
}

const fn default_trigger_backpressure_ms() -> u64 {
    100
}

const fn default_shutdown_timeout_ms() -> u64 {
    5000
}

fn default_root_scope() -> String {
    "/".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            action_queue_capacity: default_action_queue_capacity(),
            scheduler_poll_ms: default_scheduler_poll_ms(),
            dispatcher_poll_ms: default_dispatcher_poll_ms(),
            trigger_poll_ms: default_trigger_poll_ms(),
            trigger_backpressure_ms: default_trigger_backpressure_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            root_scope: default_root_scope(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".eventcore/events.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation for file output: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// Also write logs to stderr when file output is configured
    #[serde(default = "default_true")]
    pub enable_stderr: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

const fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
            enable_stderr: true,
        }
    }
}

/// Observer location; both fields must be set for it to apply
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LocationConfig {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}
