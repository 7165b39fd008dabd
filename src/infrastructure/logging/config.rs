use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::models::config::LoggingConfig;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => anyhow::bail!("Invalid log format: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}

impl FromStr for RotationPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "hourly" => Ok(Self::Hourly),
            "never" => Ok(Self::Never),
            other => anyhow::bail!("Invalid log rotation: {other}"),
        }
    }
}

/// Parsed form of [`LoggingConfig`], ready for the subscriber builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: tracing::Level,
    pub format: LogFormat,
    pub log_dir: Option<std::path::PathBuf>,
    pub enable_stderr: bool,
    pub rotation: RotationPolicy,
}

impl TryFrom<&LoggingConfig> for LogSettings {
    type Error = anyhow::Error;

    fn try_from(config: &LoggingConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            level: parse_log_level(&config.level)?,
            format: config.format.parse()?,
            log_dir: config.log_dir.as_ref().map(std::path::PathBuf::from),
            enable_stderr: config.enable_stderr,
            rotation: config.rotation.parse()?,
        })
    }
}

/// Parse log level string to Level
pub fn parse_log_level(level: &str) -> anyhow::Result<tracing::Level> {
    use tracing::Level;
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!("Invalid log level: {level}"),
    }
}
