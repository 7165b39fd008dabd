use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Largest worker pool the engine accepts.
pub const MAX_WORKERS: usize = 256;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid worker_count: {0}. Must be between 1 and 256")]
    InvalidWorkerCount(usize),

    #[error("Invalid action_queue_capacity: {0}. Must be at least 1")]
    InvalidQueueCapacity(usize),

    #[error("Invalid {name}: must be greater than zero")]
    ZeroInterval { name: &'static str },

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid root_scope: {0}")]
    InvalidRootScope(String),

    #[error("Invalid location: {0}")]
    InvalidLocation(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .eventcore/config.yaml (project config)
    /// 3. .eventcore/local.yaml (local overrides, optional)
    /// 4. Environment variables (EVENTCORE_* prefix, `__` separates sections)
    pub fn load() -> Result<Config> {
        Self::load_in(".")
    }

    /// Same as [`ConfigLoader::load`], with the `.eventcore` directory
    /// resolved relative to `base`.
    pub fn load_in(base: impl AsRef<Path>) -> Result<Config> {
        let dir = base.as_ref().join(".eventcore");
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed("EVENTCORE_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let engine = &config.engine;
        if engine.worker_count == 0 || engine.worker_count > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount(engine.worker_count));
        }
        if engine.action_queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity(engine.action_queue_capacity));
        }
        for (name, value) in [
            ("scheduler_poll_ms", engine.scheduler_poll_ms),
            ("dispatcher_poll_ms", engine.dispatcher_poll_ms),
            ("trigger_poll_ms", engine.trigger_poll_ms),
            ("shutdown_timeout_ms", engine.shutdown_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroInterval { name });
            }
        }
        if crate::domain::models::path::normalize(&engine.root_scope).is_err() {
            return Err(ConfigError::InvalidRootScope(engine.root_scope.clone()));
        }

        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        match (config.location.latitude, config.location.longitude) {
            (Some(latitude), Some(longitude)) => {
                crate::domain::models::Location::new(latitude, longitude)
                    .map_err(|e| ConfigError::InvalidLocation(e.to_string()))?;
            }
            (None, None) => {}
            _ => {
                return Err(ConfigError::InvalidLocation(
                    "latitude and longitude must be set together".to_string(),
                ))
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.engine.worker_count, 16);
        assert_eq!(config.engine.action_queue_capacity, 256);
        assert_eq!(config.database.path, ".eventcore/events.db");
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
engine:
  worker_count: 4
  scheduler_poll_ms: 200
database:
  path: /var/lib/eventcore/events.db
logging:
  level: debug
  format: json
location:
  latitude: 52.52
  longitude: 13.40
";
        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");
        assert_eq!(config.engine.worker_count, 4);
        assert_eq!(config.engine.scheduler_poll_ms, 200);
        assert_eq!(config.engine.action_queue_capacity, 256);
        assert_eq!(config.database.path, "/var/lib/eventcore/events.db");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.location.latitude, Some(52.52));
        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_worker_bounds() {
        let mut config = Config::default();
        config.engine.worker_count = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidWorkerCount(0)
        ));
        config.engine.worker_count = MAX_WORKERS + 1;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidWorkerCount(_)
        ));
    }

    #[test]
    fn test_validate_zero_poll() {
        let mut config = Config::default();
        config.engine.dispatcher_poll_ms = 0;
        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::ZeroInterval { name } => assert_eq!(name, "dispatcher_poll_ms"),
            other => panic!("Expected ZeroInterval, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_zero_capacity() {
        let mut config = Config::default();
        config.engine.action_queue_capacity = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidQueueCapacity(0)
        ));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "loud"),
            other => panic!("Expected InvalidLogLevel, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidLogFormat(_)
        ));
    }

    #[test]
    fn test_validate_empty_database_path() {
        let mut config = Config::default();
        config.database.path = String::new();
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::EmptyDatabasePath
        ));
    }

    #[test]
    fn test_validate_location() {
        let mut config = Config::default();
        config.location.latitude = Some(120.0);
        config.location.longitude = Some(0.0);
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidLocation(_)
        ));

        config.location.latitude = Some(45.0);
        config.location.longitude = None;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidLocation(_)
        ));
    }

    #[test]
    fn test_hierarchical_merging_with_env() {
        let dir = tempfile::tempdir().unwrap();
        let config_dir = dir.path().join(".eventcore");
        std::fs::create_dir_all(&config_dir).unwrap();

        let mut base = std::fs::File::create(config_dir.join("config.yaml")).unwrap();
        writeln!(base, "engine:\n  worker_count: 8\nlogging:\n  level: info\n  format: json").unwrap();
        let mut local = std::fs::File::create(config_dir.join("local.yaml")).unwrap();
        writeln!(local, "engine:\n  worker_count: 12\nlogging:\n  level: debug").unwrap();

        let config = temp_env::with_vars(
            [
                ("EVENTCORE_ENGINE__ACTION_QUEUE_CAPACITY", Some("64")),
                ("EVENTCORE_LOGGING__LEVEL", Some("warn")),
            ],
            || ConfigLoader::load_in(dir.path()).unwrap(),
        );

        assert_eq!(config.engine.worker_count, 12, "local.yaml should win over config.yaml");
        assert_eq!(config.engine.action_queue_capacity, 64, "env should apply");
        assert_eq!(config.logging.level, "warn", "env should win over files");
        assert_eq!(config.logging.format, "json", "base value should persist");
    }

    #[test]
    fn test_invalid_env_value_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = temp_env::with_var("EVENTCORE_ENGINE__WORKER_COUNT", Some("0"), || {
            ConfigLoader::load_in(dir.path())
        });
        assert!(result.is_err());
    }
}
