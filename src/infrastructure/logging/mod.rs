//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON or pretty stderr output
//! - Rolling JSON log files via tracing-appender

pub mod config;
pub mod logger;

pub use config::{parse_log_level, LogFormat, LogSettings, RotationPolicy};
pub use logger::LoggerImpl;
