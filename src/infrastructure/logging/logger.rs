use super::config::{LogFormat, LogSettings, RotationPolicy};
use crate::domain::models::config::LoggingConfig;
use anyhow::{Context, Result};
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

const LOG_FILE_NAME: &str = "eventcore.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Logger implementation using tracing
pub struct LoggerImpl {
    guard: Option<WorkerGuard>,
}

impl LoggerImpl {
    /// Install the global subscriber described by `config`.
    ///
    /// File output (when `log_dir` is set) is always JSON so it can be
    /// shipped as-is; the stderr layer follows `format`. `RUST_LOG`
    /// overrides the configured level. Keep the returned value alive for
    /// the life of the process or buffered file output is lost.
    pub fn init(config: &LoggingConfig) -> Result<Self> {
        let settings = LogSettings::try_from(config)?;

        let env_filter = EnvFilter::builder()
            .with_default_directive(settings.level.into())
            .from_env_lossy();

        let mut layers: Vec<BoxedLayer> = Vec::new();
        let mut guard = None;

        if let Some(ref log_dir) = settings.log_dir {
            let (writer, file_guard) = file_writer(log_dir, settings.rotation)?;
            guard = Some(file_guard);
            layers.push(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_current_span(true)
                    .with_target(true)
                    .with_thread_names(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_filter(env_filter.clone())
                    .boxed(),
            );
        }

        if settings.log_dir.is_none() || settings.enable_stderr {
            layers.push(stderr_layer(settings.format, env_filter));
        }

        tracing_subscriber::registry()
            .with(layers)
            .try_init()
            .context("a global tracing subscriber is already installed")?;

        tracing::info!(
            level = %config.level,
            format = ?settings.format,
            file_output = settings.log_dir.is_some(),
            "logger initialized"
        );

        Ok(Self { guard })
    }
}

fn file_writer(log_dir: &Path, rotation: RotationPolicy) -> Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let appender = match rotation {
        RotationPolicy::Daily => rolling::daily(log_dir, LOG_FILE_NAME),
        RotationPolicy::Hourly => rolling::hourly(log_dir, LOG_FILE_NAME),
        RotationPolicy::Never => rolling::never(log_dir, LOG_FILE_NAME),
    };
    Ok(tracing_appender::non_blocking(appender))
}

// stdout is reserved for command output.
fn stderr_layer(format: LogFormat, env_filter: EnvFilter) -> BoxedLayer {
    match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_current_span(true)
            .with_target(true)
            .with_thread_names(true)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_target(true)
            .with_thread_names(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(env_filter)
            .boxed(),
    }
}
