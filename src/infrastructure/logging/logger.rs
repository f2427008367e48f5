use super::config::{LogConfig, LogFormat, RotationPolicy};
use anyhow::{Context, Result};
use std::io;
use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const LOG_FILE_NAME: &str = "paygate.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Owns the global subscriber's background writer.
///
/// Console output goes to stderr so command output on stdout stays parseable.
/// Dropping the logger flushes buffered file output.
pub struct LoggerImpl {
    _guard: Option<WorkerGuard>,
}

impl LoggerImpl {
    /// Install the global subscriber. `RUST_LOG` overrides the configured level.
    pub fn init(config: &LogConfig) -> Result<Self> {
        let level: Level = config
            .level
            .parse()
            .with_context(|| format!("Invalid log level: {}", config.level))?;

        let mut layers = vec![console_layer(config.format, level)];
        let guard = config.log_dir.as_deref().map(|dir| {
            let (layer, guard) = file_layer(dir, config.rotation, level);
            layers.push(layer);
            guard
        });

        tracing_subscriber::registry().with(layers).try_init()?;
        tracing::debug!(
            level = %level,
            format = ?config.format,
            log_dir = ?config.log_dir,
            "logging ready"
        );

        Ok(Self { _guard: guard })
    }
}

fn filter_for(level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

fn console_layer(format: LogFormat, level: Level) -> BoxedLayer {
    let base = tracing_subscriber::fmt::layer().with_writer(io::stderr);
    match format {
        LogFormat::Json => base
            .json()
            .with_current_span(true)
            .with_filter(filter_for(level))
            .boxed(),
        LogFormat::Pretty => base
            .with_target(false)
            .with_filter(filter_for(level))
            .boxed(),
    }
}

/// JSON lines with source locations, regardless of the console format.
fn file_layer(dir: &Path, rotation: RotationPolicy, level: Level) -> (BoxedLayer, WorkerGuard) {
    let appender: RollingFileAppender = match rotation {
        RotationPolicy::Daily => rolling::daily(dir, LOG_FILE_NAME),
        RotationPolicy::Hourly => rolling::hourly(dir, LOG_FILE_NAME),
        RotationPolicy::Never => rolling::never(dir, LOG_FILE_NAME),
    };
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(writer)
        .with_ansi(false)
        .with_span_list(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(filter_for(level))
        .boxed();
    (layer, guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_is_rejected() {
        let config = LogConfig {
            level: "verbose".to_string(),
            ..LogConfig::default()
        };
        let err = LoggerImpl::init(&config).err().unwrap();
        assert!(err.to_string().contains("verbose"));
    }

    #[test]
    fn test_logger_init_with_file_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig {
            level: "debug".to_string(),
            format: LogFormat::Json,
            log_dir: Some(dir.path().to_path_buf()),
            rotation: RotationPolicy::Never,
        };

        // Only one global subscriber can exist per process.
        if let Ok(logger) = LoggerImpl::init(&config) {
            assert!(logger._guard.is_some());
        }
    }
}
