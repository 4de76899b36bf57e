//! Tracing initialization.
//!
//! Console logging is always on. With `--log-to-file` two non-blocking file
//! layers are added: the full log at `--log-file` and an `ERROR`-only stream
//! at `--log-error-file`. The returned guards must stay alive for the process
//! lifetime or buffered file output is lost.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::LoggingConfig;

pub fn init_telemetry(config: &LoggingConfig) -> anyhow::Result<Vec<WorkerGuard>> {
    let default_directive = if config.debug { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let mut guards = Vec::new();

    if config.log_to_file {
        let (log_writer, log_guard) = tracing_appender::non_blocking(file_appender(&config.log_file)?);
        let (error_writer, error_guard) = tracing_appender::non_blocking(file_appender(&config.log_error_file)?);
        guards.push(log_guard);
        guards.push(error_guard);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer())
            .with(fmt::layer().with_ansi(false).with_writer(log_writer))
            .with(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(error_writer)
                    .with_filter(LevelFilter::ERROR),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer())
            .try_init()?;
    }

    Ok(guards)
}

fn file_appender(path: &Path) -> anyhow::Result<RollingFileAppender> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("log file path {} has no file name", path.display()))?;

    Ok(tracing_appender::rolling::never(dir, name))
}
