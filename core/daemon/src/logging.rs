//! Tracing subscriber setup for the `loadshield` binary.
//!
//! Console output always; a plain-text log file when `logging.log_to_file` is
//! set. The returned guard must outlive the program's last log line.

use fs_err as fs;
use loadshield_core::config::LoggingConfig;
use std::env;
use std::path::Path;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEBUG_ENV: &str = "LOADSHIELD_DEBUG_LOG";

pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let mut file_error = None;
    let (file_layer, guard) = if config.log_to_file {
        match file_appender(&config.log_file_path) {
            Ok(appender) => {
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer().with_ansi(false).with_writer(writer);
                (Some(layer), Some(guard))
            }
            Err(err) => {
                file_error = Some(err);
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(build_filter(&config.level))
        .with(fmt::layer())
        .with(file_layer)
        .init();

    if let Some(err) = file_error {
        warn!(
            error = %err,
            path = %config.log_file_path.display(),
            "Failed to open log file; logging to console only"
        );
    }
    guard
}

fn build_filter(configured_level: &str) -> EnvFilter {
    let debug_enabled = env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    if debug_enabled {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn file_appender(path: &Path) -> Result<RollingFileAppender, String> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| "Log file path has no file name".to_string())?;
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(directory).map_err(|err| err.to_string())?;

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(directory)
        .map_err(|err| err.to_string())
}
