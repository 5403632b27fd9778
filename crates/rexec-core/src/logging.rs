//! Logging configuration using tracing

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use chrono::{NaiveDate, Utc};

use crate::error::{Result, ResultExt};

const LOG_FILE_PREFIX: &str = "rexec.log";

/// Initialize the logging subsystem
///
/// Logs are written to `~/.local/share/remote-exec/logs/`
/// Log level is controlled by `REXEC_LOG` environment variable.
///
/// # Examples
/// ```bash
/// REXEC_LOG=debug rexec devices
/// REXEC_LOG=rexec_device=trace rexec run --device 12 main.js
/// ```
pub fn init() -> Result<()> {
    let log_dir = get_log_directory()?;
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_PREFIX);

    let env_filter = EnvFilter::try_from_env("REXEC_LOG").unwrap_or_else(|_| {
        EnvFilter::new("remote_exec=info,rexec_app=info,rexec_device=info,warn")
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .init();

    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("Remote Exec starting");
    tracing::info!("Log directory: {}", log_dir.display());
    tracing::info!("═══════════════════════════════════════════════════════");

    Ok(())
}

/// Get the log directory path
fn get_log_directory() -> Result<PathBuf> {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    Ok(base.join("remote-exec").join("logs"))
}

/// Get the log file path for the current day
///
/// Daily rotation suffixes the file with the UTC date.
pub fn get_current_log_file() -> Result<PathBuf> {
    let dir = get_log_directory()?;
    Ok(dir.join(log_file_name(Utc::now().date_naive())))
}

fn log_file_name(date: NaiveDate) -> String {
    format!("{}.{}", LOG_FILE_PREFIX, date.format("%Y-%m-%d"))
}
