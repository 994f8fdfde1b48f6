//! Logging setup for the datamedic binary.
//!
//! The library only emits `tracing` events; installing a subscriber is the
//! job of the executable. Two entry points exist:
//!
//! - [`init`]: console output plus daily-rotated files under the platform
//!   data directory (`datamedic.*.log` for everything, `error.*.log` for
//!   warnings and errors).
//! - [`init_console`]: console only, for runs that must not touch disk.
//!
//! Both honour `RUST_LOG` and default to `info`.
//!
//! ```no_run
//! datamedic::logging::init().expect("Failed to initialize logging");
//! tracing::info!("engine ready");
//! ```

use anyhow::{Context as _, Result};
use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer as _, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

const APP_DIR: &str = "datamedic";

/// Gets the log directory path based on platform conventions
///
/// Returns:
/// - Windows: `%APPDATA%/datamedic/logs`
/// - macOS: `~/Library/Application Support/datamedic/logs`
/// - Linux: `~/.local/share/datamedic/logs`
pub fn get_log_dir() -> Result<PathBuf> {
    let base_dir = dirs::data_dir().context("Failed to determine data directory")?;
    let log_dir = base_dir.join(APP_DIR).join("logs");

    if !log_dir.exists() {
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
    }

    Ok(log_dir)
}

fn env_filter() -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Failed to create env filter")
}

/// Initializes console and rolling-file logging.
///
/// # Errors
///
/// Returns error if the log directory cannot be created or an appender fails
pub fn init() -> Result<()> {
    let log_dir = get_log_dir()?;

    let all_logs_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(10)
        .filename_prefix(APP_DIR)
        .filename_suffix("log")
        .build(&log_dir)
        .context("Failed to create all-logs file appender")?;

    let error_logs_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(10)
        .filename_prefix("error")
        .filename_suffix("log")
        .build(&log_dir)
        .context("Failed to create error-logs file appender")?;

    // stdout carries command output, so the console layer goes to stderr
    let console_layer = fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    let all_logs_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(all_logs_appender);

    let error_logs_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(error_logs_appender)
        .with_filter(EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(env_filter()?)
        .with(console_layer)
        .with(all_logs_layer)
        .with(error_logs_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::info!(
        "Logging initialized, writing to {}",
        get_current_log_path()?.display()
    );

    Ok(())
}

/// Initializes console-only logging on stderr.
///
/// # Errors
///
/// Returns error if a global subscriber is already installed
pub fn init_console() -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter()?)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .try_init()
        .context("Failed to install tracing subscriber")
}

/// Gets the path to today's main log file (the appender rotates on UTC days)
pub fn get_current_log_path() -> Result<PathBuf> {
    let log_dir = get_log_dir()?;
    let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
    Ok(log_dir.join(format!("{APP_DIR}.{today}.log")))
}
