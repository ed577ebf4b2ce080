//! Logging configuration using tracing

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

/// Environment variable holding a `tracing` filter directive
pub const LOG_ENV_VAR: &str = "SIMDEMON_LOG";

/// Filter used when `SIMDEMON_LOG` is unset or invalid
const DEFAULT_FILTER: &str =
    "simdemon=info,simdemon_core=info,simdemon_daemon=info,simdemon_app=info,warn";

/// Initialize the logging subsystem
///
/// Logs are written to `~/.local/share/simdemon/logs/` (platform data dir).
/// Log level is controlled by the `SIMDEMON_LOG` environment variable.
/// Stdout is left untouched because launch events are printed there.
///
/// # Examples
/// ```bash
/// SIMDEMON_LOG=debug simdemon launch
/// SIMDEMON_LOG=simdemon_daemon=trace simdemon detect
/// ```
pub fn init() -> Result<()> {
    let log_dir = get_log_directory();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "simdemon.log");

    tracing_subscriber::registry()
        .with(env_filter())
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
    tracing::info!("Simulator Demon starting");
    tracing::info!("Log directory: {}", log_dir.display());
    tracing::info!("═══════════════════════════════════════════════════════");

    Ok(())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Get the log directory path
fn get_log_directory() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("simdemon").join("logs")
}
