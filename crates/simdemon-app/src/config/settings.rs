//! Settings parser for .simdemon/config.toml

use std::path::Path;

use simdemon_core::prelude::*;

use super::types::Settings;

const CONFIG_FILENAME: &str = "config.toml";
const SIMDEMON_DIR: &str = ".simdemon";

/// Load settings from .simdemon/config.toml
///
/// Returns default settings if file doesn't exist or can't be parsed.
pub fn load_settings(project_path: &Path) -> Settings {
    let config_path = project_path.join(SIMDEMON_DIR).join(CONFIG_FILENAME);

    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return Settings::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", config_path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            Settings::default()
        }
    }
}

/// Create a default config file in .simdemon/. Never overwrites.
pub fn init_config_dir(project_path: &Path) -> Result<()> {
    let simdemon_dir = project_path.join(SIMDEMON_DIR);

    if !simdemon_dir.exists() {
        std::fs::create_dir_all(&simdemon_dir)
            .map_err(|e| Error::config(format!("Failed to create .simdemon dir: {}", e)))?;
    }

    let config_path = simdemon_dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        std::fs::write(&config_path, generate_default_config())
            .map_err(|e| Error::config(format!("Failed to write config.toml: {}", e)))?;
        info!("Created {:?}", config_path);
    }

    Ok(())
}

fn generate_default_config() -> String {
    r#"# Simulator Demon Configuration

[session]
boot_timeout_ms = 60000        # Give up on a simulator that is not booted by then
boot_poll_interval_ms = 500
stop_timeout_ms = 5000         # Per teardown step, then force-kill
activate_window = true         # Bring Simulator to the foreground

[tailer]
poll_interval_ms = 100

[crash]
grace_period_ms = 5000         # Keep looking for crash reports after the app exits
poll_interval_ms = 250
# crash_dir = "~/Library/Logs/DiagnosticReports"

[detector]
auto_exit_idle_ms = 10000      # Quiet time before --auto-exit terminates the app
result_start_marker = "RESULT_START"
result_stop_marker = "RESULT_STOP"

[companion]
required = false               # Fail the launch if the watch cannot be paired
boot_timeout_ms = 60000
"#
    .to_string()
}
