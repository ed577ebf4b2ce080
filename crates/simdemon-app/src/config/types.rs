//! Configuration types for Simulator Demon
//!
//! Defines:
//! - `Settings` - Project settings (`.simdemon/config.toml`)
//! - `SupervisorConfig` - Runtime tuning consumed by the Session Supervisor

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use simdemon_core::{RESULT_START_MARKER, RESULT_STOP_MARKER};

/// Application settings (.simdemon/config.toml)
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub tailer: TailerSettings,

    #[serde(default)]
    pub crash: CrashSettings,

    #[serde(default)]
    pub detector: DetectorSettings,

    #[serde(default)]
    pub companion: CompanionSettings,
}

/// Boot and teardown bounds
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SessionSettings {
    /// Overall readiness timeout while starting
    #[serde(default = "default_boot_timeout_ms")]
    pub boot_timeout_ms: u64,

    /// Delay between boot-state checks
    #[serde(default = "default_boot_poll_interval_ms")]
    pub boot_poll_interval_ms: u64,

    /// Bound on each graceful teardown step before force-killing
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    /// Bring the Simulator window to the foreground unless `--hide` is given
    #[serde(default = "default_true")]
    pub activate_window: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            boot_timeout_ms: default_boot_timeout_ms(),
            boot_poll_interval_ms: default_boot_poll_interval_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
            activate_window: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TailerSettings {
    #[serde(default = "default_tailer_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for TailerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_tailer_poll_interval_ms(),
        }
    }
}

/// Crash report correlation
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CrashSettings {
    /// How long to keep looking for reports after the app exits
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    #[serde(default = "default_crash_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Overrides the detected DiagnosticReports directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crash_dir: Option<PathBuf>,
}

impl Default for CrashSettings {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
            poll_interval_ms: default_crash_poll_interval_ms(),
            crash_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DetectorSettings {
    /// With auto-exit, quiet time after app start before termination is requested
    #[serde(default = "default_auto_exit_idle_ms")]
    pub auto_exit_idle_ms: u64,

    #[serde(default = "default_start_marker")]
    pub result_start_marker: String,

    #[serde(default = "default_stop_marker")]
    pub result_stop_marker: String,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            auto_exit_idle_ms: default_auto_exit_idle_ms(),
            result_start_marker: default_start_marker(),
            result_stop_marker: default_stop_marker(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CompanionSettings {
    /// Treat a failed watch pairing as fatal
    #[serde(default)]
    pub required: bool,

    #[serde(default = "default_boot_timeout_ms")]
    pub boot_timeout_ms: u64,
}

impl Default for CompanionSettings {
    fn default() -> Self {
        Self {
            required: false,
            boot_timeout_ms: default_boot_timeout_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_boot_timeout_ms() -> u64 {
    60_000
}

fn default_boot_poll_interval_ms() -> u64 {
    500
}

fn default_stop_timeout_ms() -> u64 {
    5_000
}

fn default_tailer_poll_interval_ms() -> u64 {
    100
}

fn default_grace_period_ms() -> u64 {
    5_000
}

fn default_crash_poll_interval_ms() -> u64 {
    250
}

fn default_auto_exit_idle_ms() -> u64 {
    10_000
}

fn default_start_marker() -> String {
    RESULT_START_MARKER.to_string()
}

fn default_stop_marker() -> String {
    RESULT_STOP_MARKER.to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Runtime config
// ─────────────────────────────────────────────────────────────────────────────

/// Timing and protocol knobs for the Session Supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub boot_timeout: Duration,
    pub boot_poll_interval: Duration,
    pub stop_timeout: Duration,
    pub activate_window: bool,
    pub tailer_poll_interval: Duration,
    pub crash_grace_period: Duration,
    pub crash_poll_interval: Duration,
    pub crash_dir: Option<PathBuf>,
    pub auto_exit_idle: Duration,
    pub result_start_marker: String,
    pub result_stop_marker: String,
    pub companion_required: bool,
    pub companion_boot_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Settings::default().into()
    }
}

impl From<Settings> for SupervisorConfig {
    fn from(s: Settings) -> Self {
        Self {
            boot_timeout: Duration::from_millis(s.session.boot_timeout_ms),
            boot_poll_interval: Duration::from_millis(s.session.boot_poll_interval_ms),
            stop_timeout: Duration::from_millis(s.session.stop_timeout_ms),
            activate_window: s.session.activate_window,
            tailer_poll_interval: Duration::from_millis(s.tailer.poll_interval_ms),
            crash_grace_period: Duration::from_millis(s.crash.grace_period_ms),
            crash_poll_interval: Duration::from_millis(s.crash.poll_interval_ms),
            crash_dir: s.crash.crash_dir,
            auto_exit_idle: Duration::from_millis(s.detector.auto_exit_idle_ms),
            result_start_marker: s.detector.result_start_marker,
            result_stop_marker: s.detector.result_stop_marker,
            companion_required: s.companion.required,
            companion_boot_timeout: Duration::from_millis(s.companion.boot_timeout_ms),
        }
    }
}
