//! NDJSON output of launch events
//!
//! Every [`LifecycleEvent`] of a launch is printed to stdout as one JSON
//! object per line. Each object has an `"event"` field naming its type.
//!
//! # Example Output
//!
//! ```json
//! {"event":"launched","udid":"5A1F…","companion_udid":null,"issues":[],"timestamp":1704700001000}
//! {"event":"app-started","udid":"5A1F…","pid":4242,"timestamp":1704700002000}
//! {"event":"log","source":"console","udid":"5A1F…","line":"hello","timestamp":1704700002100}
//! {"event":"app-quit","udid":"5A1F…","crashed":false,"message":null,"crash_files":[],"timestamp":1704700003000}
//! ```

use std::io::{self, Write};
use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::error;

use simdemon_app::LifecycleEvent;
use simdemon_core::{CrashArtifact, Issue, LogSource, StructuredResult};

/// One line of launch output
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum NdjsonEvent {
    /// Tailed line from the system log, the app console or the companion
    Log {
        source: &'static str,
        udid: Option<String>,
        line: String,
        timestamp: i64,
    },

    /// Tailed line from the app's own log file
    LogFile {
        path: PathBuf,
        udid: Option<String>,
        line: String,
        timestamp: i64,
    },

    LogDebug {
        udid: Option<String>,
        message: String,
        timestamp: i64,
    },

    Launched {
        udid: Option<String>,
        companion_udid: Option<String>,
        issues: Vec<Issue>,
        timestamp: i64,
    },

    AppStarted {
        udid: Option<String>,
        pid: Option<u32>,
        timestamp: i64,
    },

    AppQuit {
        udid: Option<String>,
        crashed: bool,
        message: Option<String>,
        crash_files: Vec<PathBuf>,
        timestamp: i64,
    },

    /// `result` is set for valid JSON, `error` and `payload` otherwise
    StructuredResult {
        udid: Option<String>,
        result: Option<Value>,
        error: Option<String>,
        payload: Option<String>,
        timestamp: i64,
    },

    Error {
        message: String,
        fatal: bool,
        timestamp: i64,
    },
}

impl NdjsonEvent {
    /// Emit this event to stdout as JSON
    pub fn emit(&self) {
        let json = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize event: {}", e);
                return;
            }
        };

        let mut stdout = io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", json) {
            error!("Failed to write event to stdout: {}", e);
            return;
        }
        if let Err(e) = stdout.flush() {
            error!("Failed to flush stdout: {}", e);
        }
    }

    /// Current timestamp in milliseconds
    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }

    pub fn from_lifecycle(event: &LifecycleEvent) -> Self {
        let udid = event.session().and_then(|s| s.udid());
        match event {
            LifecycleEvent::Log { source, line, .. } => Self::log(source, udid, line),
            LifecycleEvent::Debug { message, .. } => Self::LogDebug {
                udid,
                message: message.clone(),
                timestamp: Self::now(),
            },
            LifecycleEvent::Launched {
                companion, issues, ..
            } => Self::Launched {
                udid,
                companion_udid: companion.as_ref().and_then(|c| c.udid()),
                issues: issues.clone(),
                timestamp: Self::now(),
            },
            LifecycleEvent::AppStarted { pid, .. } => Self::AppStarted {
                udid,
                pid: *pid,
                timestamp: Self::now(),
            },
            LifecycleEvent::AppQuit { crash, .. } => Self::app_quit(udid, crash.as_ref()),
            LifecycleEvent::StructuredResult { result, .. } => Self::structured_result(udid, result),
            LifecycleEvent::Error(e) => Self::Error {
                message: e.to_string(),
                fatal: e.is_fatal(),
                timestamp: Self::now(),
            },
        }
    }

    // ─────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────

    pub fn log(source: &LogSource, udid: Option<String>, line: &str) -> Self {
        match source {
            LogSource::AppLogFile(path) => Self::LogFile {
                path: path.clone(),
                udid,
                line: line.to_string(),
                timestamp: Self::now(),
            },
            other => Self::Log {
                source: other.label(),
                udid,
                line: line.to_string(),
                timestamp: Self::now(),
            },
        }
    }

    pub fn app_quit(udid: Option<String>, crash: Option<&CrashArtifact>) -> Self {
        Self::AppQuit {
            udid,
            crashed: crash.is_some(),
            message: crash.map(|c| c.message.clone()),
            crash_files: crash.map(|c| c.crash_files.clone()).unwrap_or_default(),
            timestamp: Self::now(),
        }
    }

    pub fn structured_result(udid: Option<String>, result: &StructuredResult) -> Self {
        let (result, error, payload) = match result {
            Ok(value) => (Some(value.clone()), None, None),
            Err(failure) => (
                None,
                Some(format!("{}: {}", failure, failure.reason)),
                Some(failure.payload.clone()),
            ),
        };
        Self::StructuredResult {
            udid,
            result,
            error,
            payload,
            timestamp: Self::now(),
        }
    }
}
