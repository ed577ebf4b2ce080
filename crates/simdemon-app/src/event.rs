//! Lifecycle events published by a launch
//!
//! A launch returns a stream of [`LifecycleEvent`]s. The stream closing is the
//! terminal state: after an [`LifecycleEvent::Error`] or a completed teardown
//! no further events arrive.

use simdemon_core::{CrashArtifact, Error, Issue, LogSource, StructuredResult};

use crate::handle::SessionHandle;

#[derive(Debug)]
pub enum LifecycleEvent {
    /// One tailed log line
    Log {
        session: SessionHandle,
        source: LogSource,
        line: String,
    },

    /// Supervisor diagnostics
    Debug {
        session: SessionHandle,
        message: String,
    },

    /// The primary session is usable. Always precedes app events.
    Launched {
        primary: SessionHandle,
        companion: Option<SessionHandle>,
        /// Non-fatal anomalies, e.g. a companion that could not be paired
        issues: Vec<Issue>,
    },

    AppStarted {
        session: SessionHandle,
        pid: Option<u32>,
    },

    /// The app exited. `crash` is `None` for a clean exit.
    AppQuit {
        session: SessionHandle,
        crash: Option<CrashArtifact>,
    },

    /// A closed result region
    StructuredResult {
        session: SessionHandle,
        result: StructuredResult,
    },

    /// Fatal to the launch; the stream closes afterwards
    Error(Error),
}

impl LifecycleEvent {
    /// Event tag as used in NDJSON output
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Log {
                source: LogSource::AppLogFile(_),
                ..
            } => "log-file",
            LifecycleEvent::Log { .. } => "log",
            LifecycleEvent::Debug { .. } => "log-debug",
            LifecycleEvent::Launched { .. } => "launched",
            LifecycleEvent::AppStarted { .. } => "app-started",
            LifecycleEvent::AppQuit { .. } => "app-quit",
            LifecycleEvent::StructuredResult { .. } => "structured-result",
            LifecycleEvent::Error(_) => "error",
        }
    }

    /// The session this event belongs to, if any
    pub fn session(&self) -> Option<&SessionHandle> {
        match self {
            LifecycleEvent::Log { session, .. }
            | LifecycleEvent::Debug { session, .. }
            | LifecycleEvent::AppStarted { session, .. }
            | LifecycleEvent::AppQuit { session, .. }
            | LifecycleEvent::StructuredResult { session, .. } => Some(session),
            LifecycleEvent::Launched { primary, .. } => Some(primary),
            LifecycleEvent::Error(_) => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, LifecycleEvent::Error(_))
    }
}
