//! Core domain types: simulator runtimes, detection results, session state

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::version;

// ─────────────────────────────────────────────────────────────────────────────
// DeviceRuntime
// ─────────────────────────────────────────────────────────────────────────────

/// One enumerable (device type, OS version) simulator.
///
/// Built fresh by every detection call and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRuntime {
    /// Stable identifier, unique within a detection result
    pub udid: String,
    /// Device type identifier, e.g. `com.apple.CoreSimulator.SimDeviceType.iPhone-15`
    pub device_type: String,
    /// Product family, e.g. `iPhone`, `iPad`, `Apple Watch`
    #[serde(rename = "type")]
    pub family: String,
    pub name: String,
    /// OS version string, e.g. `17.2`
    pub os_version: String,
    pub capabilities: Capabilities,
    /// Version of the toolchain this simulator is driven by
    pub toolchain_version: String,
    /// Install path of that toolchain (its `Contents/Developer` dir)
    pub toolchain_path: PathBuf,
    /// Session-runner executable (the Simulator app binary)
    pub simulator: PathBuf,
    /// Session-control executable (`simctl`)
    pub simctl: PathBuf,
    /// Aggregate system log, if the device had written one at detection
    pub system_log: Option<PathBuf>,
    /// Additional log locations that existed at detection
    pub log_paths: Vec<PathBuf>,
}

impl DeviceRuntime {
    /// Executable paths that must exist for the simulator to be launchable
    pub fn required_paths(&self) -> [&Path; 3] {
        [&self.toolchain_path, &self.simulator, &self.simctl]
    }

    /// Paths from `required_paths` that are missing on disk
    pub fn missing_paths(&self) -> Vec<&Path> {
        self.required_paths()
            .into_iter()
            .filter(|p| !p.exists())
            .collect()
    }

    pub fn is_watch(&self) -> bool {
        self.family.contains("Watch")
    }
}

impl fmt::Display for DeviceRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) [{}]", self.name, self.os_version, self.udid)
    }
}

/// Capability flags derived from the device type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub retina: bool,
    pub tall: bool,
    #[serde(rename = "64bit")]
    pub sixty_four_bit: bool,
    pub resizable: bool,
    pub supports_watch: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Issues
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueSeverity::Info => write!(f, "info"),
            IssueSeverity::Warning => write!(f, "warning"),
            IssueSeverity::Error => write!(f, "error"),
        }
    }
}

/// Stable identifiers for [`Issue::id`]
pub mod issue_ids {
    pub const NO_TOOLCHAIN: &str = "NO_TOOLCHAIN";
    pub const SIMCTL_FAILED: &str = "SIMCTL_FAILED";
    pub const TOOLCHAIN_FALLBACK: &str = "TOOLCHAIN_FALLBACK";
    pub const SIMULATOR_EXECUTABLE_MISSING: &str = "SIMULATOR_EXECUTABLE_MISSING";
    pub const SIMULATOR_UNAVAILABLE: &str = "SIMULATOR_UNAVAILABLE";
    pub const WATCH_PAIRING_FAILED: &str = "WATCH_PAIRING_FAILED";
    pub const NO_PAIRED_COMPANION: &str = "NO_PAIRED_COMPANION";
    pub const LOG_PATHS_MISSING: &str = "LOG_PATHS_MISSING";
}

/// Non-fatal anomaly collected during detection or launch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    #[serde(rename = "type")]
    pub severity: IssueSeverity,
    pub message: String,
}

impl Issue {
    pub fn new(id: impl Into<String>, severity: IssueSeverity, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            severity,
            message: message.into(),
        }
    }

    pub fn info(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(id, IssueSeverity::Info, message)
    }

    pub fn warning(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(id, IssueSeverity::Warning, message)
    }

    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(id, IssueSeverity::Error, message)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DetectionResult
// ─────────────────────────────────────────────────────────────────────────────

/// Output of one Runtime Catalog detection pass. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    /// OS version → primary (phone/tablet) simulators
    pub simulators: BTreeMap<String, Vec<DeviceRuntime>>,
    /// OS version → companion (watch) simulators
    pub watch_simulators: BTreeMap<String, Vec<DeviceRuntime>>,
    /// Companion udid → paired primary udid
    pub device_pairs: HashMap<String, String>,
    /// Shared crash-report directory (may not exist yet)
    pub crash_dir: PathBuf,
    pub issues: Vec<Issue>,
}

impl DetectionResult {
    /// True when no simulator of any kind was found
    pub fn is_empty(&self) -> bool {
        self.simulators.values().all(Vec::is_empty)
            && self.watch_simulators.values().all(Vec::is_empty)
    }

    pub fn has_errors(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.severity == IssueSeverity::Error)
    }

    /// Iterate over every primary and companion simulator
    pub fn all_devices(&self) -> impl Iterator<Item = &DeviceRuntime> {
        self.simulators
            .values()
            .chain(self.watch_simulators.values())
            .flatten()
    }

    pub fn find(&self, udid: &str) -> Option<&DeviceRuntime> {
        self.all_devices().find(|d| d.udid == udid)
    }

    /// Companion simulator paired with the given primary, if any
    pub fn companion_for(&self, primary_udid: &str) -> Option<&DeviceRuntime> {
        let mut watches: Vec<&String> = self
            .device_pairs
            .iter()
            .filter(|(_, phone)| phone.as_str() == primary_udid)
            .map(|(watch, _)| watch)
            .collect();
        watches.sort();
        watches.into_iter().find_map(|udid| self.find(udid))
    }

    /// Pick a default primary simulator.
    ///
    /// OS versions are sorted newest first; the first version satisfying
    /// `constraint` (or any, when `None`) wins, and the last simulator listed
    /// for that version is returned.
    pub fn default_device(&self, constraint: Option<&str>) -> Option<&DeviceRuntime> {
        let mut versions: Vec<&String> = self.simulators.keys().collect();
        versions.sort_by(|a, b| version::compare(b, a));

        versions
            .into_iter()
            .filter(|v| constraint.map_or(true, |c| version::satisfies(v, c)))
            .find_map(|v| self.simulators.get(v).and_then(|list| list.last()))
    }

    /// Identifiers of every simulator, sorted
    pub fn udids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.all_devices().map(|d| d.udid.as_str()).collect();
        ids.sort_unstable();
        ids
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session state
// ─────────────────────────────────────────────────────────────────────────────

/// Session Supervisor state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    Ready,
    Running,
    Stopping,
    Stopped,
    /// Absorbing; reached from `Starting`, `Ready` or `Running` on a fatal error
    Failed,
}

impl SessionState {
    /// No further transitions will happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Failed)
    }

    /// Check whether the state machine permits moving to `next`
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Idle, Starting) => true,
            (Starting, Ready) | (Ready, Running) => true,
            (Starting | Ready | Running, Failed) => true,
            (Stopped | Failed, _) => false,
            (_, Stopping) => true,
            (Stopping, Stopped) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Ready => "ready",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
            SessionState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Whether a session drives the primary simulator or its paired watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Primary,
    Companion,
}

/// Origin of a tailed log line
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum LogSource {
    /// The simulator's aggregate `system.log`
    SystemLog,
    /// Stdout/stderr of the app console (session-control) process
    AppConsole,
    /// A log file written by the app into its data container
    AppLogFile(PathBuf),
    /// Console output of the watch app on a paired companion
    Companion,
}

impl LogSource {
    /// Short label used in NDJSON output
    pub fn label(&self) -> &'static str {
        match self {
            LogSource::SystemLog => "system",
            LogSource::AppConsole => "console",
            LogSource::AppLogFile(_) => "file",
            LogSource::Companion => "companion",
        }
    }
}
