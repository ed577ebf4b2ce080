//! Crash Correlator
//!
//! After an app quits, looks for crash reports it left in the shared
//! diagnostic reports directory. Reports can land shortly after the process
//! dies, so [`CrashCorrelator::correlate`] keeps rescanning for a bounded
//! grace period before declaring a clean exit.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use simdemon_core::prelude::*;
use simdemon_core::CrashArtifact;

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Report file timestamps have one-second resolution on some filesystems
const TIMESTAMP_SLACK: Duration = Duration::from_secs(1);

const REPORT_EXTENSIONS: &[&str] = &["crash", "ips"];

#[derive(Debug, Clone)]
pub struct CrashCorrelator {
    crash_dir: PathBuf,
    since: SystemTime,
    grace_period: Duration,
    poll_interval: Duration,
}

impl CrashCorrelator {
    /// Correlate reports written into `crash_dir` at or after `since`
    pub fn new(crash_dir: impl Into<PathBuf>, since: SystemTime) -> Self {
        Self {
            crash_dir: crash_dir.into(),
            since,
            grace_period: DEFAULT_GRACE_PERIOD,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn crash_dir(&self) -> &std::path::Path {
        &self.crash_dir
    }

    /// Reports for `executable` currently on disk, sorted by file name.
    ///
    /// A report matches when its name is `<executable>_…` or `<executable>-…`
    /// with a `.crash` or `.ips` extension and it was modified since session start.
    pub fn scan(&self, executable: &str) -> Vec<PathBuf> {
        let entries = match std::fs::read_dir(&self.crash_dir) {
            Ok(entries) => entries,
            Err(e) => {
                trace!("Cannot read {}: {}", self.crash_dir.display(), e);
                return Vec::new();
            }
        };

        let cutoff = self
            .since
            .checked_sub(TIMESTAMP_SLACK)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut matches: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|path| is_report_for(path, executable))
            .filter(|path| {
                std::fs::metadata(path)
                    .and_then(|m| m.modified())
                    .is_ok_and(|modified| modified >= cutoff)
            })
            .collect();

        matches.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        matches
    }

    /// Wait up to the grace period for crash reports of `executable`.
    ///
    /// Returns `None` for a clean exit.
    pub async fn correlate(&self, executable: &str) -> Option<CrashArtifact> {
        let deadline = tokio::time::Instant::now() + self.grace_period;

        loop {
            let files = self.scan(executable);
            if !files.is_empty() {
                info!("{} crashed, {} report(s) found", executable, files.len());
                return Some(CrashArtifact::new(files));
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                debug!("No crash report for {} within {:?}", executable, self.grace_period);
                return None;
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

fn is_report_for(path: &std::path::Path, executable: &str) -> bool {
    let extension_ok = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| REPORT_EXTENSIONS.contains(&e));
    if !extension_ok || executable.is_empty() {
        return false;
    }

    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_prefix(executable))
        .is_some_and(|rest| rest.starts_with('_') || rest.starts_with('-'))
}
