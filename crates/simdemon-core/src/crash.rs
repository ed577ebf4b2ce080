//! Crash artifact produced when an app exits through a crash

use std::path::PathBuf;

use thiserror::Error;

/// An app crash observed in the simulator.
///
/// This is a normal outcome of an app quitting, not a supervisor failure.
/// The referenced report files belong to the caller, who is responsible for
/// deleting them once they have been inspected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CrashArtifact {
    pub message: String,
    /// Crash report files, sorted by file name
    pub crash_files: Vec<PathBuf>,
}

impl CrashArtifact {
    pub const DEFAULT_MESSAGE: &'static str = "App crashed in the iOS Simulator";

    pub fn new(mut crash_files: Vec<PathBuf>) -> Self {
        crash_files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Self {
            message: Self::DEFAULT_MESSAGE.to_string(),
            crash_files,
        }
    }

    /// Delete every referenced report that still exists
    pub fn remove_files(&self) -> std::io::Result<()> {
        for file in &self.crash_files {
            if file.exists() {
                std::fs::remove_file(file)?;
            }
        }
        Ok(())
    }
}
