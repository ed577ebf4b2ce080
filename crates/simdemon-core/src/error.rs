//! Application error types with rich context

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Toolchain/Catalog Errors
    // ─────────────────────────────────────────────────────────────
    #[error("No Xcode toolchain found. Install Xcode or run xcode-select.")]
    ToolchainNotFound,

    #[error("Toolchain error: {message}")]
    Toolchain { message: String },

    #[error("No simulator runtime matches: {constraint}")]
    NoMatchingRuntime { constraint: String },

    #[error("Simulator not found: {udid}")]
    UnknownDevice { udid: String },

    #[error("simctl error: {message}")]
    Simctl { message: String },

    #[error("Build failed: {message}")]
    Build { message: String },

    #[error("Invalid app bundle: {path}")]
    InvalidBundle { path: PathBuf },

    // ─────────────────────────────────────────────────────────────
    // Session/Launch Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Process error: {message}")]
    Process { message: String },

    #[error("Failed to spawn {program}: {reason}")]
    ProcessSpawn { program: String, reason: String },

    #[error("Simulator {udid} did not become ready within {timeout:?}")]
    BootTimeout { udid: String, timeout: Duration },

    #[error("Watch app pairing failed: {message}")]
    Pairing { message: String },

    #[error("Session error: {message}")]
    Session { message: String },

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn toolchain(message: impl Into<String>) -> Self {
        Self::Toolchain {
            message: message.into(),
        }
    }

    pub fn simctl(message: impl Into<String>) -> Self {
        Self::Simctl {
            message: message.into(),
        }
    }

    pub fn build(message: impl Into<String>) -> Self {
        Self::Build {
            message: message.into(),
        }
    }

    pub fn process(message: impl Into<String>) -> Self {
        Self::Process {
            message: message.into(),
        }
    }

    pub fn spawn(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProcessSpawn {
            program: program.into(),
            reason: reason.into(),
        }
    }

    pub fn pairing(message: impl Into<String>) -> Self {
        Self::Pairing {
            message: message.into(),
        }
    }

    pub fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn no_matching_runtime(constraint: impl Into<String>) -> Self {
        Self::NoMatchingRuntime {
            constraint: constraint.into(),
        }
    }

    pub fn unknown_device(udid: impl Into<String>) -> Self {
        Self::UnknownDevice { udid: udid.into() }
    }

    /// Check if retrying the same step may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Simctl { .. } | Error::Pairing { .. })
    }

    /// Check if this error ends a launch attempt
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ToolchainNotFound
                | Error::NoMatchingRuntime { .. }
                | Error::UnknownDevice { .. }
                | Error::ProcessSpawn { .. }
                | Error::BootTimeout { .. }
                | Error::InvalidBundle { .. }
        )
    }
}
