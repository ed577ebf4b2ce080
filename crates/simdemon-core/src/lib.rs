//! # simdemon-core - Core Domain Types
//!
//! Foundation crate for Simulator Demon. Provides the simulator catalog
//! types, error handling, logging setup, the structured result marker
//! protocol and dotted-version matching.
//!
//! This crate has **zero internal dependencies**.
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`DeviceRuntime`] - One simulator (device type + OS version) with its on-disk paths
//! - [`DetectionResult`] - Output of a catalog detection pass
//! - [`Issue`], [`IssueSeverity`] - Non-fatal anomalies collected during detection
//! - [`SessionState`], [`SessionKind`], [`LogSource`] - Session bookkeeping
//!
//! ### Crashes (`crash`)
//! - [`CrashArtifact`] - Typed error carrying the crash report files of a crashed app
//!
//! ### Protocol (`protocol`)
//! - [`ResultMarkerParser`] - State machine for `RESULT_START` / `RESULT_STOP` regions
//! - [`ParseFailure`] - Malformed structured payload
//!
//! ### Error Handling (`error`)
//! - [`Error`], [`Result`]
//!
//! ## Prelude
//!
//! ```rust
//! use simdemon_core::prelude::*;
//! ```

pub mod crash;
pub mod error;
pub mod events;
pub mod logging;
pub mod protocol;
pub mod types;
pub mod version;

/// Prelude for common imports used throughout all Simulator Demon crates
pub mod prelude {
    pub use super::error::{Error, Result};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

pub use crash::CrashArtifact;
pub use error::{Error, Result};
pub use events::{ProcessEvent, ProcessEventKind, ProcessRole};
pub use protocol::{
    strip_level_tag, MarkerState, ParseFailure, ResultMarkerParser, StructuredResult,
    RESULT_START_MARKER, RESULT_STOP_MARKER,
};
pub use types::{
    issue_ids, Capabilities, DetectionResult, DeviceRuntime, Issue, IssueSeverity, LogSource, SessionKind,
    SessionState,
};
pub use version::Version;
