//! # simdemon-daemon - Simulator Process Management
//!
//! Everything that touches external processes or the filesystem: toolchain
//! discovery, the Runtime Catalog, `simctl` device control, managed child
//! processes, log tailing, crash report correlation, app bundles and builds.
//!
//! Depends on [`simdemon_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Discovery
//! - [`ToolchainDiscovery`] / [`XcodeDiscovery`] - Installed Xcode toolchains
//! - [`RuntimeDetector`] / [`RuntimeCatalog`] - Enumerate simulators via `simctl list -j`
//!
//! ### Device Control
//! - [`DeviceControl`] / [`SimctlControl`] - Boot, install, launch, terminate, shut down
//! - [`ManagedProcess`] - Long-lived child process with exit notification
//!
//! ### Observation
//! - [`LogTailer`] - Follow log files from their current end
//! - [`CrashCorrelator`] - Match crash reports to a quit app
//!
//! ### Apps
//! - [`AppBundle`] - Bundle identifier and executable of a built `.app`
//! - [`AppBuilder`] / [`XcodeBuilder`] - Build a scheme for the simulator

pub mod builder;
pub mod bundle;
pub mod catalog;
pub mod crash;
pub mod process;
pub mod simctl;
pub mod tailer;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;
pub mod toolchain;

pub use builder::{AppBuilder, LocalAppBuilder, XcodeBuilder};
pub use bundle::AppBundle;
pub use catalog::{CatalogPaths, LocalRuntimeDetector, RuntimeCatalog, RuntimeDetector};
pub use crash::CrashCorrelator;
pub use process::ManagedProcess;
pub use simctl::{DeviceControl, LocalDeviceControl, SimctlControl, SimulatorState};
pub use tailer::{LogTailer, TailedLine};
pub use toolchain::{
    LocalToolchainDiscovery, Toolchain, ToolchainDiscovery, ToolchainExecutables, XcodeDiscovery,
};
