//! # simdemon-app - Session Orchestration
//!
//! Drives simulator sessions on top of [`simdemon_daemon`]: picks a
//! simulator, boots it, installs and launches the app, follows its logs,
//! recognises the app starting and quitting, correlates crash reports and
//! pairs a companion watch simulator.
//!
//! ## Public API
//!
//! ### Supervisor (`supervisor`)
//! - [`SessionSupervisor`] - `detect()` and `launch()`
//! - [`LaunchOptions`] - Per-launch options (builder style)
//! - [`LaunchStream`] - Event stream of one launch; dropping it tears the session down
//!
//! ### Sessions (`handle`, `event`)
//! - [`SessionHandle`], [`SessionStatus`] - Cloneable view of a running session
//! - [`LifecycleEvent`] - `log`, `log-file`, `log-debug`, `launched`, `app-started`,
//!   `app-quit`, `structured-result`, `error`
//!
//! ### Detection (`detector`, `results`)
//! - [`AppLifecycleDetector`] - App start and result regions from log lines
//! - [`watch_results`] - First structured result of a launch
//!
//! ### Configuration (`config`)
//! - [`Settings`], [`SupervisorConfig`], [`load_settings`], [`init_config_dir`]

pub mod config;
pub mod detector;
pub mod event;
pub mod handle;
mod pairing;
pub mod results;
mod session;
pub mod supervisor;

pub use config::{init_config_dir, load_settings, Settings, SupervisorConfig};
pub use detector::{AppLifecycleDetector, AppState, DetectorSignal};
pub use event::LifecycleEvent;
pub use handle::{SessionHandle, SessionStatus};
pub use results::watch_results;
pub use supervisor::{LaunchOptions, LaunchStream, SessionSupervisor, SimctlSupervisor};
