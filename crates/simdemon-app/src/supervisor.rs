//! Session Supervisor
//!
//! Entry point for launching simulator sessions. [`SessionSupervisor::launch`]
//! returns immediately with a [`LaunchStream`]; the session runs on its own
//! task and reports progress as [`LifecycleEvent`]s until the stream closes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use simdemon_core::prelude::*;
use simdemon_core::{DetectionResult, SessionKind};
use simdemon_daemon::{DeviceControl, RuntimeCatalog, RuntimeDetector, SimctlControl, XcodeDiscovery};

use crate::config::SupervisorConfig;
use crate::event::LifecycleEvent;
use crate::handle::{new_session, SessionHandle};
use crate::session::PrimarySession;

/// Buffered events per launch before the session waits on the consumer
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// How long `stop()` waits for a session to acknowledge.
///
/// Covers each bounded teardown step; the primary also stops its companion.
pub(crate) fn stop_bound(config: &SupervisorConfig, kind: SessionKind) -> Duration {
    let steps = match kind {
        SessionKind::Primary => 10,
        SessionKind::Companion => 4,
    };
    config.stop_timeout * steps + Duration::from_secs(1)
}

/// Options for one launch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Built `.app` to install and run after boot
    pub app_path: Option<PathBuf>,
    /// Run an already installed app instead of installing one
    pub launch_bundle_id: Option<String>,
    /// Terminate the app once no further activity is expected, then tear down
    pub auto_exit: bool,
    /// Do not bring the Simulator window to the foreground
    pub hide: bool,
    /// Pair the watch simulator and launch the watch half of the bundle
    pub launch_watch_app: bool,
    /// Fail the launch if pairing fails
    pub watch_required: bool,
    /// Watch simulator to pair with instead of the catalog's pairing
    pub watch_udid: Option<String>,
    /// Version constraint for picking the default simulator
    pub os_version: Option<String>,
    /// Log file the app writes into its data container's `Documents/`
    pub log_filename: Option<String>,
    /// Shut the simulator down first if it is already booted
    pub kill_if_running: bool,
    /// Overrides the configured boot timeout
    pub boot_timeout: Option<Duration>,
}

impl LaunchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn app_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.app_path = Some(path.into());
        self
    }

    pub fn launch_bundle_id(mut self, bundle_id: impl Into<String>) -> Self {
        self.launch_bundle_id = Some(bundle_id.into());
        self
    }

    pub fn auto_exit(mut self, auto_exit: bool) -> Self {
        self.auto_exit = auto_exit;
        self
    }

    pub fn hide(mut self, hide: bool) -> Self {
        self.hide = hide;
        self
    }

    pub fn launch_watch_app(mut self, launch: bool) -> Self {
        self.launch_watch_app = launch;
        self
    }

    pub fn watch_required(mut self, required: bool) -> Self {
        self.watch_required = required;
        self
    }

    pub fn watch_udid(mut self, udid: impl Into<String>) -> Self {
        self.watch_udid = Some(udid.into());
        self
    }

    pub fn os_version(mut self, constraint: impl Into<String>) -> Self {
        self.os_version = Some(constraint.into());
        self
    }

    pub fn log_filename(mut self, name: impl Into<String>) -> Self {
        self.log_filename = Some(name.into());
        self
    }

    pub fn kill_if_running(mut self, kill: bool) -> Self {
        self.kill_if_running = kill;
        self
    }

    pub fn boot_timeout(mut self, timeout: Duration) -> Self {
        self.boot_timeout = Some(timeout);
        self
    }
}

/// The event stream of one launch.
///
/// Dropping it tears the session down.
#[derive(Debug)]
pub struct LaunchStream {
    events: mpsc::Receiver<LifecycleEvent>,
    handle: SessionHandle,
}

impl LaunchStream {
    /// Next event, or `None` once the session has ended
    pub async fn next(&mut self) -> Option<LifecycleEvent> {
        self.events.recv().await
    }

    /// Handle to the primary session, usable before `launched` arrives
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub async fn stop(&self) {
        self.handle.stop().await;
    }
}

/// Launches simulator sessions
pub struct SessionSupervisor<D, C> {
    catalog: Arc<D>,
    control: Arc<C>,
    config: SupervisorConfig,
}

/// Supervisor backed by the installed Xcode toolchains
pub type SimctlSupervisor = SessionSupervisor<RuntimeCatalog<XcodeDiscovery>, SimctlControl>;

impl SimctlSupervisor {
    pub fn system(config: SupervisorConfig) -> Self {
        Self::new(
            RuntimeCatalog::new(XcodeDiscovery::new()),
            SimctlControl::new(),
            config,
        )
    }
}

impl<D, C> SessionSupervisor<D, C>
where
    D: RuntimeDetector + Send + Sync + 'static,
    C: DeviceControl + Send + Sync + 'static,
{
    pub fn new(catalog: D, control: C, config: SupervisorConfig) -> Self {
        Self {
            catalog: Arc::new(catalog),
            control: Arc::new(control),
            config,
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Enumerate simulators
    pub async fn detect(&self) -> DetectionResult {
        self.catalog.detect().await
    }

    /// Start a session on `target`, or on the default simulator when `None`.
    ///
    /// Returns immediately. Failures, including an unknown target or a boot
    /// timeout, arrive as [`LifecycleEvent::Error`].
    pub fn launch(&self, target: Option<&str>, options: LaunchOptions) -> LaunchStream {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (handle, control) = new_session(
            SessionKind::Primary,
            stop_bound(&self.config, SessionKind::Primary),
        );
        debug!("Launching session {} ({:?})", handle.id(), target);

        let session = PrimarySession::new(
            Arc::clone(&self.catalog),
            Arc::clone(&self.control),
            self.config.clone(),
            options,
            target.map(str::to_string),
            handle.clone(),
            control,
            events_tx,
        );
        tokio::spawn(session.run());

        LaunchStream {
            events: events_rx,
            handle,
        }
    }
}
