//! Primary session task
//!
//! One task per launch drives a simulator through
//! `starting → ready → running → stopping → stopped`. Every step of the start
//! sequence races stop requests and the caller dropping the event stream, so
//! cancelling while starting goes straight to teardown.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use simdemon_core::prelude::*;
use simdemon_core::{
    issue_ids, DetectionResult, DeviceRuntime, Issue, LogSource, ProcessEvent, ProcessEventKind,
    ProcessRole, SessionState,
};
use simdemon_daemon::{
    AppBundle, CrashCorrelator, DeviceControl, LogTailer, ManagedProcess, RuntimeDetector,
    TailedLine,
};

use crate::config::SupervisorConfig;
use crate::detector::{AppLifecycleDetector, DetectorSignal};
use crate::event::LifecycleEvent;
use crate::handle::{ControlCommand, SessionControl, SessionHandle};
use crate::pairing::{self, CompanionLaunch, PairingFailure};
use crate::supervisor::LaunchOptions;

/// Capacity of the per-session tailed line and process event channels
const INTERNAL_CHANNEL_CAPACITY: usize = 256;

// ─────────────────────────────────────────────────────────────────────────────
// Shared step helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Why a guarded step did not complete
pub(crate) enum Interrupt {
    /// `stop()` was called; ack once torn down
    Stop(oneshot::Sender<()>),
    /// The event stream was dropped
    Closed,
    Failed(Error),
}

impl From<Error> for Interrupt {
    fn from(error: Error) -> Self {
        Interrupt::Failed(error)
    }
}

/// Run one step unless a stop request or stream closure arrives first
pub(crate) async fn guarded<T, F>(
    control_rx: &mut mpsc::Receiver<ControlCommand>,
    events: &mpsc::Sender<LifecycleEvent>,
    step: F,
) -> std::result::Result<T, Interrupt>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        result = step => result.map_err(Interrupt::Failed),
        command = control_rx.recv() => match command {
            Some(ControlCommand::Stop { ack }) => Err(Interrupt::Stop(ack)),
            None => Err(Interrupt::Closed),
        },
        _ = events.closed() => Err(Interrupt::Closed),
    }
}

/// Poll `is_booted` until the device reports booted.
///
/// Recoverable errors are retried until `timeout`; any other error ends the wait.
pub(crate) async fn wait_until_booted<C: DeviceControl + Sync>(
    control: &C,
    device: &DeviceRuntime,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let poll = async {
        loop {
            match control.is_booted(device).await {
                Ok(true) => return Ok(()),
                Ok(false) => trace!("{} not booted yet", device.udid),
                Err(e) if e.is_recoverable() => {
                    debug!("Boot state of {} unknown: {}", device.udid, e)
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(poll_interval).await;
        }
    };

    tokio::time::timeout(timeout, poll)
        .await
        .map_err(|_| Error::BootTimeout {
            udid: device.udid.clone(),
            timeout,
        })?
}

/// Run a teardown step with an upper bound
pub(crate) async fn bounded<F>(limit: Duration, step: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    tokio::time::timeout(limit, step)
        .await
        .map_err(|_| Error::session(format!("timed out after {:?}", limit)))?
}

/// Stop a child process, gracefully or not
pub(crate) async fn retire(mut process: ManagedProcess, graceful: bool, bound: Duration) {
    if graceful {
        process.shutdown(bound).await;
    } else {
        process.force_kill();
        process.wait_exited(bound).await;
    }
}

/// Ack every stop request still queued
pub(crate) fn ack_pending(control_rx: &mut mpsc::Receiver<ControlCommand>) {
    while let Ok(ControlCommand::Stop { ack }) = control_rx.try_recv() {
        let _ = ack.send(());
    }
}

pub(crate) async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Pick the simulator for a launch
pub(crate) fn resolve_device(
    detection: &DetectionResult,
    target: Option<&str>,
    os_version: Option<&str>,
) -> Result<DeviceRuntime> {
    if detection.is_empty() {
        if detection
            .issues
            .iter()
            .any(|i| i.id == issue_ids::NO_TOOLCHAIN)
        {
            return Err(Error::ToolchainNotFound);
        }
        if let Some(issue) = detection
            .issues
            .iter()
            .find(|i| i.id == issue_ids::SIMCTL_FAILED)
        {
            return Err(Error::simctl(issue.message.clone()));
        }
    }

    if let Some(udid) = target {
        return detection
            .find(udid)
            .cloned()
            .ok_or_else(|| Error::unknown_device(udid));
    }

    detection
        .default_device(os_version)
        .cloned()
        .ok_or_else(|| Error::no_matching_runtime(os_version.unwrap_or("*")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Primary session
// ─────────────────────────────────────────────────────────────────────────────

/// Identity of the app under observation
#[derive(Debug, Clone)]
struct AppIdentity {
    bundle_id: String,
    /// Process name, used for start detection and crash reports
    executable: String,
}

impl AppIdentity {
    /// Without a bundle on disk the executable is guessed from the identifier
    fn from_bundle_id(bundle_id: &str) -> Self {
        Self {
            bundle_id: bundle_id.to_string(),
            executable: bundle_id
                .rsplit('.')
                .next()
                .unwrap_or(bundle_id)
                .to_string(),
        }
    }
}

/// What the event loop does after handling an event
enum Flow {
    Continue,
    Teardown,
    Stop(oneshot::Sender<()>),
    Fail(Error),
}

pub(crate) struct PrimarySession<D, C> {
    catalog: Arc<D>,
    control: Arc<C>,
    config: SupervisorConfig,
    options: LaunchOptions,
    target: Option<String>,

    handle: SessionHandle,
    ctl: SessionControl,
    events: mpsc::Sender<LifecycleEvent>,
    started_at: SystemTime,

    device: Option<DeviceRuntime>,
    crash_dir: Option<PathBuf>,
    app: Option<AppIdentity>,
    window: Option<ManagedProcess>,
    console: Option<ManagedProcess>,
    companion: Option<SessionHandle>,

    tailer: LogTailer,
    line_tx: mpsc::Sender<TailedLine>,
    line_rx: mpsc::Receiver<TailedLine>,
    process_tx: mpsc::Sender<ProcessEvent>,
    process_rx: mpsc::Receiver<ProcessEvent>,

    lifecycle: AppLifecycleDetector,
    /// Force-kill the app console if it has not exited by then
    kill_deadline: Option<Instant>,
}

impl<D, C> PrimarySession<D, C>
where
    D: RuntimeDetector + Send + Sync + 'static,
    C: DeviceControl + Send + Sync + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        catalog: Arc<D>,
        control: Arc<C>,
        config: SupervisorConfig,
        options: LaunchOptions,
        target: Option<String>,
        handle: SessionHandle,
        ctl: SessionControl,
        events: mpsc::Sender<LifecycleEvent>,
    ) -> Self {
        let (line_tx, line_rx) = mpsc::channel(INTERNAL_CHANNEL_CAPACITY);
        let (process_tx, process_rx) = mpsc::channel(INTERNAL_CHANNEL_CAPACITY);
        let lifecycle =
            AppLifecycleDetector::new(&config.result_start_marker, &config.result_stop_marker);
        let tailer = LogTailer::new(config.tailer_poll_interval);

        Self {
            catalog,
            control,
            config,
            options,
            target,
            handle,
            ctl,
            events,
            started_at: SystemTime::now(),
            device: None,
            crash_dir: None,
            app: None,
            window: None,
            console: None,
            companion: None,
            tailer,
            line_tx,
            line_rx,
            process_tx,
            process_rx,
            lifecycle,
            kill_deadline: None,
        }
    }

    pub(crate) async fn run(mut self) {
        self.ctl.transition(SessionState::Starting);

        match self.start().await {
            Ok(()) => self.event_loop().await,
            Err(Interrupt::Stop(ack)) => {
                info!("Session {} stopped while starting", self.handle.id());
                self.teardown(Some(ack)).await;
            }
            Err(Interrupt::Closed) => {
                debug!("Event stream dropped while starting");
                self.teardown(None).await;
            }
            Err(Interrupt::Failed(e)) => self.fail(e).await,
        }
    }

    // ─────────────────────────────────────────────────────────
    // Start sequence
    // ─────────────────────────────────────────────────────────

    async fn start(&mut self) -> std::result::Result<(), Interrupt> {
        let catalog = Arc::clone(&self.catalog);
        let detection = guarded(&mut self.ctl.control_rx, &self.events, async move {
            Ok::<_, Error>(catalog.detect().await)
        })
        .await?;

        let device = resolve_device(
            &detection,
            self.target.as_deref(),
            self.options.os_version.as_deref(),
        )?;
        info!("Launching session {} on {}", self.handle.id(), device);
        self.debug(format!("Selected simulator {}", device));

        self.crash_dir = Some(
            self.config
                .crash_dir
                .clone()
                .unwrap_or_else(|| detection.crash_dir.clone()),
        );
        self.device = Some(device.clone());
        self.ctl.update(|s| s.device = Some(device.clone()));

        if self.options.kill_if_running {
            match guarded(
                &mut self.ctl.control_rx,
                &self.events,
                self.control.shutdown(&device),
            )
            .await
            {
                Ok(()) => {}
                Err(Interrupt::Failed(e)) => warn!("Could not shut down {}: {}", device.udid, e),
                Err(other) => return Err(other),
            }
        }

        // Attach before boot so boot output is seen from the start
        match device.system_log.clone() {
            Some(log) => self.follow(LogSource::SystemLog, log).await,
            None => self.debug(format!("{} has no system log to follow", device.udid)),
        }

        guarded(
            &mut self.ctl.control_rx,
            &self.events,
            self.control.boot(&device),
        )
        .await?;

        let activate = self.config.activate_window && !self.options.hide;
        let window = guarded(
            &mut self.ctl.control_rx,
            &self.events,
            self.control
                .open_window(&device, activate, self.process_tx.clone()),
        )
        .await?;
        self.ctl.update(|s| s.device_pid = window.id());
        self.window = Some(window);

        let boot_timeout = self.options.boot_timeout.unwrap_or(self.config.boot_timeout);
        guarded(
            &mut self.ctl.control_rx,
            &self.events,
            wait_until_booted(
                &*self.control,
                &device,
                boot_timeout,
                self.config.boot_poll_interval,
            ),
        )
        .await?;
        self.ctl.transition(SessionState::Ready);
        self.debug(format!("{} booted", device.udid));

        let bundle = match self.options.app_path.clone() {
            Some(path) => Some(
                guarded(
                    &mut self.ctl.control_rx,
                    &self.events,
                    AppBundle::read(path),
                )
                .await?,
            ),
            None => None,
        };

        let mut issues = Vec::new();
        let mut pending_companion = None;
        if self.options.launch_watch_app {
            match self.begin_pairing(&detection, &device, bundle.as_ref()) {
                Ok(launch) => pending_companion = Some(launch),
                Err(failure) => self.pairing_failed(failure, &mut issues)?,
            }
        }

        let identity = match &bundle {
            Some(bundle) => Some(AppIdentity {
                bundle_id: bundle.bundle_id.clone(),
                executable: bundle.executable.clone(),
            }),
            None => self
                .options
                .launch_bundle_id
                .as_deref()
                .map(AppIdentity::from_bundle_id),
        };

        let Some(app) = identity else {
            // Nothing to run; the booted device is usable on its own
            let companion = self.await_companion(pending_companion, &mut issues).await?;
            self.emit(LifecycleEvent::Launched {
                primary: self.handle.clone(),
                companion,
                issues,
            })
            .await;
            return Ok(());
        };

        let mut lifecycle =
            AppLifecycleDetector::new(&self.config.result_start_marker, &self.config.result_stop_marker)
                .with_app(&app.bundle_id, Some(app.executable.as_str()));
        if self.options.auto_exit {
            lifecycle = lifecycle.with_auto_exit(self.config.auto_exit_idle);
        }
        self.lifecycle = lifecycle;

        if let Some(bundle) = &bundle {
            guarded(
                &mut self.ctl.control_rx,
                &self.events,
                self.control.install(&device, &bundle.path),
            )
            .await?;
            self.debug(format!("Installed {}", bundle.bundle_id));
        }

        if let Some(name) = self.options.log_filename.clone() {
            let container = guarded(
                &mut self.ctl.control_rx,
                &self.events,
                self.control.app_data_container(&device, &app.bundle_id),
            )
            .await?;
            match container {
                Some(dir) => {
                    let path = dir.join("Documents").join(name);
                    self.follow(LogSource::AppLogFile(path.clone()), path).await;
                }
                None => self.debug(format!(
                    "No data container for {}, not tailing {}",
                    app.bundle_id, name
                )),
            }
        }

        let console = guarded(
            &mut self.ctl.control_rx,
            &self.events,
            self.control.launch_app(
                &device,
                &app.bundle_id,
                ProcessRole::AppConsole,
                self.process_tx.clone(),
            ),
        )
        .await?;
        self.ctl.update(|s| s.console_pid = console.id());
        self.console = Some(console);
        self.app = Some(app);

        let companion = self.await_companion(pending_companion, &mut issues).await?;
        self.ctl.transition(SessionState::Running);
        self.emit(LifecycleEvent::Launched {
            primary: self.handle.clone(),
            companion,
            issues,
        })
        .await;
        Ok(())
    }

    async fn follow(&mut self, source: LogSource, path: PathBuf) {
        self.tailer.follow(source, path, self.line_tx.clone()).await;
        let sources = self.tailer.sources();
        self.ctl.update(|s| s.log_sources = sources);
    }

    fn begin_pairing(
        &self,
        detection: &DetectionResult,
        device: &DeviceRuntime,
        bundle: Option<&AppBundle>,
    ) -> std::result::Result<CompanionLaunch, PairingFailure> {
        let companion =
            pairing::resolve_companion(detection, device, self.options.watch_udid.as_deref())?;

        let bundle = bundle.ok_or_else(|| {
            PairingFailure::new(
                issue_ids::WATCH_PAIRING_FAILED,
                Error::pairing("no app bundle to take the watch app from"),
            )
        })?;
        let watch_app = bundle.watch_app().ok_or_else(|| {
            PairingFailure::new(
                issue_ids::WATCH_PAIRING_FAILED,
                Error::pairing(format!("{} contains no watch app", bundle.path.display())),
            )
        })?;

        self.debug(format!("Pairing with {}", companion));
        Ok(pairing::spawn_companion(
            Arc::clone(&self.control),
            companion,
            watch_app,
            &self.config,
            self.events.clone(),
        ))
    }

    /// Degrade to a warning unless pairing is mandatory
    fn pairing_failed(
        &self,
        failure: PairingFailure,
        issues: &mut Vec<Issue>,
    ) -> std::result::Result<(), Interrupt> {
        if self.options.watch_required || self.config.companion_required {
            return Err(Interrupt::Failed(failure.error));
        }
        warn!("Continuing without companion: {}", failure.error);
        issues.push(Issue::warning(failure.id, failure.error.to_string()));
        Ok(())
    }

    async fn await_companion(
        &mut self,
        pending: Option<CompanionLaunch>,
        issues: &mut Vec<Issue>,
    ) -> std::result::Result<Option<SessionHandle>, Interrupt> {
        let Some(CompanionLaunch { handle, ready }) = pending else {
            return Ok(None);
        };
        // Torn down with the primary from here on
        self.companion = Some(handle.clone());

        let outcome = guarded(&mut self.ctl.control_rx, &self.events, async move {
            Ok::<_, Error>(
                ready
                    .await
                    .unwrap_or_else(|_| Err(Error::pairing("companion session ended"))),
            )
        })
        .await?;

        match outcome {
            Ok(()) => {
                self.ctl.update(|s| s.companion = Some(handle.clone()));
                Ok(Some(handle))
            }
            Err(error) => {
                handle.stop().await;
                self.companion = None;
                self.pairing_failed(
                    PairingFailure::new(issue_ids::WATCH_PAIRING_FAILED, error),
                    issues,
                )?;
                Ok(None)
            }
        }
    }

    // ─────────────────────────────────────────────────────────
    // Event loop
    // ─────────────────────────────────────────────────────────

    async fn event_loop(&mut self) {
        loop {
            let idle_deadline = self.lifecycle.idle_deadline();
            let kill_deadline = self.kill_deadline;

            tokio::select! {
                command = self.ctl.control_rx.recv() => {
                    let ack = match command {
                        Some(ControlCommand::Stop { ack }) => Some(ack),
                        None => None,
                    };
                    self.teardown(ack).await;
                    return;
                }
                _ = self.events.closed() => {
                    debug!("Event stream dropped, tearing down session {}", self.handle.id());
                    self.teardown(None).await;
                    return;
                }
                Some(tailed) = self.line_rx.recv() => {
                    self.on_line(tailed.source, tailed.line).await;
                }
                Some(event) = self.process_rx.recv() => {
                    match self.on_process_event(event).await {
                        Flow::Continue => {}
                        Flow::Teardown => {
                            self.teardown(None).await;
                            return;
                        }
                        Flow::Stop(ack) => {
                            self.teardown(Some(ack)).await;
                            return;
                        }
                        Flow::Fail(e) => {
                            self.fail(e).await;
                            return;
                        }
                    }
                }
                _ = sleep_until_opt(idle_deadline) => {
                    if let Some(signal) = self.lifecycle.check_idle(Instant::now()) {
                        self.on_signal(signal).await;
                    }
                }
                _ = sleep_until_opt(kill_deadline) => {
                    self.kill_deadline = None;
                    if let Some(console) = self.console.as_mut() {
                        warn!("App did not exit after termination request, killing its console");
                        console.force_kill();
                    }
                }
            }
        }
    }

    async fn on_line(&mut self, source: LogSource, line: String) {
        let signals = self.lifecycle.feed(&source, &line);
        self.emit(LifecycleEvent::Log {
            session: self.handle.clone(),
            source,
            line,
        })
        .await;
        for signal in signals {
            self.on_signal(signal).await;
        }
    }

    async fn on_signal(&mut self, signal: DetectorSignal) {
        match signal {
            DetectorSignal::AppStarted { pid } => {
                self.emit(LifecycleEvent::AppStarted {
                    session: self.handle.clone(),
                    pid,
                })
                .await;
            }
            DetectorSignal::StructuredResult(result) => {
                self.emit(LifecycleEvent::StructuredResult {
                    session: self.handle.clone(),
                    result,
                })
                .await;
            }
            DetectorSignal::AutoExitRequested => self.request_app_exit().await,
        }
    }

    /// Ask the app to quit; its console exiting completes the request
    async fn request_app_exit(&mut self) {
        if !self.console.as_ref().is_some_and(ManagedProcess::is_running) {
            return;
        }
        let (Some(device), Some(app)) = (&self.device, &self.app) else {
            return;
        };

        self.debug(format!("Activity finished, terminating {}", app.bundle_id));
        if let Err(e) = bounded(
            self.config.stop_timeout,
            self.control.terminate_app(device, &app.bundle_id),
        )
        .await
        {
            warn!("Could not terminate {}: {}", app.bundle_id, e);
        }
        self.kill_deadline = Some(Instant::now() + self.config.stop_timeout);
    }

    async fn on_process_event(&mut self, event: ProcessEvent) -> Flow {
        match (event.role, event.kind) {
            (
                ProcessRole::AppConsole,
                ProcessEventKind::Stdout(line) | ProcessEventKind::Stderr(line),
            ) => {
                self.on_line(LogSource::AppConsole, line).await;
                Flow::Continue
            }
            (ProcessRole::AppConsole, ProcessEventKind::Exited { code }) => {
                self.on_app_exit(code).await
            }
            (ProcessRole::Device, ProcessEventKind::Exited { code }) => {
                self.ctl.update(|s| s.device_pid = None);
                self.debug(format!("Simulator window exited (code {:?})", code));
                Flow::Continue
            }
            (role, kind) => {
                trace!("{:?}: {:?}", role, kind);
                Flow::Continue
            }
        }
    }

    /// Classify the exit as clean or crashed, then report it
    async fn on_app_exit(&mut self, code: Option<i32>) -> Flow {
        self.kill_deadline = None;
        self.ctl.update(|s| s.console_pid = None);

        let Some(app) = self.app.clone() else {
            return Flow::Continue;
        };
        info!("{} exited (code {:?})", app.executable, code);

        let crash_dir = self.crash_dir.clone().unwrap_or_default();
        let correlator = CrashCorrelator::new(crash_dir, self.started_at)
            .with_grace_period(self.config.crash_grace_period)
            .with_poll_interval(self.config.crash_poll_interval);

        // Console output can trail the exit notification
        self.drain_pending().await;
        let crash = match guarded(&mut self.ctl.control_rx, &self.events, async {
            Ok::<_, Error>(correlator.correlate(&app.executable).await)
        })
        .await
        {
            Ok(crash) => crash,
            Err(Interrupt::Stop(ack)) => return Flow::Stop(ack),
            Err(Interrupt::Closed) => return Flow::Teardown,
            Err(Interrupt::Failed(e)) => return Flow::Fail(e),
        };
        self.drain_pending().await;

        if !self.lifecycle.app_exited() {
            self.debug(format!("{} exited before its start was seen", app.executable));
        }

        self.emit(LifecycleEvent::AppQuit {
            session: self.handle.clone(),
            crash,
        })
        .await;

        if self.options.auto_exit {
            Flow::Teardown
        } else {
            Flow::Continue
        }
    }

    async fn drain_pending(&mut self) {
        while let Ok(event) = self.process_rx.try_recv() {
            match (event.role, event.kind) {
                (
                    ProcessRole::AppConsole,
                    ProcessEventKind::Stdout(line) | ProcessEventKind::Stderr(line),
                ) => self.on_line(LogSource::AppConsole, line).await,
                (role, kind) => trace!("Dropping {:?}: {:?}", role, kind),
            }
        }
        while let Ok(tailed) = self.line_rx.try_recv() {
            self.on_line(tailed.source, tailed.line).await;
        }
    }

    // ─────────────────────────────────────────────────────────
    // Teardown
    // ─────────────────────────────────────────────────────────

    async fn teardown(&mut self, ack: Option<oneshot::Sender<()>>) {
        self.ctl.transition(SessionState::Stopping);
        info!("Stopping session {}", self.handle.id());

        if let (Some(device), Some(app), Some(console)) = (&self.device, &self.app, &self.console) {
            if console.is_running() {
                if let Err(e) = bounded(
                    self.config.stop_timeout,
                    self.control.terminate_app(device, &app.bundle_id),
                )
                .await
                {
                    debug!("terminate {} failed: {}", app.bundle_id, e);
                }
            }
        }

        self.release(true).await;
        self.ctl.transition(SessionState::Stopped);
        info!("Session {} stopped", self.handle.id());

        if let Some(ack) = ack {
            let _ = ack.send(());
        }
        ack_pending(&mut self.ctl.control_rx);
    }

    async fn fail(&mut self, error: Error) {
        error!("Session {} failed: {}", self.handle.id(), error);
        self.ctl.transition(SessionState::Failed);
        self.emit(LifecycleEvent::Error(error)).await;
        self.release(false).await;
        ack_pending(&mut self.ctl.control_rx);
    }

    /// Kill processes, shut the device down and detach every tailer
    async fn release(&mut self, graceful: bool) {
        let bound = self.config.stop_timeout;

        if let Some(console) = self.console.take() {
            retire(console, graceful, bound).await;
        }
        if let Some(companion) = self.companion.take() {
            companion.stop().await;
        }
        if let Some(device) = &self.device {
            if let Err(e) = bounded(bound, self.control.shutdown(device)).await {
                warn!("Could not shut down {}: {}", device.udid, e);
            }
        }
        if let Some(window) = self.window.take() {
            retire(window, false, bound).await;
        }
        self.tailer.stop();

        self.ctl.update(|s| {
            s.device_pid = None;
            s.console_pid = None;
            s.log_sources.clear();
        });
    }

    // ─────────────────────────────────────────────────────────
    // Event emission
    // ─────────────────────────────────────────────────────────

    async fn emit(&self, event: LifecycleEvent) {
        trace!("Session {} emitting {}", self.handle.id(), event.name());
        if self.events.send(event).await.is_err() {
            trace!("Event stream closed");
        }
    }

    /// Supervisor diagnostics; dropped rather than waiting on a full stream
    fn debug(&self, message: impl Into<String>) {
        let message = message.into();
        debug!("{}", message);
        let _ = self.events.try_send(LifecycleEvent::Debug {
            session: self.handle.clone(),
            message,
        });
    }
}
