//! Companion (watch) pairing
//!
//! Once the primary simulator is ready, the paired watch simulator gets a
//! lighter session of its own: boot, install the watch half of the bundle and
//! launch it. There is no window process and no tailed system log; the watch
//! app's console output is forwarded into the primary event stream as
//! [`LogSource::Companion`] lines.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use simdemon_core::prelude::*;
use simdemon_core::{
    issue_ids, DetectionResult, DeviceRuntime, LogSource, ProcessEvent, ProcessEventKind,
    ProcessRole, SessionKind, SessionState,
};
use simdemon_daemon::{AppBundle, DeviceControl, ManagedProcess};

use crate::config::SupervisorConfig;
use crate::event::LifecycleEvent;
use crate::handle::{new_session, ControlCommand, SessionControl, SessionHandle};
use crate::session::{ack_pending, bounded, guarded, retire, wait_until_booted, Interrupt};
use crate::supervisor::stop_bound;

/// A pairing that could not be set up, with the issue id it reports as
#[derive(Debug)]
pub(crate) struct PairingFailure {
    pub id: &'static str,
    pub error: Error,
}

impl PairingFailure {
    pub(crate) fn new(id: &'static str, error: Error) -> Self {
        Self { id, error }
    }
}

/// A companion session that has been spawned but may not be ready yet
pub(crate) struct CompanionLaunch {
    pub handle: SessionHandle,
    /// Resolves once the watch app is launched, or with the reason it was not
    pub ready: oneshot::Receiver<Result<()>>,
}

/// Pick the watch simulator to pair with `primary`.
///
/// An explicit `watch_udid` wins over the catalog's device pairs.
pub(crate) fn resolve_companion(
    detection: &DetectionResult,
    primary: &DeviceRuntime,
    watch_udid: Option<&str>,
) -> std::result::Result<DeviceRuntime, PairingFailure> {
    if let Some(udid) = watch_udid {
        return match detection.find(udid) {
            Some(device) if device.is_watch() => Ok(device.clone()),
            Some(_) => Err(PairingFailure::new(
                issue_ids::WATCH_PAIRING_FAILED,
                Error::pairing(format!("{} is not a watch simulator", udid)),
            )),
            None => Err(PairingFailure::new(
                issue_ids::NO_PAIRED_COMPANION,
                Error::unknown_device(udid),
            )),
        };
    }

    detection
        .companion_for(&primary.udid)
        .cloned()
        .ok_or_else(|| {
            PairingFailure::new(
                issue_ids::NO_PAIRED_COMPANION,
                Error::pairing(format!("{} has no paired watch simulator", primary.udid)),
            )
        })
}

/// Start the companion session task
pub(crate) fn spawn_companion<C>(
    control: Arc<C>,
    device: DeviceRuntime,
    watch_app: PathBuf,
    config: &SupervisorConfig,
    events: mpsc::Sender<LifecycleEvent>,
) -> CompanionLaunch
where
    C: DeviceControl + Send + Sync + 'static,
{
    let (handle, ctl) = new_session(
        SessionKind::Companion,
        stop_bound(config, SessionKind::Companion),
    );
    let (ready_tx, ready_rx) = oneshot::channel();
    let (process_tx, process_rx) = mpsc::channel(64);

    let session = CompanionSession {
        control,
        device,
        watch_app,
        boot_timeout: config.companion_boot_timeout,
        poll_interval: config.boot_poll_interval,
        stop_timeout: config.stop_timeout,
        handle: handle.clone(),
        ctl,
        events,
        console: None,
        bundle_id: None,
        process_tx,
        process_rx,
    };
    tokio::spawn(session.run(ready_tx));

    CompanionLaunch {
        handle,
        ready: ready_rx,
    }
}

struct CompanionSession<C> {
    control: Arc<C>,
    device: DeviceRuntime,
    watch_app: PathBuf,
    boot_timeout: Duration,
    poll_interval: Duration,
    stop_timeout: Duration,

    handle: SessionHandle,
    ctl: SessionControl,
    events: mpsc::Sender<LifecycleEvent>,

    console: Option<ManagedProcess>,
    bundle_id: Option<String>,
    process_tx: mpsc::Sender<ProcessEvent>,
    process_rx: mpsc::Receiver<ProcessEvent>,
}

impl<C> CompanionSession<C>
where
    C: DeviceControl + Send + Sync + 'static,
{
    async fn run(mut self, ready: oneshot::Sender<Result<()>>) {
        self.ctl.transition(SessionState::Starting);
        let device = self.device.clone();
        self.ctl.update(|s| s.device = Some(device));

        match self.start().await {
            Ok(()) => {
                info!("Companion {} ready", self.device.udid);
                let _ = ready.send(Ok(()));
                self.event_loop().await;
            }
            Err(Interrupt::Stop(ack)) => {
                let _ = ready.send(Err(Error::pairing("stopped while starting")));
                self.teardown(Some(ack)).await;
            }
            Err(Interrupt::Closed) => {
                let _ = ready.send(Err(Error::pairing("event stream closed")));
                self.teardown(None).await;
            }
            Err(Interrupt::Failed(e)) => {
                warn!("Companion {} failed: {}", self.device.udid, e);
                self.ctl.transition(SessionState::Failed);
                self.release(false).await;
                let _ = ready.send(Err(e));
                ack_pending(&mut self.ctl.control_rx);
            }
        }
    }

    async fn start(&mut self) -> std::result::Result<(), Interrupt> {
        guarded(
            &mut self.ctl.control_rx,
            &self.events,
            self.control.boot(&self.device),
        )
        .await?;
        guarded(
            &mut self.ctl.control_rx,
            &self.events,
            wait_until_booted(
                &*self.control,
                &self.device,
                self.boot_timeout,
                self.poll_interval,
            ),
        )
        .await?;
        self.ctl.transition(SessionState::Ready);

        let bundle = guarded(
            &mut self.ctl.control_rx,
            &self.events,
            AppBundle::read(self.watch_app.clone()),
        )
        .await?;
        guarded(
            &mut self.ctl.control_rx,
            &self.events,
            self.control.install(&self.device, &bundle.path),
        )
        .await?;

        let console = guarded(
            &mut self.ctl.control_rx,
            &self.events,
            self.control.launch_app(
                &self.device,
                &bundle.bundle_id,
                ProcessRole::CompanionConsole,
                self.process_tx.clone(),
            ),
        )
        .await?;
        self.ctl.update(|s| {
            s.console_pid = console.id();
            s.log_sources = vec![LogSource::Companion];
        });
        self.console = Some(console);
        self.bundle_id = Some(bundle.bundle_id);
        self.ctl.transition(SessionState::Running);
        Ok(())
    }

    async fn event_loop(&mut self) {
        loop {
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
                    self.teardown(None).await;
                    return;
                }
                Some(event) = self.process_rx.recv() => self.on_process_event(event).await,
            }
        }
    }

    async fn on_process_event(&mut self, event: ProcessEvent) {
        match event.kind {
            ProcessEventKind::Stdout(line) | ProcessEventKind::Stderr(line) => {
                let _ = self
                    .events
                    .send(LifecycleEvent::Log {
                        session: self.handle.clone(),
                        source: LogSource::Companion,
                        line,
                    })
                    .await;
            }
            ProcessEventKind::Exited { code } => {
                info!("Watch app on {} exited (code {:?})", self.device.udid, code);
                self.ctl.update(|s| s.console_pid = None);
                let _ = self.events.try_send(LifecycleEvent::Debug {
                    session: self.handle.clone(),
                    message: format!("Watch app exited (code {:?})", code),
                });
            }
        }
    }

    async fn teardown(&mut self, ack: Option<oneshot::Sender<()>>) {
        self.ctl.transition(SessionState::Stopping);

        if let (Some(bundle_id), Some(console)) = (&self.bundle_id, &self.console) {
            if console.is_running() {
                if let Err(e) = bounded(
                    self.stop_timeout,
                    self.control.terminate_app(&self.device, bundle_id),
                )
                .await
                {
                    debug!("terminate {} failed: {}", bundle_id, e);
                }
            }
        }

        self.release(true).await;
        self.ctl.transition(SessionState::Stopped);
        debug!("Companion {} stopped", self.device.udid);

        if let Some(ack) = ack {
            let _ = ack.send(());
        }
        ack_pending(&mut self.ctl.control_rx);
    }

    async fn release(&mut self, graceful: bool) {
        if let Some(console) = self.console.take() {
            retire(console, graceful, self.stop_timeout).await;
        }
        if let Err(e) = bounded(self.stop_timeout, self.control.shutdown(&self.device)).await {
            warn!("Could not shut down {}: {}", self.device.udid, e);
        }
        self.ctl.update(|s| {
            s.console_pid = None;
            s.log_sources.clear();
        });
    }
}
