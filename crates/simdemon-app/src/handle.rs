//! Session handles
//!
//! A [`SessionHandle`] is a cheap, cloneable view of one running session
//! (primary or companion). State is published by the session task through a
//! `watch` channel; stop requests travel back over an `mpsc` control channel.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::{mpsc, oneshot, watch};

use simdemon_core::prelude::*;
use simdemon_core::{DeviceRuntime, LogSource, SessionKind, SessionState};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Point-in-time view of a session
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Resolved once the catalog lookup finishes
    pub device: Option<DeviceRuntime>,
    /// Simulator window process
    pub device_pid: Option<u32>,
    /// App console (`simctl launch`) process
    pub console_pid: Option<u32>,
    pub log_sources: Vec<LogSource>,
    pub companion: Option<SessionHandle>,
    pub started_at: DateTime<Local>,
}

impl SessionStatus {
    fn new() -> Self {
        Self {
            state: SessionState::Idle,
            device: None,
            device_pid: None,
            console_pid: None,
            log_sources: Vec::new(),
            companion: None,
            started_at: Local::now(),
        }
    }
}

/// Requests from handles to the session task
#[derive(Debug)]
pub(crate) enum ControlCommand {
    Stop { ack: oneshot::Sender<()> },
}

struct HandleInner {
    id: u64,
    kind: SessionKind,
    status_rx: watch::Receiver<SessionStatus>,
    control_tx: mpsc::Sender<ControlCommand>,
    /// Upper bound on how long `stop()` waits for the session to acknowledge
    stop_bound: Duration,
}

/// Handle to one simulator session
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<HandleInner>,
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("udid", &self.udid())
            .field("state", &self.state())
            .finish()
    }
}

impl PartialEq for SessionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for SessionHandle {}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn kind(&self) -> SessionKind {
        self.inner.kind
    }

    pub fn state(&self) -> SessionState {
        self.inner.status_rx.borrow().state
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.status_rx.borrow().clone()
    }

    pub fn device(&self) -> Option<DeviceRuntime> {
        self.inner.status_rx.borrow().device.clone()
    }

    pub fn udid(&self) -> Option<String> {
        self.inner
            .status_rx
            .borrow()
            .device
            .as_ref()
            .map(|d| d.udid.clone())
    }

    pub fn companion(&self) -> Option<SessionHandle> {
        self.inner.status_rx.borrow().companion.clone()
    }

    /// Stop the session. Idempotent and infallible.
    ///
    /// Returns once the session has torn down, immediately if it already has,
    /// and in any case after a bounded wait.
    pub async fn stop(&self) {
        if self.state().is_terminal() {
            debug!("Session {} already {}", self.inner.id, self.state());
            return;
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .inner
            .control_tx
            .send(ControlCommand::Stop { ack: ack_tx })
            .await
            .is_err()
        {
            debug!("Session {} task already gone", self.inner.id);
            return;
        }

        match tokio::time::timeout(self.inner.stop_bound, ack_rx).await {
            Ok(Ok(())) => debug!("Session {} stopped", self.inner.id),
            // Sender dropped: the task ended without acking, e.g. it failed meanwhile
            Ok(Err(_)) => debug!("Session {} ended before acknowledging stop", self.inner.id),
            Err(_) => warn!(
                "Session {} did not acknowledge stop within {:?}",
                self.inner.id, self.inner.stop_bound
            ),
        }
    }

    /// Stop in the background and invoke `callback` once done
    pub fn stop_with<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = self.clone();
        tokio::spawn(async move {
            handle.stop().await;
            callback();
        });
    }

    /// Wait until the session reaches `stopped` or `failed`
    pub async fn wait_terminal(&self) -> SessionState {
        let mut rx = self.inner.status_rx.clone();
        loop {
            let state = rx.borrow_and_update().state;
            if state.is_terminal() {
                return state;
            }
            if rx.changed().await.is_err() {
                return rx.borrow().state;
            }
        }
    }
}

/// The session task's side of a handle
pub(crate) struct SessionControl {
    status_tx: watch::Sender<SessionStatus>,
    pub(crate) control_rx: mpsc::Receiver<ControlCommand>,
}

/// Create a handle and the task-side control for a new session
pub(crate) fn new_session(kind: SessionKind, stop_bound: Duration) -> (SessionHandle, SessionControl) {
    let (status_tx, status_rx) = watch::channel(SessionStatus::new());
    let (control_tx, control_rx) = mpsc::channel(8);
    let handle = SessionHandle {
        inner: Arc::new(HandleInner {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            status_rx,
            control_tx,
            stop_bound,
        }),
    };
    (
        handle,
        SessionControl {
            status_tx,
            control_rx,
        },
    )
}

impl SessionControl {
    pub(crate) fn state(&self) -> SessionState {
        self.status_tx.borrow().state
    }

    /// Move to `next` if the state machine allows it
    pub(crate) fn transition(&self, next: SessionState) -> bool {
        let mut moved = false;
        self.status_tx.send_if_modified(|status| {
            if status.state.can_transition_to(next) {
                debug!("Session state {} → {}", status.state, next);
                status.state = next;
                moved = true;
            } else {
                trace!("Ignoring transition {} → {}", status.state, next);
            }
            moved
        });
        moved
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut SessionStatus)) {
        self.status_tx.send_modify(f);
    }
}
