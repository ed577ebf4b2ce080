//! Managed child processes (Simulator window, app console)

use std::ffi::OsStr;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Notify};

use simdemon_core::events::{ProcessEvent, ProcessEventKind, ProcessRole};
use simdemon_core::prelude::*;

/// A long-lived child process owned by a session.
///
/// The `Child` handle is moved into a dedicated `wait_for_exit` background task
/// so the real exit code is captured and emitted as `ProcessEventKind::Exited`.
/// `ManagedProcess` keeps a kill channel, an atomic exit flag for synchronous
/// `has_exited()` checks, and a [`Notify`] so `shutdown()` can await exit.
pub struct ManagedProcess {
    role: ProcessRole,
    pid: Option<u32>,
    /// Consumed on first use (or on drop)
    kill_tx: Option<oneshot::Sender<()>>,
    exited: Arc<AtomicBool>,
    exit_notify: Arc<Notify>,
}

impl std::fmt::Debug for ManagedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("role", &self.role)
            .field("pid", &self.pid)
            .field("exited", &self.has_exited())
            .finish()
    }
}

impl ManagedProcess {
    /// Spawn `program args...`, forwarding stdout/stderr lines and the exit to `event_tx`.
    pub fn spawn<I, S>(
        role: ProcessRole,
        program: impl AsRef<OsStr>,
        args: I,
        event_tx: mpsc::Sender<ProcessEvent>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(program.as_ref());
        command.args(args);
        Self::spawn_command(role, command, event_tx)
    }

    /// Spawn a pre-configured command. Stdio and kill-on-drop are set here.
    pub fn spawn_command(
        role: ProcessRole,
        mut command: Command,
        event_tx: mpsc::Sender<ProcessEvent>,
    ) -> Result<Self> {
        let program = command.as_std().get_program().to_string_lossy().to_string();
        info!("Spawning {:?} process: {:?}", role, command.as_std());

        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::spawn(&program, "executable not found")
                } else {
                    Error::spawn(&program, e.to_string())
                }
            })?;

        let pid = child.id();
        info!("{:?} process started with PID: {:?}", role, pid);

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(Self::line_reader(stdout, role, false, event_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(Self::line_reader(stderr, role, true, event_tx.clone()));
        }

        let exited = Arc::new(AtomicBool::new(false));
        let exit_notify = Arc::new(Notify::new());
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        tokio::spawn(Self::wait_for_exit(
            child,
            role,
            kill_rx,
            event_tx,
            Arc::clone(&exited),
            Arc::clone(&exit_notify),
        ));

        Ok(Self {
            role,
            pid,
            kill_tx: Some(kill_tx),
            exited,
            exit_notify,
        })
    }

    /// Background task: owns `child`, waits for it to exit, emits `Exited`.
    ///
    /// Ends either when the process exits on its own or when `kill_rx` fires,
    /// in which case the child is killed and then reaped.
    async fn wait_for_exit(
        mut child: Child,
        role: ProcessRole,
        kill_rx: oneshot::Receiver<()>,
        event_tx: mpsc::Sender<ProcessEvent>,
        exited: Arc<AtomicBool>,
        exit_notify: Arc<Notify>,
    ) {
        let code: Option<i32> = tokio::select! {
            result = child.wait() => {
                match result {
                    Ok(status) => {
                        info!("{:?} process exited with status: {:?}", role, status);
                        status.code()
                    }
                    Err(e) => {
                        error!("Error waiting for {:?} process: {}", role, e);
                        None
                    }
                }
            }
            _ = kill_rx => {
                info!("Kill signal received, force-killing {:?} process", role);
                if let Err(e) = child.kill().await {
                    error!("Failed to kill {:?} process: {}", role, e);
                }
                match child.wait().await {
                    Ok(status) => status.code(),
                    Err(e) => {
                        error!("Error waiting after kill: {}", e);
                        None
                    }
                }
            }
        };

        // Flag first so has_exited() is true before anyone observes the event
        exited.store(true, Ordering::Release);
        exit_notify.notify_waiters();

        debug!("{:?} process exited with code {:?}", role, code);
        let _ = event_tx
            .send(ProcessEvent::new(role, ProcessEventKind::Exited { code }))
            .await;
    }

    /// Read lines from a pipe and forward them.
    ///
    /// Never emits `Exited`; that is the wait task's job.
    async fn line_reader<R: AsyncRead + Unpin + Send + 'static>(
        pipe: R,
        role: ProcessRole,
        is_stderr: bool,
        tx: mpsc::Sender<ProcessEvent>,
    ) {
        let mut reader = BufReader::new(pipe).lines();

        while let Ok(Some(line)) = reader.next_line().await {
            trace!("{:?} {}: {}", role, if is_stderr { "stderr" } else { "stdout" }, line);

            let kind = if is_stderr {
                ProcessEventKind::Stderr(line)
            } else {
                ProcessEventKind::Stdout(line)
            };
            if tx.send(ProcessEvent::new(role, kind)).await.is_err() {
                debug!("{:?} output channel closed", role);
                break;
            }
        }
    }

    /// Wait up to `grace` for the process to exit on its own, then force-kill.
    ///
    /// Callers ask the process to stop beforehand (e.g. `simctl terminate`).
    pub async fn shutdown(&mut self, grace: Duration) {
        if self.has_exited() {
            debug!("{:?} process already exited", self.role);
            return;
        }

        // Create the notified() future before the final check so a notification
        // between the check and the await cannot be missed.
        let notified = self.exit_notify.notified();
        if self.has_exited() {
            return;
        }

        match tokio::time::timeout(grace, notified).await {
            Ok(()) => info!("{:?} process exited gracefully", self.role),
            Err(_) => {
                warn!("{:?} process did not exit within {:?}, killing", self.role, grace);
                self.force_kill();
                self.wait_exited(Duration::from_secs(2)).await;
            }
        }
    }

    /// Signal the wait task to kill the process. Does not wait.
    pub fn force_kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            // The wait task may have already exited naturally
            let _ = tx.send(());
        }
    }

    /// Wait until the process has exited, bounded by `limit`. Returns whether it did.
    pub async fn wait_exited(&self, limit: Duration) -> bool {
        let notified = self.exit_notify.notified();
        if self.has_exited() {
            return true;
        }
        tokio::time::timeout(limit, notified).await.is_ok() || self.has_exited()
    }

    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        !self.has_exited()
    }

    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    pub fn role(&self) -> ProcessRole {
        self.role
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        if !self.has_exited() {
            warn!("{:?} process dropped while still running", self.role);
            self.force_kill();
        }
        // kill_on_drop(true) on the Child is the final safety net
    }
}
