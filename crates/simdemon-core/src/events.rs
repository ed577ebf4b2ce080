//! Events emitted by managed child processes

/// Which role a managed child process plays in a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessRole {
    /// The Simulator app window process
    Device,
    /// The long-lived `simctl launch --console-pty` process for the app
    AppConsole,
    /// The app console process on a paired watch simulator
    CompanionConsole,
}

/// Output or exit of a managed child process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEventKind {
    Stdout(String),
    Stderr(String),
    Exited { code: Option<i32> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEvent {
    pub role: ProcessRole,
    pub kind: ProcessEventKind,
}

impl ProcessEvent {
    pub fn new(role: ProcessRole, kind: ProcessEventKind) -> Self {
        Self { role, kind }
    }

    /// The output line carried by this event, if any
    pub fn line(&self) -> Option<&str> {
        match &self.kind {
            ProcessEventKind::Stdout(l) | ProcessEventKind::Stderr(l) => Some(l),
            ProcessEventKind::Exited { .. } => None,
        }
    }

    pub fn is_exit(&self) -> bool {
        matches!(self.kind, ProcessEventKind::Exited { .. })
    }
}
