//! Action and state-update messages (TEA pattern)
//!
//! [`Action`]s are intents coming from a frontend. [`StateUpdate`]s are what
//! the session manager publishes in response; the reducer in
//! [`crate::handler`] folds them into [`crate::state::AppState`].

use rexec_core::{Device, EvalError, WorkspaceLocation};

use crate::session::DeviceSession;

/// Intents a frontend can dispatch to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Re-query the device directory
    FetchDevices,

    /// Open a session against `device`, bound to `workspace`
    Connect {
        device: Device,
        workspace: WorkspaceLocation,
    },

    /// Drop the current session
    Disconnect,

    /// Compile `program` and send it to the connected device
    Run {
        workspace: WorkspaceLocation,
        program: String,
    },
}

impl Action {
    /// Short name used in logs and headless output
    pub fn name(&self) -> &'static str {
        match self {
            Action::FetchDevices => "fetch_devices",
            Action::Connect { .. } => "connect",
            Action::Disconnect => "disconnect",
            Action::Run { .. } => "run",
        }
    }
}

/// State changes published by the session manager
#[derive(Debug, Clone)]
pub enum StateUpdate {
    // ─────────────────────────────────────────────────────────
    // Directory / Session
    // ─────────────────────────────────────────────────────────
    /// Full replacement of the known device list
    DevicesUpdated(Vec<Device>),

    /// The session slot changed; `None` means it was cleared
    SessionUpdated(Option<DeviceSession>),

    // ─────────────────────────────────────────────────────────
    // Device Output (scoped to a workspace)
    // ─────────────────────────────────────────────────────────
    /// Device started or stopped executing a program
    WorkspaceRunning {
        workspace: WorkspaceLocation,
        running: bool,
    },

    /// Line of program output
    ConsoleLog {
        workspace: WorkspaceLocation,
        message: String,
    },

    /// Compile errors, or a runtime error reported by the device
    EvalError {
        workspace: WorkspaceLocation,
        errors: Vec<EvalError>,
    },

    /// Program finished with a result value
    EvalSuccess {
        workspace: WorkspaceLocation,
        value: String,
    },
}

impl StateUpdate {
    /// Workspace the update is scoped to, if any
    pub fn workspace(&self) -> Option<WorkspaceLocation> {
        match self {
            StateUpdate::DevicesUpdated(_) | StateUpdate::SessionUpdated(_) => None,
            StateUpdate::WorkspaceRunning { workspace, .. }
            | StateUpdate::ConsoleLog { workspace, .. }
            | StateUpdate::EvalError { workspace, .. }
            | StateUpdate::EvalSuccess { workspace, .. } => Some(*workspace),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_names() {
        assert_eq!(Action::FetchDevices.name(), "fetch_devices");
        assert_eq!(Action::Disconnect.name(), "disconnect");
        let run = Action::Run {
            workspace: WorkspaceLocation::Playground,
            program: "1 + 1;".to_string(),
        };
        assert_eq!(run.name(), "run");
    }

    #[test]
    fn test_update_workspace_scope() {
        assert_eq!(StateUpdate::DevicesUpdated(vec![]).workspace(), None);
        assert_eq!(StateUpdate::SessionUpdated(None).workspace(), None);
        let log = StateUpdate::ConsoleLog {
            workspace: WorkspaceLocation::Grading,
            message: "hi".to_string(),
        };
        assert_eq!(log.workspace(), Some(WorkspaceLocation::Grading));
    }
}
