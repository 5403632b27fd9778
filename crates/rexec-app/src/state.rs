//! Application state (Model in TEA pattern)

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Local};
use serde::Serialize;

use rexec_core::{Device, EvalError, WorkspaceLocation};

use crate::session::{ConnectionStatus, DeviceSession};

/// Console lines kept per workspace before the oldest are dropped
pub const DEFAULT_MAX_CONSOLE_LINES: usize = 1_000;

/// One line of device output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsoleEntry {
    pub timestamp: DateTime<Local>,
    pub message: String,
}

impl ConsoleEntry {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            message: message.into(),
        }
    }
}

/// Per-workspace execution state
#[derive(Debug, Clone, Default)]
pub struct WorkspaceState {
    /// Device reported a program running
    pub is_running: bool,

    /// Console output, oldest first
    pub output: VecDeque<ConsoleEntry>,

    /// Value of the last successful evaluation
    pub last_result: Option<String>,

    /// Errors from the last failed compile or device-side evaluation
    pub errors: Vec<EvalError>,
}

impl WorkspaceState {
    pub fn push_output(&mut self, message: impl Into<String>, max_lines: usize) {
        self.output.push_back(ConsoleEntry::new(message));
        while self.output.len() > max_lines {
            self.output.pop_front();
        }
    }
}

/// Complete application state
#[derive(Debug, Clone)]
pub struct AppState {
    /// Devices from the last successful directory fetch
    pub devices: Vec<Device>,

    /// Mirror of the session manager's slot
    pub session: Option<DeviceSession>,

    pub workspaces: HashMap<WorkspaceLocation, WorkspaceState>,

    pub max_console_lines: usize,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            session: None,
            workspaces: HashMap::new(),
            max_console_lines: DEFAULT_MAX_CONSOLE_LINES,
        }
    }

    pub fn with_max_console_lines(mut self, max_lines: usize) -> Self {
        self.max_console_lines = max_lines.max(1);
        self
    }

    /// State for `workspace`, if anything happened there yet
    pub fn workspace(&self, workspace: WorkspaceLocation) -> Option<&WorkspaceState> {
        self.workspaces.get(&workspace)
    }

    pub fn workspace_mut(&mut self, workspace: WorkspaceLocation) -> &mut WorkspaceState {
        self.workspaces.entry(workspace).or_default()
    }

    pub fn connection_status(&self) -> Option<ConnectionStatus> {
        self.session.as_ref().map(|s| s.status())
    }

    pub fn is_connected(&self) -> bool {
        self.connection_status() == Some(ConnectionStatus::Connected)
    }

    pub fn find_device(&self, id: i64) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }
}
