//! Headless mode - JSON event output
//!
//! Every state update and action outcome is written to stdout as one JSON
//! object per line (NDJSON). Each object has an "event" field naming its
//! type and a millisecond timestamp.
//!
//! # Example Output
//!
//! ```json
//! {"event":"session","device_id":3,"device":"Lab EV3","workspace":"playground","status":"connecting","timestamp":1704700001000}
//! {"event":"session","device_id":3,"device":"Lab EV3","workspace":"playground","status":"connected","timestamp":1704700001200}
//! {"event":"output","workspace":"playground","message":"hello","timestamp":1704700002000}
//! ```

pub mod runner;

use std::io::{self, Write};

use chrono::Utc;
use serde::Serialize;
use tracing::error;

use rexec_app::{ActionOutcome, ConnectionStatus, StateUpdate};
use rexec_core::{Device, EvalError, WorkspaceLocation};

/// Events emitted in headless mode
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    /// Device list from the directory
    Devices {
        devices: Vec<Device>,
        timestamp: i64,
    },

    /// Session slot changed
    Session {
        device_id: i64,
        device: String,
        workspace: WorkspaceLocation,
        status: ConnectionStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        timestamp: i64,
    },

    /// Session slot cleared
    SessionCleared { timestamp: i64 },

    /// Device started or stopped running a program
    Running {
        workspace: WorkspaceLocation,
        running: bool,
        timestamp: i64,
    },

    /// Program output
    Output {
        workspace: WorkspaceLocation,
        message: String,
        timestamp: i64,
    },

    /// Compile or device-side evaluation errors
    EvalError {
        workspace: WorkspaceLocation,
        errors: Vec<EvalError>,
        timestamp: i64,
    },

    /// Evaluation result
    EvalSuccess {
        workspace: WorkspaceLocation,
        value: String,
        timestamp: i64,
    },

    /// What a dispatched action returned
    Outcome {
        outcome: ActionOutcome,
        timestamp: i64,
    },

    /// Error occurred
    Error {
        message: String,
        fatal: bool,
        timestamp: i64,
    },
}

impl HeadlessEvent {
    /// Emit this event to stdout as JSON
    pub fn emit(&self) {
        let json = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize headless event: {}", e);
                return;
            }
        };

        let mut stdout = io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", json) {
            error!("Failed to write headless event to stdout: {}", e);
            return;
        }

        if let Err(e) = stdout.flush() {
            error!("Failed to flush headless stdout: {}", e);
        }
    }

    /// Get current timestamp in milliseconds
    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }

    pub fn from_update(update: &StateUpdate) -> Self {
        let timestamp = Self::now();
        match update {
            StateUpdate::DevicesUpdated(devices) => Self::Devices {
                devices: devices.clone(),
                timestamp,
            },
            StateUpdate::SessionUpdated(Some(session)) => Self::Session {
                device_id: session.device.id,
                device: session.device.title.clone(),
                workspace: session.workspace,
                status: session.status(),
                error: session.connection.error().map(str::to_string),
                timestamp,
            },
            StateUpdate::SessionUpdated(None) => Self::SessionCleared { timestamp },
            StateUpdate::WorkspaceRunning { workspace, running } => Self::Running {
                workspace: *workspace,
                running: *running,
                timestamp,
            },
            StateUpdate::ConsoleLog { workspace, message } => Self::Output {
                workspace: *workspace,
                message: message.clone(),
                timestamp,
            },
            StateUpdate::EvalError { workspace, errors } => Self::EvalError {
                workspace: *workspace,
                errors: errors.clone(),
                timestamp,
            },
            StateUpdate::EvalSuccess { workspace, value } => Self::EvalSuccess {
                workspace: *workspace,
                value: value.clone(),
                timestamp,
            },
        }
    }

    pub fn outcome(outcome: ActionOutcome) -> Self {
        Self::Outcome {
            outcome,
            timestamp: Self::now(),
        }
    }

    pub fn error(message: impl Into<String>, fatal: bool) -> Self {
        Self::Error {
            message: message.into(),
            fatal,
            timestamp: Self::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rexec_app::RunOutcome;

    #[test]
    fn test_output_event_serializes() {
        let event = HeadlessEvent::from_update(&StateUpdate::ConsoleLog {
            workspace: WorkspaceLocation::Playground,
            message: "hello".to_string(),
        });
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "output");
        assert_eq!(json["workspace"], "playground");
        assert_eq!(json["message"], "hello");
        assert!(json["timestamp"].is_i64());
    }

    #[test]
    fn test_session_cleared_event() {
        let event = HeadlessEvent::from_update(&StateUpdate::SessionUpdated(None));
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "session_cleared");
    }

    #[test]
    fn test_outcome_event_nests_action_result() {
        let event = HeadlessEvent::outcome(ActionOutcome::Run {
            result: RunOutcome::NotConnected,
        });
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "outcome");
        assert_eq!(json["outcome"]["action"], "run");
        assert_eq!(json["outcome"]["result"]["outcome"], "not_connected");
    }

    #[test]
    fn test_error_event() {
        let json = serde_json::to_value(HeadlessEvent::error("boom", true)).unwrap();
        assert_eq!(json["event"], "error");
        assert_eq!(json["fatal"], true);
    }
}
