//! State reducer (Update in TEA pattern)
//!
//! Pure function of `(state, update)`. No I/O happens here; the engine
//! applies every [`StateUpdate`] it receives before rebroadcasting it.

use tracing::trace;

use crate::message::StateUpdate;
use crate::state::AppState;

/// Fold one update into the state
pub fn update(state: &mut AppState, update: &StateUpdate) {
    trace!("Applying {:?}", update);
    match update {
        StateUpdate::DevicesUpdated(devices) => {
            state.devices = devices.clone();
        }

        StateUpdate::SessionUpdated(session) => {
            state.session = session.clone();
        }

        StateUpdate::WorkspaceRunning { workspace, running } => {
            let ws = state.workspace_mut(*workspace);
            ws.is_running = *running;
            if *running {
                ws.errors.clear();
                ws.last_result = None;
            }
        }

        StateUpdate::ConsoleLog { workspace, message } => {
            let max = state.max_console_lines;
            state.workspace_mut(*workspace).push_output(message.clone(), max);
        }

        StateUpdate::EvalError { workspace, errors } => {
            state.workspace_mut(*workspace).errors = errors.clone();
        }

        StateUpdate::EvalSuccess { workspace, value } => {
            let ws = state.workspace_mut(*workspace);
            ws.last_result = Some(value.clone());
            ws.errors.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Connection, ConnectionStatus, DeviceSession};
    use rexec_core::{EvalError, WorkspaceLocation};
    use rexec_device::test_utils::{test_device, test_endpoint, MockTransportFactory};
    use rexec_device::{TransportConfig, TransportFactory};

    const WS: WorkspaceLocation = WorkspaceLocation::Playground;

    fn session(connection_failed: bool) -> DeviceSession {
        let endpoint = test_endpoint("web-");
        let link = MockTransportFactory::default().create(TransportConfig::from_endpoint(&endpoint));
        let connection = Connection::Connecting {
            transport: link.handle,
            endpoint,
        };
        DeviceSession {
            workspace: WS,
            device: test_device(1, "Desk"),
            connection: if connection_failed {
                connection.into_failed("refused")
            } else {
                connection.into_connected()
            },
        }
    }

    #[test]
    fn test_devices_replaced_wholesale() {
        let mut state = AppState::new();
        update(
            &mut state,
            &StateUpdate::DevicesUpdated(vec![test_device(1, "A"), test_device(2, "B")]),
        );
        update(&mut state, &StateUpdate::DevicesUpdated(vec![test_device(3, "C")]));
        assert_eq!(state.devices.len(), 1);
        assert!(state.find_device(3).is_some());
        assert!(state.find_device(1).is_none());
    }

    #[test]
    fn test_session_set_and_cleared() {
        let mut state = AppState::new();
        update(&mut state, &StateUpdate::SessionUpdated(Some(session(false))));
        assert!(state.is_connected());

        update(&mut state, &StateUpdate::SessionUpdated(Some(session(true))));
        assert_eq!(state.connection_status(), Some(ConnectionStatus::Failed));

        update(&mut state, &StateUpdate::SessionUpdated(None));
        assert!(state.session.is_none());
    }

    #[test]
    fn test_console_log_appends() {
        let mut state = AppState::new();
        for line in ["a", "b"] {
            update(
                &mut state,
                &StateUpdate::ConsoleLog {
                    workspace: WS,
                    message: line.to_string(),
                },
            );
        }
        let ws = state.workspace(WS).unwrap();
        assert_eq!(ws.output.len(), 2);
        assert_eq!(ws.output[1].message, "b");
        assert!(state.workspace(WorkspaceLocation::Grading).is_none());
    }

    #[test]
    fn test_running_clears_previous_outcome() {
        let mut state = AppState::new();
        update(
            &mut state,
            &StateUpdate::EvalError {
                workspace: WS,
                errors: vec![EvalError::device("boom")],
            },
        );
        assert_eq!(state.workspace(WS).unwrap().errors.len(), 1);

        update(
            &mut state,
            &StateUpdate::WorkspaceRunning {
                workspace: WS,
                running: true,
            },
        );
        let ws = state.workspace(WS).unwrap();
        assert!(ws.is_running);
        assert!(ws.errors.is_empty());

        update(
            &mut state,
            &StateUpdate::WorkspaceRunning {
                workspace: WS,
                running: false,
            },
        );
        assert!(!state.workspace(WS).unwrap().is_running);
    }

    #[test]
    fn test_eval_success_records_result() {
        let mut state = AppState::new();
        update(
            &mut state,
            &StateUpdate::EvalSuccess {
                workspace: WS,
                value: "2".to_string(),
            },
        );
        assert_eq!(state.workspace(WS).unwrap().last_result.as_deref(), Some("2"));
    }
}
