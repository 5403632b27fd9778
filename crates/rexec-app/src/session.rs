//! Device session record and its connection state machine
//!
//! ```text
//! (none) ──connect──▶ Connecting ──▶ Connected
//!                          │
//!                          └───────▶ Failed { error }
//! ```
//!
//! `Connected` and `Failed` are terminal for one connect attempt. The slot
//! holding the session is reassigned by a later connect or cleared by a
//! disconnect; there is no path from `Failed` back to `Connecting`.

use std::fmt;

use serde::Serialize;

use rexec_core::{Device, WebSocketEndpointInformation, WorkspaceLocation};
use rexec_device::TransportHandle;

/// Connection status tag, without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Failed,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Connection state of a session. Only `Failed` carries an error.
#[derive(Debug, Clone)]
pub enum Connection {
    Connecting {
        transport: TransportHandle,
        endpoint: WebSocketEndpointInformation,
    },
    Connected {
        transport: TransportHandle,
        endpoint: WebSocketEndpointInformation,
    },
    Failed {
        transport: TransportHandle,
        endpoint: WebSocketEndpointInformation,
        error: String,
    },
}

impl Connection {
    pub fn status(&self) -> ConnectionStatus {
        match self {
            Connection::Connecting { .. } => ConnectionStatus::Connecting,
            Connection::Connected { .. } => ConnectionStatus::Connected,
            Connection::Failed { .. } => ConnectionStatus::Failed,
        }
    }

    pub fn transport(&self) -> &TransportHandle {
        match self {
            Connection::Connecting { transport, .. }
            | Connection::Connected { transport, .. }
            | Connection::Failed { transport, .. } => transport,
        }
    }

    pub fn endpoint(&self) -> &WebSocketEndpointInformation {
        match self {
            Connection::Connecting { endpoint, .. }
            | Connection::Connected { endpoint, .. }
            | Connection::Failed { endpoint, .. } => endpoint,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Connection::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Move to `Connected`, keeping transport and endpoint
    pub fn into_connected(self) -> Self {
        let (transport, endpoint) = self.into_parts();
        Connection::Connected {
            transport,
            endpoint,
        }
    }

    /// Move to `Failed`, keeping transport and endpoint
    pub fn into_failed(self, error: impl Into<String>) -> Self {
        let (transport, endpoint) = self.into_parts();
        Connection::Failed {
            transport,
            endpoint,
            error: error.into(),
        }
    }

    fn into_parts(self) -> (TransportHandle, WebSocketEndpointInformation) {
        match self {
            Connection::Connecting {
                transport,
                endpoint,
            }
            | Connection::Connected {
                transport,
                endpoint,
            }
            | Connection::Failed {
                transport,
                endpoint,
                ..
            } => (transport, endpoint),
        }
    }
}

/// The binding between a workspace and a remote device
#[derive(Debug, Clone)]
pub struct DeviceSession {
    pub workspace: WorkspaceLocation,
    pub device: Device,
    pub connection: Connection,
}

impl DeviceSession {
    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    /// Client id of the transport backing this session
    pub fn client_id(&self) -> &str {
        self.connection.transport().client_id()
    }

    /// Serializable view for frontends and headless output
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            workspace: self.workspace,
            device: self.device.clone(),
            status: self.status(),
            client_id: self.client_id().to_string(),
            error: self.connection.error().map(str::to_string),
        }
    }
}

/// Transport-free snapshot of a [`DeviceSession`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub workspace: WorkspaceLocation,
    pub device: Device,
    pub status: ConnectionStatus,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rexec_device::test_utils::{test_device, test_endpoint, MockTransportFactory};
    use rexec_device::{TransportConfig, TransportFactory};

    fn session() -> DeviceSession {
        let endpoint = test_endpoint("web-");
        let link = MockTransportFactory::default().create(TransportConfig::from_endpoint(&endpoint));
        DeviceSession {
            workspace: WorkspaceLocation::Playground,
            device: test_device(1, "Desk"),
            connection: Connection::Connecting {
                transport: link.handle,
                endpoint,
            },
        }
    }

    #[test]
    fn test_connecting_has_no_error() {
        let session = session();
        assert_eq!(session.status(), ConnectionStatus::Connecting);
        assert_eq!(session.connection.error(), None);
        assert!(session.client_id().starts_with("web-"));
    }

    #[test]
    fn test_transitions_keep_transport_and_endpoint() {
        let session = session();
        let client_id = session.client_id().to_string();

        let connected = session.connection.clone().into_connected();
        assert_eq!(connected.status(), ConnectionStatus::Connected);
        assert_eq!(connected.transport().client_id(), client_id);

        let failed = session.connection.into_failed("refused");
        assert_eq!(failed.status(), ConnectionStatus::Failed);
        assert_eq!(failed.error(), Some("refused"));
        assert_eq!(failed.endpoint().thing_name, "web-thing");
    }

    #[test]
    fn test_summary_serializes_status() {
        let mut session = session();
        session.connection = session.connection.into_failed("boom");
        let json = serde_json::to_value(session.summary()).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "boom");
        assert_eq!(json["workspace"], "playground");
    }
}
