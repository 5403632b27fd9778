//! Control frames exchanged with a device over the WebSocket transport.
//!
//! Control traffic is JSON text frames tagged by `"type"`. Programs travel as
//! binary frames and never go through this module.
//!
//! ```text
//! client → device   {"type":"hello","clientId":"web-Ab3…","deviceId":"thing-7"}
//! device → client   {"type":"status","running":true}
//! device → client   {"type":"display","kind":"output","message":"hello"}
//! device → client   {"type":"error","message":"broker rejected client"}
//! ```

use serde::{Deserialize, Serialize};

use rexec_core::{DisplayKind, TransportEvent};

/// Frames sent by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Announces the client identity right after the WebSocket handshake
    Hello {
        #[serde(rename = "clientId")]
        client_id: String,
        #[serde(rename = "deviceId")]
        device_id: String,
    },
}

impl ClientFrame {
    pub fn hello(client_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self::Hello {
            client_id: client_id.into(),
            device_id: device_id.into(),
        }
    }
}

/// Frames sent by the device
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DeviceFrame {
    Status { running: bool },
    Display { kind: DisplayKind, message: String },
    Error { message: String },
}

impl From<DeviceFrame> for TransportEvent {
    fn from(frame: DeviceFrame) -> Self {
        match frame {
            DeviceFrame::Status { running } => TransportEvent::StatusChange { running },
            DeviceFrame::Display { kind, message } => TransportEvent::Display { message, kind },
            DeviceFrame::Error { message } => TransportEvent::Error(message),
        }
    }
}

/// Parse a text frame from the device.
///
/// Returns `None` for anything that is not a recognised control frame; the
/// caller decides whether that is worth logging.
pub fn parse_device_frame(text: &str) -> Option<TransportEvent> {
    serde_json::from_str::<DeviceFrame>(text)
        .ok()
        .map(TransportEvent::from)
}
