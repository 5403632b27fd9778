//! Events emitted by a device transport
//!
//! A transport never calls back into application state. It pushes these
//! events onto a channel and the session layer decides what they mean.

use serde::{Deserialize, Serialize};

/// Subtype of a device `display` message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayKind {
    /// Program output (console log line)
    Output,
    /// Runtime error raised on the device
    Error,
    /// Final value of a successful run
    Result,
}

/// Typed event from a device transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connect handshake completed
    Connected,

    /// The connect handshake (or the live connection) failed
    Error(String),

    /// The device started or stopped running a program
    StatusChange { running: bool },

    /// The device displayed something
    Display { message: String, kind: DisplayKind },

    /// The connection ended
    Closed,
}

impl TransportEvent {
    pub fn display(kind: DisplayKind, message: impl Into<String>) -> Self {
        Self::Display {
            message: message.into(),
            kind,
        }
    }

    /// True for the two events that settle a connect attempt
    pub fn is_handshake_outcome(&self) -> bool {
        matches!(self, TransportEvent::Connected | TransportEvent::Error(_))
    }
}
