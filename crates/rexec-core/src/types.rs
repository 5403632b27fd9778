//! Domain types shared by the directory client, the transport and the app layer

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A remote device registered with the device directory.
///
/// Devices are replaced wholesale on each directory refresh; nothing in the
/// app mutates a `Device` in place.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Directory-assigned identifier
    pub id: i64,

    /// Human-readable device name
    pub title: String,

    /// Device type as reported by the directory (e.g. "ev3", "esp32")
    #[serde(rename = "type")]
    pub device_type: String,
}

impl Device {
    pub fn new(id: i64, title: impl Into<String>, device_type: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            device_type: device_type.into(),
        }
    }

    /// Get a display string for the device
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.title, self.device_type)
    }
}

/// One-time connection parameters for a device, produced fresh for every
/// connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketEndpointInformation {
    /// Prefix the client id must start with
    pub client_name_prefix: String,

    /// Identifier of the device on the transport side
    pub thing_name: String,

    /// WebSocket URL of the transport endpoint
    pub endpoint: String,
}

/// Credentials for authenticated directory calls
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AuthTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl AuthTokens {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token: Some(refresh_token.into()),
        }
    }

    /// Returns true when an access token is available
    pub fn is_authenticated(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

// Tokens never end up in logs.
impl fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthTokens")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Playground workspace a device session is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceLocation {
    #[default]
    Playground,
    Assessment,
    Grading,
    Sourcecast,
    Sourcereel,
}

impl WorkspaceLocation {
    pub const ALL: [WorkspaceLocation; 5] = [
        WorkspaceLocation::Playground,
        WorkspaceLocation::Assessment,
        WorkspaceLocation::Grading,
        WorkspaceLocation::Sourcecast,
        WorkspaceLocation::Sourcereel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkspaceLocation::Playground => "playground",
            WorkspaceLocation::Assessment => "assessment",
            WorkspaceLocation::Grading => "grading",
            WorkspaceLocation::Sourcecast => "sourcecast",
            WorkspaceLocation::Sourcereel => "sourcereel",
        }
    }
}

impl fmt::Display for WorkspaceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkspaceLocation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkspaceLocation::ALL
            .into_iter()
            .find(|w| w.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown workspace: {s}"))
    }
}
