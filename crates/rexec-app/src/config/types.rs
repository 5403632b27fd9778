//! Configuration types for Remote Exec

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use rexec_core::prelude::*;
use rexec_core::{AuthTokens, WorkspaceLocation};

/// Application settings (.rexec/config.toml)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub directory: DirectorySettings,

    /// Directory tokens. Prefer the environment over writing these to disk.
    #[serde(default)]
    pub auth: AuthTokens,

    #[serde(default)]
    pub session: SessionSettings,
}

/// Device directory backend
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DirectorySettings {
    /// Base URL of the backend API, device routes hang off it
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

impl DirectorySettings {
    /// Parsed `base_url`
    pub fn url(&self) -> Result<Url> {
        Url::parse(&self.base_url)
            .map_err(|e| Error::config(format!("Invalid directory base_url '{}': {}", self.base_url, e)))
    }
}

fn default_base_url() -> String {
    "http://localhost:3000/v2".to_string()
}

/// Session behaviour
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SessionSettings {
    /// Handshake timeout in milliseconds; unset waits indefinitely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,

    /// Capacity of the state-update channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Workspace used when a command does not name one
    #[serde(default)]
    pub default_workspace: WorkspaceLocation,

    /// Console lines kept per workspace
    #[serde(default = "default_max_console_lines")]
    pub max_console_lines: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: None,
            event_buffer: default_event_buffer(),
            default_workspace: WorkspaceLocation::default(),
            max_console_lines: default_max_console_lines(),
        }
    }
}

impl SessionSettings {
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }
}

fn default_event_buffer() -> usize {
    256
}

fn default_max_console_lines() -> usize {
    crate::state::DEFAULT_MAX_CONSOLE_LINES
}
