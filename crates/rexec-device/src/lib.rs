//! # rexec-device - Device Directory and Transports
//!
//! Talks to the outside world on behalf of a device session: the authenticated
//! device directory (HTTP) and the per-device execution transport (WebSocket).
//!
//! Depends on [`rexec_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Device Directory
//! - [`DeviceDirectory`] - Lists devices and resolves one-time WebSocket endpoints
//! - [`HttpDeviceDirectory`] - `reqwest` implementation against the playground backend
//!
//! ### Transports
//! - [`Transport`] - Handle for one device connection (connect, disconnect, send_run)
//! - [`TransportFactory`] - Builds a transport plus its event channel
//! - [`WsTransportFactory`] - WebSocket implementation
//!
//! ### Utilities
//! - [`generate_client_nonce()`] - Random suffix for transport client ids

pub mod directory;
pub mod nonce;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;
pub mod transport;

// Public API re-exports
pub use directory::{DeviceDirectory, HttpDeviceDirectory, LocalDeviceDirectory};
pub use nonce::{client_id, generate_client_nonce, CLIENT_NONCE_LEN};
pub use transport::{
    Transport, TransportConfig, TransportFactory, TransportHandle, TransportLink,
    WsTransportFactory,
};
