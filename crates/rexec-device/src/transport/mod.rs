//! Device execution transports.
//!
//! A transport is the client side of a single connection to a device. It is
//! deliberately thin: it exposes `connect`, `disconnect` and `send_run`, and
//! reports everything that happens on the wire as [`TransportEvent`]s on a
//! channel handed out alongside the handle.
//!
//! ## Modules
//!
//! - [`protocol`]: JSON control frames exchanged with the device.
//! - [`websocket`]: `tokio-tungstenite` implementation with a background I/O task.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use rexec_core::prelude::*;
use rexec_core::{TransportEvent, WebSocketEndpointInformation};

use crate::nonce;

pub mod protocol;
pub mod websocket;

pub use protocol::{parse_device_frame, ClientFrame, DeviceFrame};
pub use websocket::{LinkState, WsTransport, WsTransportFactory};

/// Capacity of a transport's event channel (bounded, device output can be bursty).
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Parameters used to construct a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Client identity presented to the broker
    pub client_id: String,
    /// Device identifier on the transport side
    pub device_id: String,
    /// WebSocket URL to connect to
    pub websocket_endpoint: String,
}

impl TransportConfig {
    /// Build a config for a freshly resolved endpoint.
    ///
    /// The client id is the endpoint's prefix followed by a new random nonce,
    /// so every call yields a distinct identity.
    pub fn from_endpoint(endpoint: &WebSocketEndpointInformation) -> Self {
        Self {
            client_id: nonce::client_id(&endpoint.client_name_prefix),
            device_id: endpoint.thing_name.clone(),
            websocket_endpoint: endpoint.endpoint.clone(),
        }
    }
}

/// Handle for one device connection.
///
/// All methods return immediately. Outcomes (handshake success or failure,
/// device output, connection loss) arrive on the event channel of the
/// [`TransportLink`] the handle was created with.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Client id this transport presents to the device
    fn client_id(&self) -> &str;

    /// Start the connect handshake. Settles with exactly one of
    /// `TransportEvent::Connected` or `TransportEvent::Error`.
    fn connect(&self);

    /// Close the connection. Safe to call in any state, including twice.
    fn disconnect(&self);

    /// Queue an assembled program for execution on the device.
    ///
    /// Delivery is not acknowledged; an error only means the transport has
    /// already shut down.
    fn send_run(&self, program: Vec<u8>) -> Result<()>;
}

/// Shared, type-erased transport handle
pub type TransportHandle = Arc<dyn Transport>;

/// A freshly created transport and the receiving end of its event channel
#[derive(Debug)]
pub struct TransportLink {
    pub handle: TransportHandle,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Builds transports for resolved endpoints
pub trait TransportFactory: Send + Sync {
    fn create(&self, config: TransportConfig) -> TransportLink;
}

impl<T: TransportFactory + ?Sized> TransportFactory for Arc<T> {
    fn create(&self, config: TransportConfig) -> TransportLink {
        (**self).create(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> WebSocketEndpointInformation {
        WebSocketEndpointInformation {
            client_name_prefix: "web-".to_string(),
            thing_name: "thing-1".to_string(),
            endpoint: "ws://127.0.0.1:9/ws".to_string(),
        }
    }

    #[test]
    fn test_config_from_endpoint_maps_fields() {
        let config = TransportConfig::from_endpoint(&endpoint());
        assert_eq!(config.device_id, "thing-1");
        assert_eq!(config.websocket_endpoint, "ws://127.0.0.1:9/ws");
        assert!(config.client_id.starts_with("web-"));
        assert_eq!(
            config.client_id.len(),
            "web-".len() + crate::nonce::CLIENT_NONCE_LEN
        );
    }

    #[test]
    fn test_config_from_endpoint_uses_fresh_client_ids() {
        let a = TransportConfig::from_endpoint(&endpoint());
        let b = TransportConfig::from_endpoint(&endpoint());
        assert_ne!(a.client_id, b.client_id);
    }

    #[test]
    fn test_transport_handle_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TransportHandle>();
    }
}
