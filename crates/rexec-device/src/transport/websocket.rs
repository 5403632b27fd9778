//! WebSocket device transport.
//!
//! [`WsTransport`] is a cheap handle; the connection itself lives in a
//! background Tokio task spawned by [`WsTransportFactory::create`].
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      WsTransport                          │
//! │                                                           │
//! │  connect()    ──┐                                         │
//! │  send_run()   ──┼─cmd─▶  Background task                  │
//! │  disconnect() ──┘ chan    1. wait for Connect             │
//! │                           2. WebSocket handshake + hello  │
//! │  TransportLink.events ◀──  3. read/write select loop       │
//! │                     evt                                    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The task never reconnects. A dropped connection is reported as
//! [`TransportEvent::Closed`] and the session layer decides what to do.

use std::sync::{Arc, RwLock};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use rexec_core::prelude::*;
use rexec_core::TransportEvent;

use super::protocol::{parse_device_frame, ClientFrame};
use super::{
    Transport, TransportConfig, TransportFactory, TransportLink, EVENT_CHANNEL_CAPACITY,
};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Lifecycle of a [`WsTransport`]'s background task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Created, `connect()` not called yet
    Idle,
    /// WebSocket handshake in progress
    Connecting,
    /// Handshake done, hello sent
    Connected,
    /// Task has exited; the handle is inert
    Closed,
}

/// Commands sent from the handle to the background task
#[derive(Debug)]
enum TransportCommand {
    Connect,
    SendRun(Vec<u8>),
    Disconnect,
}

/// WebSocket transport handle
pub struct WsTransport {
    config: TransportConfig,
    cmd_tx: mpsc::UnboundedSender<TransportCommand>,
    state: Arc<RwLock<LinkState>>,
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("client_id", &self.config.client_id)
            .field("device_id", &self.config.device_id)
            .field("state", &self.link_state())
            .finish()
    }
}

impl WsTransport {
    /// Current state of the background task
    pub fn link_state(&self) -> LinkState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

impl Transport for WsTransport {
    fn client_id(&self) -> &str {
        &self.config.client_id
    }

    fn connect(&self) {
        if self.cmd_tx.send(TransportCommand::Connect).is_err() {
            debug!("Transport {}: connect after shutdown ignored", self.config.client_id);
        }
    }

    fn disconnect(&self) {
        // A closed channel means the task already exited.
        let _ = self.cmd_tx.send(TransportCommand::Disconnect);
    }

    fn send_run(&self, program: Vec<u8>) -> Result<()> {
        self.cmd_tx
            .send(TransportCommand::SendRun(program))
            .map_err(|_| Error::ChannelClosed)
    }
}

/// Creates [`WsTransport`]s.
///
/// `create` spawns the background task, so it must be called from within a
/// Tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransportFactory;

impl WsTransportFactory {
    pub fn new() -> Self {
        Self
    }
}

impl TransportFactory for WsTransportFactory {
    fn create(&self, config: TransportConfig) -> TransportLink {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let state = Arc::new(RwLock::new(LinkState::Idle));

        tokio::spawn(run_transport_task(
            config.clone(),
            cmd_rx,
            event_tx,
            Arc::clone(&state),
        ));

        TransportLink {
            handle: Arc::new(WsTransport {
                config,
                cmd_tx,
                state,
            }),
            events: event_rx,
        }
    }
}

// ---------------------------------------------------------------------------
// Background task
// ---------------------------------------------------------------------------

async fn run_transport_task(
    config: TransportConfig,
    mut cmd_rx: mpsc::UnboundedReceiver<TransportCommand>,
    event_tx: mpsc::Sender<TransportEvent>,
    state: Arc<RwLock<LinkState>>,
) {
    // Nothing touches the network until connect() is called.
    loop {
        match cmd_rx.recv().await {
            Some(TransportCommand::Connect) => break,
            Some(TransportCommand::SendRun(program)) => {
                warn!(
                    "Transport {}: dropping {} byte program, not connected",
                    config.client_id,
                    program.len()
                );
            }
            Some(TransportCommand::Disconnect) | None => {
                set_state(&state, LinkState::Closed);
                debug!("Transport {}: closed before connecting", config.client_id);
                return;
            }
        }
    }

    set_state(&state, LinkState::Connecting);
    info!(
        "Transport {}: connecting to {} for device {}",
        config.client_id, config.websocket_endpoint, config.device_id
    );

    let (mut ws_sink, ws_stream) = match open_session(&config).await {
        Ok(parts) => parts,
        Err(err) => {
            warn!("Transport {}: connect failed: {}", config.client_id, err);
            set_state(&state, LinkState::Closed);
            let _ = event_tx.send(TransportEvent::Error(err.to_string())).await;
            return;
        }
    };

    set_state(&state, LinkState::Connected);
    let _ = event_tx.send(TransportEvent::Connected).await;

    run_io_loop(&config, &mut ws_sink, ws_stream, &mut cmd_rx, &event_tx).await;

    set_state(&state, LinkState::Closed);
    emit(&event_tx, TransportEvent::Closed).await;
    debug!("Transport {}: background task exiting", config.client_id);
}

/// Perform the WebSocket handshake and announce the client identity.
async fn open_session(
    config: &TransportConfig,
) -> Result<(SplitSink<WsStream, WsMessage>, SplitStream<WsStream>)> {
    let (ws_stream, _response) = connect_async(config.websocket_endpoint.as_str())
        .await
        .map_err(|e| Error::transport(format!("Failed to connect to device: {e}")))?;
    let (mut ws_sink, ws_stream) = ws_stream.split();

    let hello = ClientFrame::hello(&config.client_id, &config.device_id);
    let json = serde_json::to_string(&hello)?;
    ws_sink
        .send(WsMessage::Text(json.into()))
        .await
        .map_err(|e| Error::transport(format!("Failed to send hello: {e}")))?;

    Ok((ws_sink, ws_stream))
}

/// Run the connected read/write loop until either side closes.
async fn run_io_loop(
    config: &TransportConfig,
    ws_sink: &mut SplitSink<WsStream, WsMessage>,
    mut ws_stream: SplitStream<WsStream>,
    cmd_rx: &mut mpsc::UnboundedReceiver<TransportCommand>,
    event_tx: &mpsc::Sender<TransportEvent>,
) {
    loop {
        tokio::select! {
            frame = ws_stream.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        match parse_device_frame(text.as_str()) {
                            Some(event) => {
                                // Backpressure: the socket is not read while the
                                // consumer is behind.
                                if !emit(event_tx, event).await {
                                    debug!("Transport {}: event receiver dropped", config.client_id);
                                    send_close(ws_sink).await;
                                    return;
                                }
                            }
                            None => debug!(
                                "Transport {}: ignoring unknown frame: {}",
                                config.client_id,
                                text.as_str().chars().take(120).collect::<String>()
                            ),
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        debug!("Transport {}: received Close frame", config.client_id);
                        return;
                    }
                    Some(Ok(_)) => {
                        // Ping, pong and binary frames are ignored
                    }
                    Some(Err(err)) => {
                        warn!("Transport {}: read error: {}", config.client_id, err);
                        emit(event_tx, TransportEvent::Error(err.to_string())).await;
                        return;
                    }
                    None => {
                        debug!("Transport {}: stream ended", config.client_id);
                        return;
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(TransportCommand::SendRun(program)) => {
                        let len = program.len();
                        if let Err(err) = ws_sink.send(WsMessage::Binary(program.into())).await {
                            warn!("Transport {}: failed to send program: {}", config.client_id, err);
                            emit(event_tx, TransportEvent::Error(err.to_string())).await;
                            return;
                        }
                        debug!("Transport {}: sent {} byte program", config.client_id, len);
                    }
                    Some(TransportCommand::Connect) => {
                        debug!("Transport {}: already connected", config.client_id);
                    }
                    Some(TransportCommand::Disconnect) | None => {
                        send_close(ws_sink).await;
                        return;
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn set_state(state: &RwLock<LinkState>, next: LinkState) {
    let mut guard = state.write().unwrap_or_else(|e| e.into_inner());
    *guard = next;
}

/// Forward an event, waiting for channel capacity.
///
/// Returns `false` once the receiver is gone.
async fn emit(event_tx: &mpsc::Sender<TransportEvent>, event: TransportEvent) -> bool {
    event_tx.send(event).await.is_ok()
}

/// Send a WebSocket Close frame, ignoring any write errors.
async fn send_close(ws_sink: &mut SplitSink<WsStream, WsMessage>) {
    let _ = ws_sink.send(WsMessage::Close(None)).await;
    let _ = ws_sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: &str) -> TransportConfig {
        TransportConfig {
            client_id: "web-test".to_string(),
            device_id: "thing-1".to_string(),
            websocket_endpoint: endpoint.to_string(),
        }
    }

    #[tokio::test]
    async fn test_new_transport_is_idle() {
        let link = WsTransportFactory::new().create(config("ws://127.0.0.1:1/ws"));
        assert_eq!(link.handle.client_id(), "web-test");
        let debug = format!("{:?}", link.handle);
        assert!(debug.contains("WsTransport"));
        assert!(debug.contains("Idle"));
    }

    #[tokio::test]
    async fn test_disconnect_before_connect_closes_channel() {
        let mut link = WsTransportFactory::new().create(config("ws://127.0.0.1:1/ws"));
        link.handle.disconnect();
        // Task exits without emitting anything, which closes the event channel.
        assert_eq!(link.events.recv().await, None);
    }

    #[tokio::test]
    async fn test_send_run_after_shutdown_is_error() {
        let mut link = WsTransportFactory::new().create(config("ws://127.0.0.1:1/ws"));
        link.handle.disconnect();
        assert_eq!(link.events.recv().await, None);
        assert!(matches!(
            link.handle.send_run(vec![1, 2, 3]),
            Err(Error::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_connect_to_invalid_url_reports_error() {
        let mut link = WsTransportFactory::new().create(config("not a websocket url"));
        link.handle.connect();
        match link.events.recv().await {
            Some(TransportEvent::Error(message)) => {
                assert!(message.contains("Failed to connect"), "{message}");
            }
            other => panic!("expected Error event, got {other:?}"),
        }
    }
}
