//! End-to-end tests for the WebSocket transport against a local device stub.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

use rexec_core::{DisplayKind, TransportEvent};
use rexec_device::{TransportConfig, TransportFactory, WsTransportFactory};

const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// What the device stub observed from the client
#[derive(Debug)]
enum Observed {
    Text(String),
    Binary(Vec<u8>),
    Closed,
}

/// Accept one client, send `script` frames after the hello, and report
/// everything the client sends afterwards.
async fn spawn_device_stub(script: Vec<String>) -> (String, mpsc::UnboundedReceiver<Observed>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (observed_tx, observed_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        // First frame is always the hello
        if let Some(Ok(WsMessage::Text(text))) = ws.next().await {
            let _ = observed_tx.send(Observed::Text(text.as_str().to_string()));
        }

        for frame in script {
            ws.send(WsMessage::Text(frame.into())).await.unwrap();
        }

        while let Some(frame) = ws.next().await {
            match frame {
                Ok(WsMessage::Binary(bytes)) => {
                    let _ = observed_tx.send(Observed::Binary(bytes.to_vec()));
                }
                Ok(WsMessage::Text(text)) => {
                    let _ = observed_tx.send(Observed::Text(text.as_str().to_string()));
                }
                Ok(WsMessage::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
        let _ = observed_tx.send(Observed::Closed);
    });

    (format!("ws://{addr}/device"), observed_rx)
}

fn config(endpoint: String) -> TransportConfig {
    TransportConfig {
        client_id: "web-integration".to_string(),
        device_id: "thing-99".to_string(),
        websocket_endpoint: endpoint,
    }
}

async fn next_event(events: &mut mpsc::Receiver<TransportEvent>) -> TransportEvent {
    timeout(STEP_TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("event channel closed")
}

async fn next_observed(observed: &mut mpsc::UnboundedReceiver<Observed>) -> Observed {
    timeout(STEP_TIMEOUT, observed.recv())
        .await
        .expect("timed out waiting for device stub")
        .expect("device stub channel closed")
}

#[tokio::test]
async fn test_connect_sends_hello_and_relays_device_frames() {
    let (endpoint, mut observed) = spawn_device_stub(vec![
        r#"{"type":"status","running":true}"#.to_string(),
        r#"{"type":"display","kind":"output","message":"hello from ev3"}"#.to_string(),
        r#"{"type":"display","kind":"result","message":"2"}"#.to_string(),
        r#"{"type":"status","running":false}"#.to_string(),
    ])
    .await;

    let mut link = WsTransportFactory::new().create(config(endpoint));
    link.handle.connect();

    assert_eq!(next_event(&mut link.events).await, TransportEvent::Connected);

    match next_observed(&mut observed).await {
        Observed::Text(text) => {
            let hello: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(hello["type"], "hello");
            assert_eq!(hello["clientId"], "web-integration");
            assert_eq!(hello["deviceId"], "thing-99");
        }
        other => panic!("expected hello, got {other:?}"),
    }

    assert_eq!(
        next_event(&mut link.events).await,
        TransportEvent::StatusChange { running: true }
    );
    assert_eq!(
        next_event(&mut link.events).await,
        TransportEvent::display(DisplayKind::Output, "hello from ev3")
    );
    assert_eq!(
        next_event(&mut link.events).await,
        TransportEvent::display(DisplayKind::Result, "2")
    );
    assert_eq!(
        next_event(&mut link.events).await,
        TransportEvent::StatusChange { running: false }
    );
}

#[tokio::test]
async fn test_send_run_transmits_binary_frame() {
    let (endpoint, mut observed) = spawn_device_stub(Vec::new()).await;

    let mut link = WsTransportFactory::new().create(config(endpoint));
    link.handle.connect();
    assert_eq!(next_event(&mut link.events).await, TransportEvent::Connected);
    assert!(matches!(next_observed(&mut observed).await, Observed::Text(_)));

    link.handle.send_run(vec![0xde, 0xad, 0xbe, 0xef]).unwrap();

    match next_observed(&mut observed).await {
        Observed::Binary(bytes) => assert_eq!(bytes, vec![0xde, 0xad, 0xbe, 0xef]),
        other => panic!("expected binary frame, got {other:?}"),
    }
}

#[tokio::test]
async fn test_disconnect_closes_connection() {
    let (endpoint, mut observed) = spawn_device_stub(Vec::new()).await;

    let mut link = WsTransportFactory::new().create(config(endpoint));
    link.handle.connect();
    assert_eq!(next_event(&mut link.events).await, TransportEvent::Connected);
    assert!(matches!(next_observed(&mut observed).await, Observed::Text(_)));

    link.handle.disconnect();

    assert!(matches!(next_observed(&mut observed).await, Observed::Closed));
    assert_eq!(next_event(&mut link.events).await, TransportEvent::Closed);
}

#[tokio::test]
async fn test_connect_refused_reports_error() {
    // Bind then drop to get a port nothing listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut link = WsTransportFactory::new().create(config(format!("ws://{addr}/device")));
    link.handle.connect();

    match next_event(&mut link.events).await {
        TransportEvent::Error(message) => assert!(message.contains("Failed to connect")),
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_display_burst_beyond_channel_capacity_is_delivered() {
    let burst = rexec_device::transport::EVENT_CHANNEL_CAPACITY * 2 + 88;
    let script = (0..burst)
        .map(|i| format!(r#"{{"type":"display","kind":"output","message":"line {i}"}}"#))
        .collect();
    let (endpoint, _observed) = spawn_device_stub(script).await;

    let mut link = WsTransportFactory::new().create(config(endpoint));
    link.handle.connect();
    assert_eq!(next_event(&mut link.events).await, TransportEvent::Connected);

    // Let the device outrun the consumer.
    tokio::time::sleep(Duration::from_millis(500)).await;

    for i in 0..burst {
        assert_eq!(
            next_event(&mut link.events).await,
            TransportEvent::display(DisplayKind::Output, format!("line {i}"))
        );
    }
}
