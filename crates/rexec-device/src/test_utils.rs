//! Test utilities for directory and transport consumers
//!
//! Provides an in-memory [`MockDirectory`], a scriptable [`MockTransport`]
//! and a [`MockTransportFactory`] that records every transport it creates.
//! All mocks append to a shared [`Journal`] so tests can assert on the
//! relative order of calls across objects.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use rexec_core::prelude::*;
use rexec_core::{AuthTokens, Device, TransportEvent, WebSocketEndpointInformation};

use crate::directory::DeviceDirectory;
use crate::transport::{
    Transport, TransportConfig, TransportFactory, TransportLink, EVENT_CHANNEL_CAPACITY,
};

/// Ordered record of mock calls, shared between mocks
pub type Journal = Arc<Mutex<Vec<String>>>;

fn record(journal: &Journal, entry: String) {
    journal.lock().unwrap_or_else(|e| e.into_inner()).push(entry);
}

/// Creates a test device.
pub fn test_device(id: i64, title: &str) -> Device {
    Device::new(id, title, "ev3")
}

/// Creates a test endpoint with the given client-name prefix.
pub fn test_endpoint(prefix: &str) -> WebSocketEndpointInformation {
    WebSocketEndpointInformation {
        client_name_prefix: prefix.to_string(),
        thing_name: format!("{prefix}thing"),
        endpoint: "ws://127.0.0.1:0/mock".to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────
// Directory
// ─────────────────────────────────────────────────────────────────

/// In-memory device directory
#[derive(Debug, Default)]
pub struct MockDirectory {
    devices: Mutex<Vec<Device>>,
    endpoint: Mutex<Option<WebSocketEndpointInformation>>,
    fail_fetch: AtomicBool,
    fetch_calls: AtomicUsize,
    endpoint_calls: AtomicUsize,
}

impl MockDirectory {
    pub fn new(devices: Vec<Device>, endpoint: Option<WebSocketEndpointInformation>) -> Self {
        Self {
            devices: Mutex::new(devices),
            endpoint: Mutex::new(endpoint),
            ..Default::default()
        }
    }

    pub fn set_devices(&self, devices: Vec<Device>) {
        *self.devices.lock().unwrap_or_else(|e| e.into_inner()) = devices;
    }

    pub fn set_endpoint(&self, endpoint: Option<WebSocketEndpointInformation>) {
        *self.endpoint.lock().unwrap_or_else(|e| e.into_inner()) = endpoint;
    }

    /// Make subsequent `fetch_devices` calls fail with a directory error
    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn endpoint_calls(&self) -> usize {
        self.endpoint_calls.load(Ordering::SeqCst)
    }
}

impl DeviceDirectory for MockDirectory {
    async fn fetch_devices(&self, _tokens: &AuthTokens) -> Result<Vec<Device>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(Error::directory("mock directory unavailable"));
        }
        Ok(self.devices.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn device_ws_endpoint(
        &self,
        _device: &Device,
        _tokens: &AuthTokens,
    ) -> Result<Option<WebSocketEndpointInformation>> {
        self.endpoint_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.endpoint.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }
}

// ─────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────

/// How a [`MockTransport`] answers `connect()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectBehavior {
    /// Emit `Connected` immediately
    Accept,
    /// Emit `Error(message)` immediately
    Reject(String),
    /// Emit nothing; the test drives events with [`MockTransport::emit`]
    Manual,
}

/// Scriptable transport that records what the session layer asks of it
#[derive(Debug)]
pub struct MockTransport {
    config: TransportConfig,
    behavior: ConnectBehavior,
    event_tx: mpsc::Sender<TransportEvent>,
    journal: Journal,
    sent: Mutex<Vec<Vec<u8>>>,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    closed: AtomicBool,
}

impl MockTransport {
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Push an event as if it came from the device
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.event_tx.try_send(event);
    }

    /// Programs passed to `send_run`, in call order
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    /// Make `send_run` fail as if the background task had exited
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl Transport for MockTransport {
    fn client_id(&self) -> &str {
        &self.config.client_id
    }

    fn connect(&self) {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        record(&self.journal, format!("connect:{}", self.config.client_id));
        match &self.behavior {
            ConnectBehavior::Accept => self.emit(TransportEvent::Connected),
            ConnectBehavior::Reject(message) => self.emit(TransportEvent::Error(message.clone())),
            ConnectBehavior::Manual => {}
        }
    }

    fn disconnect(&self) {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        record(&self.journal, format!("disconnect:{}", self.config.client_id));
    }

    fn send_run(&self, program: Vec<u8>) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ChannelClosed);
        }
        record(&self.journal, format!("send:{}", self.config.client_id));
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(program);
        Ok(())
    }
}

/// Factory producing [`MockTransport`]s
#[derive(Debug)]
pub struct MockTransportFactory {
    behavior: Mutex<ConnectBehavior>,
    created: Mutex<Vec<Arc<MockTransport>>>,
    journal: Journal,
}

impl Default for MockTransportFactory {
    fn default() -> Self {
        Self::new(ConnectBehavior::Accept)
    }
}

impl MockTransportFactory {
    pub fn new(behavior: ConnectBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            created: Mutex::new(Vec::new()),
            journal: Journal::default(),
        }
    }

    /// Behaviour applied to transports created from now on
    pub fn set_behavior(&self, behavior: ConnectBehavior) {
        *self.behavior.lock().unwrap_or_else(|e| e.into_inner()) = behavior;
    }

    /// Every transport created so far, oldest first
    pub fn transports(&self) -> Vec<Arc<MockTransport>> {
        self.created
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn last(&self) -> Option<Arc<MockTransport>> {
        self.transports().pop()
    }

    /// Snapshot of the shared call journal
    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(&self, config: TransportConfig) -> TransportLink {
        let (event_tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        record(&self.journal, format!("create:{}", config.client_id));

        let transport = Arc::new(MockTransport {
            config,
            behavior: self
                .behavior
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
            event_tx,
            journal: Arc::clone(&self.journal),
            sent: Mutex::new(Vec::new()),
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        });

        self.created
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::clone(&transport));

        TransportLink {
            handle: transport,
            events,
        }
    }
}
