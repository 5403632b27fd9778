//! Owns the single device session and drives its lifecycle
//!
//! The [`SessionManager`] holds at most one [`DeviceSession`]. Each operation
//! returns an explicit outcome and publishes [`StateUpdate`]s on the channel
//! it was built with. Transport events are consumed by a per-connection
//! forwarding task that turns them into workspace-scoped updates.
//!
//! The slot is a `std::sync::Mutex` and is never held across an `.await`, so
//! individual slot writes are atomic but multi-step operations can interleave
//! with each other. Two async locks add ordering on top of that:
//!
//! - `session_order` is held from a slot write until its `SessionUpdated` is
//!   queued, so published session updates follow slot-write order.
//! - `run_order` is held for a whole run, so compiles of overlapping runs
//!   never share a context and transmit in the order they finished.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};

use rexec_core::prelude::*;
use rexec_core::{
    AuthTokens, Device, DisplayKind, EvalContext, EvalError, TransportEvent, WorkspaceLocation,
};
use rexec_device::{DeviceDirectory, TransportConfig, TransportFactory, TransportLink};

use crate::compiler::Compiler;
use crate::message::StateUpdate;
use crate::session::{Connection, ConnectionStatus, DeviceSession};

/// Result of a connect attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConnectOutcome {
    /// Handshake succeeded; the session is `Connected`
    Connected,
    /// Handshake failed; the session is `Failed` with this error
    Failed { error: String },
    /// The directory had no endpoint for the device; nothing changed
    NoEndpoint,
    /// The slot was cleared or taken by another connect while this attempt
    /// was in flight; its transport has been released
    Superseded,
}

/// Result of a run request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Program handed to the transport
    Sent { bytes: usize },
    /// No session, or the session is not `Connected`; nothing changed
    NotConnected,
    /// Compile failed; the errors were published for the workspace
    CompileFailed { errors: Vec<EvalError> },
    /// The session's transport has shut down
    TransportClosed,
}

/// Outcome of the connect handshake as seen by the forwarding task
type Handshake = std::result::Result<(), String>;

const CLOSED_BEFORE_CONNECTING: &str = "transport closed before connecting";

/// Manages the process-wide device session
pub struct SessionManager<D, F, C> {
    directory: D,
    transports: F,
    compiler: Arc<C>,
    tokens: RwLock<AuthTokens>,
    slot: Mutex<Option<DeviceSession>>,
    contexts: Mutex<HashMap<WorkspaceLocation, EvalContext>>,
    updates: mpsc::Sender<StateUpdate>,
    connect_timeout: Option<Duration>,
    session_order: AsyncMutex<()>,
    run_order: AsyncMutex<()>,
}

impl<D, F, C> std::fmt::Debug for SessionManager<D, F, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let session = self
            .slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|s| s.summary());
        f.debug_struct("SessionManager")
            .field("session", &session)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl<D, F, C> SessionManager<D, F, C>
where
    D: DeviceDirectory,
    F: TransportFactory,
    C: Compiler + 'static,
{
    pub fn new(
        directory: D,
        transports: F,
        compiler: C,
        updates: mpsc::Sender<StateUpdate>,
    ) -> Self {
        Self {
            directory,
            transports,
            compiler: Arc::new(compiler),
            tokens: RwLock::new(AuthTokens::default()),
            slot: Mutex::new(None),
            contexts: Mutex::new(HashMap::new()),
            updates,
            connect_timeout: None,
            session_order: AsyncMutex::new(()),
            run_order: AsyncMutex::new(()),
        }
    }

    pub fn with_tokens(self, tokens: AuthTokens) -> Self {
        self.set_tokens(tokens);
        self
    }

    /// Give up on a handshake after `timeout`. `None` waits indefinitely.
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn set_tokens(&self, tokens: AuthTokens) {
        *self.tokens.write().unwrap_or_else(|e| e.into_inner()) = tokens;
    }

    pub fn tokens(&self) -> AuthTokens {
        self.tokens.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Snapshot of the current session
    pub fn session(&self) -> Option<DeviceSession> {
        self.lock_slot().clone()
    }

    /// Evaluation context for a workspace (default if never set)
    pub fn context(&self, workspace: WorkspaceLocation) -> EvalContext {
        self.lock_contexts()
            .get(&workspace)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_context(&self, workspace: WorkspaceLocation, context: EvalContext) {
        self.lock_contexts().insert(workspace, context);
    }

    // ─────────────────────────────────────────────────────────────
    // Operations
    // ─────────────────────────────────────────────────────────────

    /// Fetch the device list and merge it into the current session.
    ///
    /// Publishes `DevicesUpdated` on success. If the session's device is in
    /// the new list, its entry is replaced (connection untouched) and
    /// `SessionUpdated` follows. Directory errors are returned unchanged.
    pub async fn refresh_devices(&self) -> Result<Vec<Device>> {
        let tokens = self.tokens();
        let devices = self.directory.fetch_devices(&tokens).await?;
        info!("Device directory returned {} device(s)", devices.len());

        self.publish(StateUpdate::DevicesUpdated(devices.clone()))
            .await;

        let _order = self.session_order.lock().await;
        let refreshed = {
            let mut slot = self.lock_slot();
            slot.as_mut().and_then(|session| {
                let fresh = devices.iter().find(|d| d.id == session.device.id)?;
                session.device = fresh.clone();
                Some(session.clone())
            })
        };

        if let Some(session) = refreshed {
            debug!("Refreshed session device {}", session.device.id);
            self.publish(StateUpdate::SessionUpdated(Some(session)))
                .await;
        }

        Ok(devices)
    }

    /// Open a session against `device`, bound to `workspace`.
    ///
    /// Publishes exactly one `Connecting` session update and then, unless the
    /// attempt was superseded, exactly one terminal update.
    pub async fn connect(
        &self,
        device: Device,
        workspace: WorkspaceLocation,
    ) -> Result<ConnectOutcome> {
        let tokens = self.tokens();
        let Some(endpoint) = self.directory.device_ws_endpoint(&device, &tokens).await? else {
            warn!("No endpoint available for device {}", device.display_name());
            return Ok(ConnectOutcome::NoEndpoint);
        };

        // At most one live transport: release the previous one first.
        if let Some(previous) = self.current_transport() {
            debug!("Releasing previous transport {}", previous.client_id());
            previous.disconnect();
        }

        let TransportLink { handle, events } = self
            .transports
            .create(TransportConfig::from_endpoint(&endpoint));
        let client_id = handle.client_id().to_string();
        info!(
            "Connecting to {} as {} ({})",
            device.display_name(),
            client_id,
            workspace
        );

        let (handshake_tx, handshake_rx) = oneshot::channel();
        tokio::spawn(forward_transport_events(
            client_id.clone(),
            workspace,
            events,
            handshake_tx,
            self.updates.clone(),
        ));

        let session = DeviceSession {
            workspace,
            device,
            connection: Connection::Connecting {
                transport: Arc::clone(&handle),
                endpoint,
            },
        };
        {
            let _order = self.session_order.lock().await;
            *self.lock_slot() = Some(session.clone());
            self.publish(StateUpdate::SessionUpdated(Some(session)))
                .await;
        }

        handle.connect();
        let handshake = self.await_handshake(handshake_rx).await;

        let order = self.session_order.lock().await;
        let terminal = {
            let mut slot = self.lock_slot();
            match slot.as_mut() {
                Some(current) if current.client_id() == client_id => {
                    let connection = current.connection.clone();
                    current.connection = match &handshake {
                        Ok(()) => connection.into_connected(),
                        Err(error) => connection.into_failed(error.clone()),
                    };
                    Some(current.clone())
                }
                _ => None,
            }
        };

        let Some(session) = terminal else {
            drop(order);
            info!("Connect attempt {} superseded, releasing it", client_id);
            handle.disconnect();
            return Ok(ConnectOutcome::Superseded);
        };

        self.publish(StateUpdate::SessionUpdated(Some(session)))
            .await;
        drop(order);

        match handshake {
            Ok(()) => {
                info!("Connected as {}", client_id);
                Ok(ConnectOutcome::Connected)
            }
            Err(error) => {
                warn!("Connect as {} failed: {}", client_id, error);
                Ok(ConnectOutcome::Failed { error })
            }
        }
    }

    /// Clear the session slot, closing its transport first.
    ///
    /// Always publishes `SessionUpdated(None)`. Returns whether a session
    /// existed.
    pub async fn disconnect(&self) -> bool {
        let _order = self.session_order.lock().await;
        let previous = {
            let mut slot = self.lock_slot();
            if let Some(session) = slot.as_ref() {
                session.connection.transport().disconnect();
            }
            slot.take()
        };

        match &previous {
            Some(session) => info!("Disconnected from {}", session.device.display_name()),
            None => debug!("Disconnect with no active session"),
        }

        self.publish(StateUpdate::SessionUpdated(None)).await;
        previous.is_some()
    }

    /// Compile `program` and hand the bytes to the connected transport.
    ///
    /// The evaluation context of the session's workspace is used, and compile
    /// errors are published for that workspace. Transmission is not
    /// acknowledged.
    pub async fn run(&self, workspace: WorkspaceLocation, program: String) -> Result<RunOutcome> {
        let _order = self.run_order.lock().await;
        let connected = {
            let slot = self.lock_slot();
            slot.as_ref()
                .filter(|s| s.status() == ConnectionStatus::Connected)
                .map(|s| (Arc::clone(s.connection.transport()), s.workspace))
        };
        let Some((transport, session_workspace)) = connected else {
            debug!("Run request for {} ignored, not connected", workspace);
            return Ok(RunOutcome::NotConnected);
        };
        if workspace != session_workspace {
            debug!(
                "Run requested from {}, session is bound to {}",
                workspace, session_workspace
            );
        }

        let mut context = self.context(session_workspace);
        let compiler = Arc::clone(&self.compiler);
        let (assembled, context) = tokio::task::spawn_blocking(move || {
            let assembled = compiler
                .compile(&program, &mut context)
                .map(|compiled| compiler.assemble(&compiled));
            (assembled, context)
        })
        .await
        .map_err(|e| Error::compile(format!("compile task aborted: {e}")))?;

        self.set_context(session_workspace, context.clone());

        let Some(bytes) = assembled else {
            info!(
                "Compile failed for {} with {} error(s)",
                session_workspace,
                context.errors.len()
            );
            self.publish(StateUpdate::EvalError {
                workspace: session_workspace,
                errors: context.errors.clone(),
            })
            .await;
            return Ok(RunOutcome::CompileFailed {
                errors: context.errors,
            });
        };

        let len = bytes.len();
        match transport.send_run(bytes) {
            Ok(()) => {
                debug!("Queued {} byte program on {}", len, transport.client_id());
                Ok(RunOutcome::Sent { bytes: len })
            }
            Err(Error::ChannelClosed) => {
                warn!("Transport {} already closed", transport.client_id());
                Ok(RunOutcome::TransportClosed)
            }
            Err(e) => Err(e),
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────

    async fn await_handshake(&self, handshake_rx: oneshot::Receiver<Handshake>) -> Handshake {
        let outcome = match self.connect_timeout {
            Some(limit) => match tokio::time::timeout(limit, handshake_rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(format!(
                        "connection timed out after {} ms",
                        limit.as_millis()
                    ))
                }
            },
            None => handshake_rx.await,
        };
        outcome.unwrap_or_else(|_| Err(CLOSED_BEFORE_CONNECTING.to_string()))
    }

    fn current_transport(&self) -> Option<rexec_device::TransportHandle> {
        self.lock_slot()
            .as_ref()
            .map(|s| Arc::clone(s.connection.transport()))
    }

    async fn publish(&self, update: StateUpdate) {
        if self.updates.send(update).await.is_err() {
            debug!("State update receiver dropped");
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<DeviceSession>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_contexts(&self) -> MutexGuard<'_, HashMap<WorkspaceLocation, EvalContext>> {
        self.contexts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Map a device event to the update it produces, if any.
///
/// Handshake and lifecycle events (`Connected`, `Error`, `Closed`) are
/// handled by the forwarding task itself and map to `None`.
pub fn translate_event(workspace: WorkspaceLocation, event: TransportEvent) -> Option<StateUpdate> {
    match event {
        TransportEvent::StatusChange { running } => {
            Some(StateUpdate::WorkspaceRunning { workspace, running })
        }
        TransportEvent::Display { message, kind } => Some(match kind {
            DisplayKind::Output => StateUpdate::ConsoleLog { workspace, message },
            DisplayKind::Error => StateUpdate::EvalError {
                workspace,
                errors: vec![EvalError::device(message)],
            },
            DisplayKind::Result => StateUpdate::EvalSuccess {
                workspace,
                value: message,
            },
        }),
        TransportEvent::Connected | TransportEvent::Error(_) | TransportEvent::Closed => None,
    }
}

/// Drain one transport's events until it closes.
///
/// The first `Connected` or `Error` settles the handshake; dropping
/// `handshake` unsettled tells the connect call the transport went away.
async fn forward_transport_events(
    client_id: String,
    workspace: WorkspaceLocation,
    mut events: mpsc::Receiver<TransportEvent>,
    handshake: oneshot::Sender<Handshake>,
    updates: mpsc::Sender<StateUpdate>,
) {
    let mut handshake = Some(handshake);

    while let Some(event) = events.recv().await {
        if event.is_handshake_outcome() {
            settle_handshake(&client_id, &mut handshake, event);
            continue;
        }
        match event {
            TransportEvent::Closed => {
                info!("Transport {}: connection closed", client_id);
                break;
            }
            event => {
                let Some(update) = translate_event(workspace, event) else {
                    continue;
                };
                if updates.send(update).await.is_err() {
                    debug!("Transport {}: update receiver dropped", client_id);
                    break;
                }
            }
        }
    }

    debug!("Transport {}: event forwarding finished", client_id);
}

/// Resolve the pending handshake with `event`, or log it once it is settled.
fn settle_handshake(
    client_id: &str,
    handshake: &mut Option<oneshot::Sender<Handshake>>,
    event: TransportEvent,
) {
    let result = match event {
        TransportEvent::Error(message) => Err(message),
        _ => Ok(()),
    };
    match (handshake.take(), result) {
        (Some(tx), result) => {
            let _ = tx.send(result);
        }
        (None, Ok(())) => debug!("Transport {}: duplicate connect signal", client_id),
        (None, Err(message)) => warn!("Transport {}: {}", client_id, message),
    }
}
