//! Engine - dispatches actions and keeps the application state current
//!
//! The Engine owns the [`AppState`], the [`SessionManager`] and the receiving
//! end of the state-update channel. Every dispatched [`Action`] runs in its
//! own Tokio task, so actions of any kind overlap freely. Updates are applied
//! to the state in arrival order and rebroadcast to subscribers.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use rexec_core::prelude::*;
use rexec_core::Device;
use rexec_device::{DeviceDirectory, TransportFactory};

use crate::compiler::Compiler;
use crate::config::Settings;
use crate::handler;
use crate::message::{Action, StateUpdate};
use crate::session_manager::{ConnectOutcome, RunOutcome, SessionManager};
use crate::state::AppState;

/// Capacity of the subscriber broadcast channel
const BROADCAST_CAPACITY: usize = 256;

/// What a dispatched action returned
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionOutcome {
    FetchDevices { devices: Vec<Device> },
    Connect { result: ConnectOutcome },
    Disconnect { had_session: bool },
    Run { result: RunOutcome },
}

/// Orchestration engine for Remote Exec
pub struct Engine<D, F, C> {
    /// TEA application state (the Model)
    pub state: AppState,

    manager: Arc<SessionManager<D, F, C>>,

    /// Updates published by the session manager, not yet applied
    update_rx: mpsc::Receiver<StateUpdate>,

    /// Rebroadcast of applied updates for external consumers
    event_tx: broadcast::Sender<StateUpdate>,
}

impl<D, F, C> Engine<D, F, C>
where
    D: DeviceDirectory + Sync + 'static,
    F: TransportFactory + 'static,
    C: Compiler + 'static,
{
    /// Build an engine from settings.
    ///
    /// Tokens, connect timeout, channel size and console cap all come from
    /// `settings`.
    pub fn new(directory: D, transports: F, compiler: C, settings: &Settings) -> Self {
        let (update_tx, update_rx) = mpsc::channel(settings.session.event_buffer.max(1));
        let manager = SessionManager::new(directory, transports, compiler, update_tx)
            .with_tokens(settings.auth.clone())
            .with_connect_timeout(settings.session.connect_timeout());
        let (event_tx, _) = broadcast::channel(BROADCAST_CAPACITY);

        Self {
            state: AppState::new().with_max_console_lines(settings.session.max_console_lines),
            manager: Arc::new(manager),
            update_rx,
            event_tx,
        }
    }

    pub fn manager(&self) -> &Arc<SessionManager<D, F, C>> {
        &self.manager
    }

    /// Subscribe to applied state updates.
    ///
    /// Slow subscribers lose the oldest updates (`RecvError::Lagged`).
    pub fn subscribe(&self) -> broadcast::Receiver<StateUpdate> {
        self.event_tx.subscribe()
    }

    /// Run `action` in its own task.
    ///
    /// The task only talks to the session manager; its updates reach
    /// [`Engine::state`] once they are pulled with [`Engine::next_update`] or
    /// [`Engine::drain_pending`].
    pub fn dispatch(&self, action: Action) -> JoinHandle<Result<ActionOutcome>> {
        let manager = Arc::clone(&self.manager);
        debug!("Dispatching {}", action.name());
        tokio::spawn(async move { execute(&manager, action).await })
    }

    /// Apply one update and rebroadcast it
    pub fn process_update(&mut self, update: StateUpdate) {
        handler::update(&mut self.state, &update);
        // No subscribers is fine.
        let _ = self.event_tx.send(update);
    }

    /// Wait for the next update, apply it and return it
    pub async fn next_update(&mut self) -> Option<StateUpdate> {
        let update = self.update_rx.recv().await?;
        self.process_update(update.clone());
        Some(update)
    }

    /// Apply and return the next queued update without waiting
    pub fn try_next_update(&mut self) -> Option<StateUpdate> {
        let update = self.update_rx.try_recv().ok()?;
        self.process_update(update.clone());
        Some(update)
    }

    /// Apply every update already queued. Returns how many were applied.
    pub fn drain_pending(&mut self) -> usize {
        let mut applied = 0;
        while self.try_next_update().is_some() {
            applied += 1;
        }
        applied
    }
}

async fn execute<D, F, C>(
    manager: &SessionManager<D, F, C>,
    action: Action,
) -> Result<ActionOutcome>
where
    D: DeviceDirectory + Sync + 'static,
    F: TransportFactory + 'static,
    C: Compiler + 'static,
{
    match action {
        Action::FetchDevices => {
            let devices = manager.refresh_devices().await?;
            Ok(ActionOutcome::FetchDevices { devices })
        }
        Action::Connect { device, workspace } => {
            let result = manager.connect(device, workspace).await?;
            Ok(ActionOutcome::Connect { result })
        }
        Action::Disconnect => Ok(ActionOutcome::Disconnect {
            had_session: manager.disconnect().await,
        }),
        Action::Run { workspace, program } => {
            let result = manager.run(workspace, program).await?;
            Ok(ActionOutcome::Run { result })
        }
    }
}
