//! rexec-app - Session orchestration and application state for Remote Exec
//!
//! Implements the TEA (The Elm Architecture) pattern: actions are executed by
//! the [`SessionManager`], which publishes [`StateUpdate`]s; the reducer in
//! [`handler`] folds them into [`AppState`]; the [`Engine`] ties the pieces
//! together and rebroadcasts updates to subscribers.

pub mod compiler;
pub mod config;
pub mod engine;
pub mod handler;
pub mod message;
pub mod session;
pub mod session_manager;
pub mod state;

// Re-export primary types
pub use compiler::{CompiledProgram, Compiler, SourceTextCompiler};
pub use engine::{ActionOutcome, Engine};
pub use message::{Action, StateUpdate};
pub use session::{Connection, ConnectionStatus, DeviceSession, SessionSummary};
pub use session_manager::{ConnectOutcome, RunOutcome, SessionManager};
pub use state::{AppState, WorkspaceState};
