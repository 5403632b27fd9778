//! # rexec-core - Core Domain Types
//!
//! Foundation crate for Remote Exec. Provides domain types, error handling,
//! transport event definitions and logging setup.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, chrono, thiserror, tracing).
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`Device`] - A remote device as listed by the device directory
//! - [`WebSocketEndpointInformation`] - One-time connection parameters for a device
//! - [`AuthTokens`] - Access/refresh token pair for directory calls
//! - [`WorkspaceLocation`] - Which playground workspace a session is bound to
//!
//! ### Evaluation (`eval`)
//! - [`EvalContext`] - Per-workspace evaluation context with accumulated errors
//! - [`EvalError`], [`SourceLocation`] - Structured evaluation failures
//!
//! ### Events (`events`)
//! - [`TransportEvent`] - Typed events emitted by a device transport
//! - [`DisplayKind`] - Subtype of a device `display` message
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with `fatal` vs `recoverable` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context

pub mod error;
pub mod eval;
pub mod events;
pub mod logging;
pub mod types;

/// Prelude for common imports used throughout all Remote Exec crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use error::{Error, Result, ResultExt};
pub use eval::{EvalContext, EvalError, SourceLocation, SourcePosition};
pub use events::{DisplayKind, TransportEvent};
pub use types::{AuthTokens, Device, WebSocketEndpointInformation, WorkspaceLocation};
