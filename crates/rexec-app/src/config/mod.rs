//! Configuration file parsing for Remote Exec
//!
//! Supports:
//! - `.rexec/config.toml` - Directory, auth and session settings
//! - `REXEC_ACCESS_TOKEN` / `REXEC_REFRESH_TOKEN` - Token overrides

pub mod settings;
pub mod types;

pub use settings::{
    apply_env_overrides, init_config_dir, load_settings, ACCESS_TOKEN_ENV, REFRESH_TOKEN_ENV,
};
pub use types::*;
