//! Remote Exec Library
//!
//! Headless front end over the `rexec-*` crates: lists directory devices and
//! runs programs on them, reporting progress as JSON lines.

pub mod headless;

// Re-export main entry points
pub use headless::runner::{run_devices, run_program, RunRequest};
