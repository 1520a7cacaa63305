//! Agent session host
//!
//! This module provides the process-level host that:
//! - Composes the session orchestrator, terminal manager and permission correlator
//! - Serves the IPC boundary over stdio
//! - Releases every session and terminal on shutdown

mod core;
mod runner;

pub use core::SessionHost;
pub use runner::{run_host, run_host_with_cli, shutdown_otel};
