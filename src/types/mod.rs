//! Public types for the agent session host
//!
//! This module contains all the shared types used across the crate.

mod config;
mod error;
mod event;
mod permission;

pub use config::{DEFAULT_CLI_COMMAND, DEFAULT_PROMPT_TIMEOUT_SECS, HostConfig};
pub use error::{AgentError, ErrorCode, Result, TerminalError};
pub use event::{AgentEvent, RawSessionEvent};
pub use permission::{PermissionDecision, PermissionRequest, PermissionResult};
