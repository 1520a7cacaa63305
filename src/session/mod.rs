//! Agent session management
//!
//! This module handles:
//! - Session lifecycle (create, send, stop, destroy)
//! - Event forwarding through the normalizer
//! - Permission wiring per session

mod entry;
mod manager;

pub use entry::{SessionEntry, SessionInfo};
pub use manager::{AgentEventCallback, AgentSessionManager};
