//! Agent Session Host
//!
//! A host process that runs AI coding agent sessions and terminal shells on
//! behalf of a UI, talking to it over a JSON IPC boundary.
//!
//! ## Features
//!
//! - One agent session per caller-supplied agent id, recreated idempotently
//! - Vendor session events normalized into a closed [`AgentEvent`] set
//! - Tool permission requests correlated with UI decisions
//! - Pseudo-terminal shells with output streaming and worktree detection
//! - A single lazily started agent CLI shared by all sessions
//!
//! ## Quick Start
//!
//! ```no_run
//! use agent_session_host::{Cli, run_host_with_cli};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     run_host_with_cli(&Cli::default(), CancellationToken::new()).await
//! }
//! ```
//!
//! ## IPC
//!
//! The UI writes one JSON message per line to stdin and reads replies and
//! events from stdout:
//!
//! ```json
//! {"type":"invoke","id":1,"channel":"session.create","args":["agent-1","/path/to/repo"]}
//! {"type":"reply","id":1,"result":null}
//! {"type":"event","channel":"session.event","args":["agent-1",{"kind":"session-idle","timestamp":1700000000000}]}
//! ```
//!
//! ## Environment Variables
//!
//! - `AGENT_HOST_CLI_PATH`: Agent CLI executable (default: `copilot`)
//! - `AGENT_HOST_CLI_ARGS`: Extra agent CLI arguments, whitespace separated
//! - `AGENT_HOST_LOG_DIR`: Log directory handed to the agent CLI (default: `~/.copilot/logs`)
//! - `AGENT_HOST_MODEL`: Model used when `session.create` names none
//! - `AGENT_HOST_PROMPT_TIMEOUT_SECS`: Upper bound for one prompt (default: 300)
//!
//! Command-line flags `--agent-cli` and `--prompt-timeout` override the
//! matching variables.

pub mod cli;
pub mod client;
pub mod converter;
pub mod files;
pub mod host;
pub mod ipc;
pub mod permissions;
pub mod registry;
pub mod session;
pub mod terminal;
pub mod tracing;
pub mod types;

pub use cli::Cli;
pub use host::{SessionHost, run_host, run_host_with_cli, shutdown_otel};
pub use ipc::{IpcMessage, IpcRouter, IpcSender};
pub use permissions::PermissionCorrelator;
pub use session::AgentSessionManager;
pub use terminal::TerminalManager;
pub use types::{AgentError, AgentEvent, HostConfig, Result};
