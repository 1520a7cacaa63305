//! Upstream agent client
//!
//! The host talks to the agent capability provider through these traits.
//! [`cli::CliClientFactory`] is the default implementation, which drives the
//! agent CLI over JSON-RPC on its stdio. [`SharedClient`] keeps one started
//! client per process.

pub mod cli;
mod rpc;
mod shared;
mod subscription;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::types::{PermissionDecision, PermissionRequest, RawSessionEvent, Result};

pub use rpc::{RpcCodec, RpcConnection};
pub use shared::SharedClient;
pub use subscription::Subscription;

/// Callback receiving every raw event of a session
pub type RawEventHandler = Arc<dyn Fn(RawSessionEvent) + Send + Sync>;

/// Callback answering permission requests raised inside a session
pub type PermissionHandler =
    Arc<dyn Fn(PermissionRequest) -> BoxFuture<'static, PermissionDecision> + Send + Sync>;

/// Options for opening a session
#[derive(Clone)]
pub struct SessionConfig {
    pub model: Option<String>,
    pub working_directory: PathBuf,
    pub streaming: bool,
    pub on_permission_request: PermissionHandler,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("model", &self.model)
            .field("working_directory", &self.working_directory)
            .field("streaming", &self.streaming)
            .field("on_permission_request", &"<handler>")
            .finish()
    }
}

/// Model offered by the agent provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// A started upstream client
#[async_trait]
pub trait AgentClient: Send + Sync + std::fmt::Debug {
    /// Open a new session
    async fn create_session(&self, config: SessionConfig) -> Result<Arc<dyn AgentSession>>;

    /// Models the provider offers
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;

    /// Shut the client down
    async fn stop(&self) -> Result<()>;
}

/// An open upstream session
#[async_trait]
pub trait AgentSession: Send + Sync + std::fmt::Debug {
    /// Upstream session id
    fn session_id(&self) -> &str;

    /// Register an event handler; dropping the returned guard unsubscribes
    fn subscribe(&self, handler: RawEventHandler) -> Subscription;

    /// Send a prompt and wait until the session goes idle
    ///
    /// Returns the final `assistant.message` event of the turn, if any.
    async fn send_and_wait(&self, prompt: &str) -> Result<Option<RawSessionEvent>>;

    /// Abort the in-flight turn
    async fn abort(&self) -> Result<()>;

    /// Release the session upstream
    async fn destroy(&self) -> Result<()>;
}

/// Starts upstream clients
#[async_trait]
pub trait ClientFactory: Send + Sync + std::fmt::Debug {
    async fn start(&self) -> Result<Arc<dyn AgentClient>>;
}

#[cfg(test)]
pub(crate) mod testing;
