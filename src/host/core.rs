//! Host composition root
//!
//! The SessionHost owns every long-lived service of the process and hands
//! them to the IPC router by `Arc`.

use std::sync::Arc;

use crate::client::{ClientFactory, SharedClient, cli::CliClientFactory};
use crate::files::AllowedRoots;
use crate::ipc::{IpcRouter, IpcSender, setup_agent_session_ipc};
use crate::permissions::PermissionCorrelator;
use crate::session::AgentSessionManager;
use crate::terminal::{NativePtySpawner, PtySpawner, TerminalManager};
use crate::types::HostConfig;

/// Agent session host
///
/// Holds the shared agent client, the session orchestrator, the terminal
/// manager and the permission correlator.
#[derive(Debug)]
pub struct SessionHost {
    config: HostConfig,
    client: Arc<SharedClient>,
    files: Arc<AllowedRoots>,
    sessions: Arc<AgentSessionManager>,
    terminals: Arc<TerminalManager>,
    permissions: Arc<PermissionCorrelator>,
}

impl SessionHost {
    /// Create a host that spawns the agent CLI and native terminals
    pub fn new(config: HostConfig, sender: Arc<dyn IpcSender>) -> Self {
        let factory = Arc::new(CliClientFactory::new(config.clone()));
        Self::with_backends(config, sender, factory, Arc::new(NativePtySpawner))
    }

    /// Create with custom client and terminal backends
    pub fn with_backends(
        config: HostConfig,
        sender: Arc<dyn IpcSender>,
        factory: Arc<dyn ClientFactory>,
        spawner: Arc<dyn PtySpawner>,
    ) -> Self {
        let client = Arc::new(SharedClient::new(factory));
        let files = Arc::new(AllowedRoots::new());
        let sessions = Arc::new(AgentSessionManager::new(
            Arc::clone(&client),
            files.clone(),
            &config,
        ));
        let permissions = Arc::new(PermissionCorrelator::new(Arc::clone(&sender)));
        setup_agent_session_ipc(&sessions, Arc::clone(&permissions), Arc::clone(&sender));
        let terminals = Arc::new(TerminalManager::new(spawner, sender));

        Self {
            config,
            client,
            files,
            sessions,
            terminals,
            permissions,
        }
    }

    /// Router for inbound invokes
    pub fn router(&self) -> IpcRouter {
        IpcRouter::new(
            Arc::clone(&self.sessions),
            Arc::clone(&self.terminals),
            Arc::clone(&self.permissions),
        )
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<AgentSessionManager> {
        &self.sessions
    }

    pub fn terminals(&self) -> &Arc<TerminalManager> {
        &self.terminals
    }

    pub fn permissions(&self) -> &Arc<PermissionCorrelator> {
        &self.permissions
    }

    pub fn files(&self) -> &Arc<AllowedRoots> {
        &self.files
    }

    /// Release everything the host owns
    ///
    /// Destroys all sessions, kills all terminals and stops the shared client.
    /// Never fails; secondary errors are logged.
    pub async fn shutdown(&self) {
        let start = std::time::Instant::now();
        let sessions = self.sessions.session_count();
        let terminals = self.terminals.terminal_count();
        let client_started = self.client.is_started().await;

        self.terminals.kill_all();
        self.sessions.shutdown().await;

        tracing::info!(
            sessions = sessions,
            terminals = terminals,
            client_started = client_started,
            elapsed_ms = start.elapsed().as_millis(),
            "Host shut down"
        );
    }

    /// Get host name for logging
    pub fn name(&self) -> &'static str {
        "agent-session-host"
    }

    /// Get host version
    pub fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}
