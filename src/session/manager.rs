//! Agent session orchestrator
//!
//! Owns the registry of active agent sessions. Each session is opened through
//! the shared client, subscribed through the event normalizer and wired to
//! the permission source. Creation is idempotent-recreate: an existing entry
//! for the id is fully torn down before the new session is opened.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::client::{ModelInfo, RawEventHandler, SessionConfig, SharedClient};
use crate::converter::normalize;
use crate::files::FileAccess;
use crate::permissions::{
    PermissionSource, PermissionSourceSlot, SessionScope, create_permission_handler,
};
use crate::registry::Registry;
use crate::types::{AgentError, AgentEvent, HostConfig, RawSessionEvent, Result};

use super::entry::{SessionEntry, SessionInfo};

/// Callback receiving every normalized event with its agent id
pub type AgentEventCallback = Arc<dyn Fn(&str, AgentEvent) + Send + Sync>;

/// Orchestrator for agent sessions keyed by caller-supplied agent id
pub struct AgentSessionManager {
    sessions: Registry<Arc<SessionEntry>>,
    client: Arc<SharedClient>,
    files: Arc<dyn FileAccess>,
    event_callback: Arc<RwLock<Option<AgentEventCallback>>>,
    permission_source: PermissionSourceSlot,
    next_generation: AtomicU64,
    default_model: Option<String>,
    prompt_timeout: Duration,
}

impl std::fmt::Debug for AgentSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSessionManager")
            .field("sessions", &self.sessions.len())
            .field("prompt_timeout", &self.prompt_timeout)
            .field("default_model", &self.default_model)
            .finish_non_exhaustive()
    }
}

impl AgentSessionManager {
    /// Create an orchestrator over the shared client
    pub fn new(client: Arc<SharedClient>, files: Arc<dyn FileAccess>, config: &HostConfig) -> Self {
        Self {
            sessions: Registry::new(),
            client,
            files,
            event_callback: Arc::new(RwLock::new(None)),
            permission_source: Arc::new(RwLock::new(None)),
            next_generation: AtomicU64::new(0),
            default_model: config.default_model.clone(),
            prompt_timeout: config.prompt_timeout(),
        }
    }

    /// Override the prompt timeout
    pub fn with_prompt_timeout(mut self, timeout: Duration) -> Self {
        self.prompt_timeout = timeout;
        self
    }

    /// Register the callback receiving normalized events
    pub fn on_event(&self, callback: impl Fn(&str, AgentEvent) + Send + Sync + 'static) {
        if let Ok(mut slot) = self.event_callback.write() {
            *slot = Some(Arc::new(callback));
        }
    }

    /// Register the source that decides permission requests
    ///
    /// Without one, every request is approved.
    pub fn on_permission_request(&self, source: Arc<dyn PermissionSource>) {
        if let Ok(mut slot) = self.permission_source.write() {
            *slot = Some(source);
        }
    }

    fn current_permission_source(&self) -> Option<Arc<dyn PermissionSource>> {
        self.permission_source
            .read()
            .ok()
            .and_then(|slot| slot.clone())
    }

    /// Open a session for `agent_id` in `cwd`, replacing any existing one
    #[tracing::instrument(name = "create_session", skip_all, fields(agent_id = %agent_id))]
    pub async fn create_session(
        &self,
        agent_id: &str,
        cwd: impl AsRef<Path>,
        model: Option<String>,
    ) -> Result<()> {
        let start = Instant::now();
        let cwd: PathBuf = cwd.as_ref().to_path_buf();

        self.destroy_session(agent_id).await;
        self.files.add_allowed_root(&cwd);

        let client = self.client.get().await?;
        let model = model.or_else(|| self.default_model.clone());
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let scope = SessionScope::new(agent_id, generation);
        let session = client
            .create_session(SessionConfig {
                model: model.clone(),
                working_directory: cwd.clone(),
                streaming: true,
                on_permission_request: create_permission_handler(
                    scope.clone(),
                    Arc::clone(&self.permission_source),
                ),
            })
            .await?;

        let subscription = session.subscribe(self.event_forwarder(agent_id));
        let upstream_id = session.session_id().to_string();
        let entry = Arc::new(SessionEntry::new(
            scope,
            cwd.clone(),
            model.clone(),
            session,
            subscription,
        ));

        if let Some(displaced) = self.sessions.set(agent_id, entry) {
            tracing::warn!("Concurrent create replaced an active session, releasing the old one");
            self.teardown(&displaced).await;
        }

        tracing::info!(
            cwd = %cwd.display(),
            model = ?model,
            upstream_session_id = %upstream_id,
            elapsed_ms = start.elapsed().as_millis(),
            "Agent session created"
        );
        Ok(())
    }

    fn event_forwarder(&self, agent_id: &str) -> RawEventHandler {
        let agent_id = agent_id.to_string();
        let callback = Arc::clone(&self.event_callback);
        Arc::new(move |raw: RawSessionEvent| {
            let Some(event) = normalize(&raw) else {
                tracing::trace!(agent_id = %agent_id, kind = %raw.kind, "Dropping unrecognized session event");
                return;
            };
            let callback = callback.read().ok().and_then(|slot| slot.clone());
            if let Some(callback) = callback {
                callback(&agent_id, event);
            }
        })
    }

    /// Send a prompt and wait for the final assistant message
    ///
    /// Fails with `SessionNotFound` when no session exists and with
    /// `PromptTimeout` when the turn outlasts the configured bound. A timeout
    /// leaves the session active.
    pub async fn send_prompt(&self, agent_id: &str, prompt: &str) -> Result<Option<String>> {
        let entry = self
            .sessions
            .get(agent_id)
            .ok_or_else(|| AgentError::session_not_found(agent_id))?;

        let start = Instant::now();
        tracing::debug!(agent_id = %agent_id, prompt_len = prompt.len(), "Sending prompt");

        match tokio::time::timeout(self.prompt_timeout, entry.session.send_and_wait(prompt)).await {
            Ok(Ok(last_message)) => {
                let content = last_message
                    .as_ref()
                    .and_then(|event| event.str_field("content"))
                    .map(str::to_string);
                tracing::info!(
                    agent_id = %agent_id,
                    elapsed_ms = start.elapsed().as_millis(),
                    has_content = content.is_some(),
                    "Prompt completed"
                );
                Ok(content)
            }
            Ok(Err(e)) => {
                tracing::warn!(agent_id = %agent_id, error = %e, "Prompt failed");
                Err(e)
            }
            Err(_) => {
                tracing::warn!(
                    agent_id = %agent_id,
                    timeout_secs = self.prompt_timeout.as_secs(),
                    "Prompt timed out"
                );
                Err(AgentError::PromptTimeout(self.prompt_timeout.as_secs()))
            }
        }
    }

    /// Request a cooperative abort of the in-flight turn
    ///
    /// Abort failures are logged and ignored; an absent id is a no-op.
    pub async fn stop_agent(&self, agent_id: &str) {
        let Some(entry) = self.sessions.get(agent_id) else {
            tracing::debug!(agent_id = %agent_id, "Stop requested for unknown agent");
            return;
        };
        match entry.session.abort().await {
            Ok(()) => tracing::info!(agent_id = %agent_id, "Agent abort requested"),
            Err(e) => tracing::debug!(agent_id = %agent_id, error = %e, "Abort failed (ignored)"),
        }
    }

    /// Tear down the session for `agent_id`, if any
    pub async fn destroy_session(&self, agent_id: &str) {
        if let Some(entry) = self.sessions.delete(agent_id) {
            self.teardown(&entry).await;
        }
    }

    /// Tear down every active session
    pub async fn destroy_all(&self) {
        let ids = self.sessions.ids();
        if !ids.is_empty() {
            tracing::info!(count = ids.len(), "Destroying all agent sessions");
        }
        for agent_id in ids {
            self.destroy_session(&agent_id).await;
        }
    }

    async fn teardown(&self, entry: &SessionEntry) {
        entry.unsubscribe();
        if let Err(e) = entry.session.destroy().await {
            tracing::warn!(
                agent_id = %entry.agent_id,
                error = %e,
                "Failed to release upstream session (ignored)"
            );
        }
        // Only this instance: a recreated session under the same id keeps its requests
        if let Some(source) = self.current_permission_source() {
            source.cancel_session(&entry.scope());
        }
        tracing::info!(
            agent_id = %entry.agent_id,
            uptime_secs = entry.uptime_secs(),
            "Agent session destroyed"
        );
    }

    /// Check if a session exists
    pub fn has_session(&self, agent_id: &str) -> bool {
        self.sessions.has(agent_id)
    }

    /// Get the number of active sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Summaries of every active session, ordered by agent id
    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> =
            self.sessions.values().iter().map(|e| e.info()).collect();
        sessions.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        sessions
    }

    /// Models offered by the agent provider
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        self.client.get().await?.list_models().await
    }

    /// Destroy every session and stop the shared client
    pub async fn shutdown(&self) {
        self.destroy_all().await;
        self.client.stop().await;
    }
}
