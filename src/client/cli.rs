//! Agent CLI client
//!
//! Spawns the agent CLI in server mode and drives it over JSON-RPC on its
//! stdio. Server-initiated `session.event` notifications are routed to the
//! owning session's subscribers; `permission.request` calls are answered by
//! the session's permission handler.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::oneshot;

use super::rpc::{NotificationHandler, RequestHandler, RpcConnection};
use super::{
    AgentClient, AgentSession, ClientFactory, ModelInfo, PermissionHandler, RawEventHandler,
    SessionConfig, Subscription,
};
use crate::types::{
    AgentError, HostConfig, PermissionDecision, PermissionRequest, PermissionResult,
    RawSessionEvent, Result,
};

/// Grace period for each `session.destroy` issued while stopping
const STOP_DESTROY_TIMEOUT: Duration = Duration::from_secs(5);

/// Starts [`CliClient`]s from the host configuration
#[derive(Debug, Clone)]
pub struct CliClientFactory {
    config: HostConfig,
}

impl CliClientFactory {
    pub fn new(config: HostConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ClientFactory for CliClientFactory {
    async fn start(&self) -> Result<Arc<dyn AgentClient>> {
        Ok(Arc::new(CliClient::spawn(&self.config).await?))
    }
}

type SessionRoutes = Arc<DashMap<String, Arc<SessionChannels>>>;

/// Per-session subscribers and permission handler
struct SessionChannels {
    handlers: DashMap<u64, RawEventHandler>,
    next_handler: AtomicU64,
    on_permission: PermissionHandler,
}

impl SessionChannels {
    fn new(on_permission: PermissionHandler) -> Self {
        Self {
            handlers: DashMap::new(),
            next_handler: AtomicU64::new(0),
            on_permission,
        }
    }

    fn subscribe(self: &Arc<Self>, handler: RawEventHandler) -> Subscription {
        let id = self.next_handler.fetch_add(1, Ordering::SeqCst);
        self.handlers.insert(id, handler);
        let channels = Arc::clone(self);
        Subscription::new(move || {
            channels.handlers.remove(&id);
        })
    }

    fn emit(&self, event: &RawSessionEvent) {
        // Snapshot first so a handler may unsubscribe while being called
        let handlers: Vec<RawEventHandler> = self
            .handlers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for handler in handlers {
            handler(event.clone());
        }
    }
}

impl std::fmt::Debug for SessionChannels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionChannels")
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

/// Running agent CLI process
#[derive(Debug)]
pub struct CliClient {
    child: tokio::sync::Mutex<Option<Child>>,
    rpc: Arc<RpcConnection>,
    routes: SessionRoutes,
}

impl CliClient {
    /// Spawn the agent CLI and wait until it answers `ping`
    pub async fn spawn(config: &HostConfig) -> Result<Self> {
        let log_dir = config.resolved_log_dir();
        if let Err(e) = tokio::fs::create_dir_all(&log_dir).await {
            tracing::warn!(log_dir = %log_dir.display(), error = %e, "Failed to create agent CLI log dir");
        }

        let command = config.cli_command();
        let args = config.cli_arguments();
        tracing::info!(command = %command, args = ?args, "Spawning agent CLI");

        let mut child = Command::new(command)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AgentError::client_start_failed(format!("{command}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AgentError::client_start_failed("agent CLI stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::client_start_failed("agent CLI stdout unavailable"))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr));
        }

        let routes: SessionRoutes = Arc::new(DashMap::new());
        let rpc = RpcConnection::start(
            stdout,
            stdin,
            notification_handler(Arc::clone(&routes)),
            request_handler(Arc::clone(&routes)),
        );

        let client = Self {
            child: tokio::sync::Mutex::new(Some(child)),
            rpc,
            routes,
        };
        client
            .rpc
            .request("ping", json!({}))
            .await
            .map_err(|e| AgentError::client_start_failed(format!("agent CLI did not answer ping: {e}")))?;

        let pid = client.pid().await;
        tracing::info!(pid = ?pid, "Agent CLI ready");
        Ok(client)
    }

    async fn pid(&self) -> Option<u32> {
        self.child.lock().await.as_ref().and_then(Child::id)
    }
}

#[async_trait]
impl AgentClient for CliClient {
    async fn create_session(&self, config: SessionConfig) -> Result<Arc<dyn AgentSession>> {
        let params = json!({
            "model": config.model,
            "workingDirectory": config.working_directory,
            "streaming": config.streaming,
            "requestPermission": true,
        });
        let response = self.rpc.request("session.create", params).await?;
        let session_id = response
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| AgentError::upstream("session.create returned no sessionId"))?
            .to_string();

        let channels = Arc::new(SessionChannels::new(config.on_permission_request));
        self.routes.insert(session_id.clone(), Arc::clone(&channels));
        tracing::debug!(session_id = %session_id, "Upstream session created");

        Ok(Arc::new(CliSession {
            session_id,
            rpc: Arc::clone(&self.rpc),
            channels,
            routes: Arc::clone(&self.routes),
        }))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let response = self.rpc.request("models.list", json!({})).await?;
        let models = response.get("models").cloned().unwrap_or_else(|| json!([]));
        Ok(serde_json::from_value(models)?)
    }

    async fn stop(&self) -> Result<()> {
        let session_ids: Vec<String> = self.routes.iter().map(|r| r.key().clone()).collect();
        for session_id in session_ids {
            let destroy = self
                .rpc
                .request("session.destroy", json!({"sessionId": session_id}));
            match tokio::time::timeout(STOP_DESTROY_TIMEOUT, destroy).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::debug!(session_id = %session_id, error = %e, "session.destroy failed during stop"),
                Err(_) => tracing::debug!(session_id = %session_id, "session.destroy timed out during stop"),
            }
        }
        self.routes.clear();
        self.rpc.close();

        let child = self.child.lock().await.take();
        if let Some(mut child) = child {
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "Failed to kill agent CLI");
            }
        }
        Ok(())
    }
}

/// Session hosted by the agent CLI
#[derive(Debug)]
pub struct CliSession {
    session_id: String,
    rpc: Arc<RpcConnection>,
    channels: Arc<SessionChannels>,
    routes: SessionRoutes,
}

type TurnSlot = Arc<Mutex<Option<oneshot::Sender<Result<Option<RawSessionEvent>>>>>>;

fn finish_turn(slot: &TurnSlot, outcome: Result<Option<RawSessionEvent>>) {
    let sender = slot.lock().ok().and_then(|mut guard| guard.take());
    if let Some(sender) = sender {
        drop(sender.send(outcome));
    }
}

#[async_trait]
impl AgentSession for CliSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn subscribe(&self, handler: RawEventHandler) -> Subscription {
        self.channels.subscribe(handler)
    }

    async fn send_and_wait(&self, prompt: &str) -> Result<Option<RawSessionEvent>> {
        let (done_tx, done_rx) = oneshot::channel();
        let slot: TurnSlot = Arc::new(Mutex::new(Some(done_tx)));
        let last_message: Arc<Mutex<Option<RawSessionEvent>>> = Arc::new(Mutex::new(None));

        let _turn = self.channels.subscribe({
            let slot = Arc::clone(&slot);
            let last_message = Arc::clone(&last_message);
            Arc::new(move |event: RawSessionEvent| match event.kind.as_str() {
                "assistant.message" => {
                    if let Ok(mut last) = last_message.lock() {
                        *last = Some(event);
                    }
                }
                "session.idle" => {
                    let last = last_message.lock().ok().and_then(|mut last| last.take());
                    finish_turn(&slot, Ok(last));
                }
                "session.error" => {
                    let message = event.str_field("message").unwrap_or("session error");
                    finish_turn(&slot, Err(AgentError::upstream(message)));
                }
                _ => {}
            })
        });

        self.rpc
            .request(
                "session.send",
                json!({"sessionId": self.session_id, "prompt": prompt}),
            )
            .await?;

        tokio::select! {
            outcome = done_rx => outcome.unwrap_or(Err(AgentError::ClientClosed)),
            () = self.rpc.closed() => Err(AgentError::ClientClosed),
        }
    }

    async fn abort(&self) -> Result<()> {
        self.rpc
            .request("session.abort", json!({"sessionId": self.session_id}))
            .await?;
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        let outcome = self
            .rpc
            .request("session.destroy", json!({"sessionId": self.session_id}))
            .await;
        self.routes.remove(&self.session_id);
        self.channels.handlers.clear();
        outcome.map(|_| ())
    }
}

fn notification_handler(routes: SessionRoutes) -> NotificationHandler {
    Arc::new(move |method: String, params: Value| {
        if method != "session.event" {
            tracing::trace!(method = %method, "Ignoring agent CLI notification");
            return;
        }
        let Some(session_id) = params.get("sessionId").and_then(Value::as_str) else {
            tracing::warn!("session.event without sessionId");
            return;
        };
        let event = match params
            .get("event")
            .cloned()
            .map(serde_json::from_value::<RawSessionEvent>)
        {
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                tracing::warn!(session_id = %session_id, error = %e, "Malformed session.event");
                return;
            }
            None => {
                tracing::warn!(session_id = %session_id, "session.event without event");
                return;
            }
        };

        let channels = routes.get(session_id).map(|entry| Arc::clone(entry.value()));
        match channels {
            Some(channels) => channels.emit(&event),
            None => tracing::trace!(
                session_id = %session_id,
                kind = %event.kind,
                "Event for unknown session"
            ),
        }
    })
}

fn request_handler(routes: SessionRoutes) -> RequestHandler {
    Arc::new(move |method: String, params: Value| -> BoxFuture<'static, Result<Value>> {
        let routes = Arc::clone(&routes);
        Box::pin(async move {
            if method != "permission.request" {
                return Err(AgentError::unknown_channel(method));
            }
            let session_id = params
                .get("sessionId")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let request: PermissionRequest = serde_json::from_value(
                params.get("permissionRequest").cloned().unwrap_or(Value::Null),
            )?;

            let channels = routes.get(&session_id).map(|entry| Arc::clone(entry.value()));
            let decision = match channels {
                Some(channels) => (channels.on_permission)(request).await,
                None => {
                    tracing::warn!(session_id = %session_id, "Permission request for unknown session");
                    PermissionDecision::Denied
                }
            };
            Ok(json!({"result": PermissionResult::from(decision)}))
        })
    })
}

async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(target: "agent_cli", "{}", line);
    }
}
