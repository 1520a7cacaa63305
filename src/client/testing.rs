//! In-memory client doubles for tests

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::json;

use super::{
    AgentClient, AgentSession, ClientFactory, ModelInfo, RawEventHandler, SessionConfig,
    Subscription,
};
use crate::types::{
    AgentError, PermissionDecision, PermissionRequest, RawSessionEvent, Result,
};

#[derive(Debug)]
pub struct FakeClientFactory {
    pub client: Arc<FakeClient>,
    pub starts: AtomicUsize,
    pub fail_next_start: AtomicBool,
}

impl FakeClientFactory {
    pub fn new() -> Self {
        Self {
            client: Arc::new(FakeClient::default()),
            starts: AtomicUsize::new(0),
            fail_next_start: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ClientFactory for FakeClientFactory {
    async fn start(&self) -> Result<Arc<dyn AgentClient>> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        if self.fail_next_start.swap(false, Ordering::SeqCst) {
            return Err(AgentError::client_start_failed("copilot not found"));
        }
        Ok(self.client.clone())
    }
}

#[derive(Debug, Default)]
pub struct FakeClient {
    pub stops: AtomicUsize,
    pub sessions: Mutex<Vec<Arc<FakeSession>>>,
    pub fail_create: AtomicBool,
}

impl FakeClient {
    pub fn created(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn session(&self, index: usize) -> Arc<FakeSession> {
        self.sessions.lock().unwrap()[index].clone()
    }

    pub fn last_session(&self) -> Arc<FakeSession> {
        self.sessions.lock().unwrap().last().cloned().expect("no session created")
    }
}

#[async_trait]
impl AgentClient for FakeClient {
    async fn create_session(&self, config: SessionConfig) -> Result<Arc<dyn AgentSession>> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(AgentError::upstream("session.create rejected"));
        }
        let mut sessions = self.sessions.lock().unwrap();
        let session = Arc::new(FakeSession::new(format!("up-{}", sessions.len()), config));
        sessions.push(session.clone());
        Ok(session)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        Ok(vec![ModelInfo {
            id: "gpt-5".to_string(),
            name: "GPT-5".to_string(),
        }])
    }

    async fn stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeSession {
    pub id: String,
    pub config: SessionConfig,
    handlers: Arc<DashMap<u64, RawEventHandler>>,
    next_handler: AtomicU64,
    pub destroys: AtomicUsize,
    pub aborts: AtomicUsize,
    pub fail_destroy: AtomicBool,
    pub fail_abort: AtomicBool,
    pub reply: Mutex<Option<String>>,
    pub send_delay: Mutex<Option<Duration>>,
    pub destroy_delay: Mutex<Option<Duration>>,
    pub prompts: Mutex<Vec<String>>,
}

impl std::fmt::Debug for FakeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeSession")
            .field("id", &self.id)
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

impl FakeSession {
    fn new(id: String, config: SessionConfig) -> Self {
        Self {
            id,
            config,
            handlers: Arc::new(DashMap::new()),
            next_handler: AtomicU64::new(0),
            destroys: AtomicUsize::new(0),
            aborts: AtomicUsize::new(0),
            fail_destroy: AtomicBool::new(false),
            fail_abort: AtomicBool::new(false),
            reply: Mutex::new(None),
            send_delay: Mutex::new(None),
            destroy_delay: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn emit(&self, event: RawSessionEvent) {
        let handlers: Vec<RawEventHandler> =
            self.handlers.iter().map(|h| h.value().clone()).collect();
        for handler in handlers {
            handler(event.clone());
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub async fn request_permission(&self, request: PermissionRequest) -> PermissionDecision {
        (self.config.on_permission_request)(request).await
    }
}

#[async_trait]
impl AgentSession for FakeSession {
    fn session_id(&self) -> &str {
        &self.id
    }

    fn subscribe(&self, handler: RawEventHandler) -> Subscription {
        let id = self.next_handler.fetch_add(1, Ordering::SeqCst);
        self.handlers.insert(id, handler);
        let handlers = Arc::clone(&self.handlers);
        Subscription::new(move || {
            handlers.remove(&id);
        })
    }

    async fn send_and_wait(&self, prompt: &str) -> Result<Option<RawSessionEvent>> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let delay = *self.send_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.reply.lock().unwrap().clone();
        Ok(reply.map(|content| {
            RawSessionEvent::new(
                "assistant.message",
                json!({"messageId": "m-final", "content": content}),
            )
        }))
    }

    async fn abort(&self) -> Result<()> {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        if self.fail_abort.load(Ordering::SeqCst) {
            return Err(AgentError::upstream("nothing to abort"));
        }
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        self.destroys.fetch_add(1, Ordering::SeqCst);
        let delay = *self.destroy_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_destroy.load(Ordering::SeqCst) {
            return Err(AgentError::ClientClosed);
        }
        Ok(())
    }
}
