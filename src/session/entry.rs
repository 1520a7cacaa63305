//! Registry entry for an active agent session

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::client::{AgentSession, Subscription};
use crate::permissions::SessionScope;

/// Active agent session owned by the orchestrator
#[derive(Debug)]
pub struct SessionEntry {
    pub agent_id: String,
    pub cwd: PathBuf,
    pub model: Option<String>,
    pub session: Arc<dyn AgentSession>,
    generation: u64,
    subscription: Subscription,
    created_at: Instant,
}

impl SessionEntry {
    pub fn new(
        scope: SessionScope,
        cwd: PathBuf,
        model: Option<String>,
        session: Arc<dyn AgentSession>,
        subscription: Subscription,
    ) -> Self {
        Self {
            agent_id: scope.agent_id,
            cwd,
            model,
            session,
            generation: scope.generation,
            subscription,
            created_at: Instant::now(),
        }
    }

    /// Stop forwarding events of this session
    pub fn unsubscribe(&self) {
        self.subscription.unsubscribe();
    }

    /// Which instance of the agent id this entry is
    pub fn scope(&self) -> SessionScope {
        SessionScope::new(self.agent_id.as_str(), self.generation)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.created_at.elapsed().as_secs()
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            agent_id: self.agent_id.clone(),
            cwd: self.cwd.clone(),
            model: self.model.clone(),
        }
    }
}

/// Public summary returned by `session.list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub agent_id: String,
    pub cwd: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}
