//! Permission handling for agent sessions
//!
//! Every session gets a [`PermissionHandler`] built by
//! [`create_permission_handler`]. The handler asks the registered
//! [`PermissionSource`] (normally the [`PermissionCorrelator`]) and
//! auto-approves when none is registered, which is what headless use needs.

mod correlator;

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::debug;

use crate::client::PermissionHandler;
use crate::types::{PermissionDecision, PermissionRequest};

pub use correlator::{CorrelationKey, PermissionCorrelator, Registration};

/// One session instance of an agent
///
/// The UI reuses an agent id when it recreates a session, so the generation
/// tells consecutive instances apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionScope {
    pub agent_id: String,
    pub generation: u64,
}

impl SessionScope {
    pub fn new(agent_id: impl Into<String>, generation: u64) -> Self {
        Self {
            agent_id: agent_id.into(),
            generation,
        }
    }
}

/// Something that can decide permission requests for an agent
#[async_trait]
pub trait PermissionSource: Send + Sync + std::fmt::Debug {
    async fn request(&self, scope: &SessionScope, request: PermissionRequest) -> PermissionDecision;

    /// Drop every outstanding request raised by this session instance
    fn cancel_session(&self, _scope: &SessionScope) {}
}

/// Late-bound permission source shared by all sessions of an orchestrator
pub type PermissionSourceSlot = Arc<RwLock<Option<Arc<dyn PermissionSource>>>>;

/// Create the permission handler passed to an upstream session
///
/// The source is looked up when a request arrives, so a source registered
/// after the session was opened still applies.
pub fn create_permission_handler(scope: SessionScope, slot: PermissionSourceSlot) -> PermissionHandler {
    let scope = Arc::new(scope);
    Arc::new(move |request: PermissionRequest| -> BoxFuture<'static, PermissionDecision> {
        let source = slot.read().ok().and_then(|guard| guard.clone());
        let scope = Arc::clone(&scope);

        Box::pin(async move {
            match source {
                Some(source) => source.request(&scope, request).await,
                None => {
                    debug!(
                        agent_id = %scope.agent_id,
                        kind = %request.kind,
                        "No permission source registered, auto-approving"
                    );
                    PermissionDecision::Approved
                }
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::channels::PERMISSION_REQUEST;
    use crate::ipc::testing::RecordingSender;

    #[tokio::test]
    async fn test_auto_approve_without_source() {
        let slot: PermissionSourceSlot = Arc::new(RwLock::new(None));
        let handler = create_permission_handler(SessionScope::new("a1", 0), slot);

        let decision = handler(PermissionRequest::new("shell").with_tool_call_id("tc1")).await;
        assert_eq!(decision, PermissionDecision::Approved);
    }

    #[tokio::test]
    async fn test_source_registered_after_handler_creation() {
        let slot: PermissionSourceSlot = Arc::new(RwLock::new(None));
        let handler = create_permission_handler(SessionScope::new("a1", 0), Arc::clone(&slot));

        let sender = Arc::new(RecordingSender::new());
        let correlator = Arc::new(PermissionCorrelator::new(sender.clone()));
        *slot.write().unwrap() = Some(correlator.clone());

        let pending = tokio::spawn(handler(PermissionRequest::new("write").with_tool_call_id("tc1")));
        sender.wait_for(PERMISSION_REQUEST, 1).await;
        assert!(correlator.resolve("a1", "tc1", PermissionDecision::DeniedInteractivelyByUser));

        assert_eq!(
            pending.await.unwrap(),
            PermissionDecision::DeniedInteractivelyByUser
        );
    }
}
