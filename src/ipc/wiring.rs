//! Connects the session orchestrator to the IPC boundary

use std::sync::Arc;

use serde_json::json;

use super::IpcSender;
use super::channels::SESSION_EVENT;
use crate::permissions::PermissionCorrelator;
use crate::session::AgentSessionManager;

/// Forward normalized events as `session.event` and route permission
/// requests through the correlator
pub fn setup_agent_session_ipc(
    sessions: &AgentSessionManager,
    permissions: Arc<PermissionCorrelator>,
    sender: Arc<dyn IpcSender>,
) {
    sessions.on_event(move |agent_id, event| match serde_json::to_value(&event) {
        Ok(payload) => sender.send(SESSION_EVENT, vec![json!(agent_id), payload]),
        Err(e) => tracing::warn!(agent_id = %agent_id, error = %e, "Failed to encode agent event"),
    });
    sessions.on_permission_request(permissions);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SharedClient;
    use crate::client::testing::FakeClientFactory;
    use crate::files::AllowedRoots;
    use crate::ipc::channels::PERMISSION_REQUEST;
    use crate::ipc::testing::RecordingSender;
    use crate::types::{HostConfig, PermissionDecision, PermissionRequest, RawSessionEvent};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_wiring_forwards_events_and_permissions() {
        let factory = Arc::new(FakeClientFactory::new());
        let sessions = AgentSessionManager::new(
            Arc::new(SharedClient::new(factory.clone())),
            Arc::new(AllowedRoots::new()),
            &HostConfig::default(),
        );
        let sender = Arc::new(RecordingSender::new());
        let permissions = Arc::new(PermissionCorrelator::new(sender.clone()));
        setup_agent_session_ipc(&sessions, permissions.clone(), sender.clone());

        sessions.create_session("a1", "/proj", None).await.unwrap();
        let session = factory.client.last_session();
        session.emit(RawSessionEvent::new(
            "tool.execution_start",
            json!({"toolCallId": "tc1", "toolName": "bash", "arguments": {"command": "ls"}}),
        ));

        let events = sender.on_channel(SESSION_EVENT);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0][0], json!("a1"));
        assert_eq!(events[0][1]["kind"], json!("tool-start"));
        assert_eq!(events[0][1]["toolName"], json!("bash"));
        assert_eq!(events[0][1]["arguments"], json!("{\"command\":\"ls\"}"));

        let waiter = tokio::spawn(async move {
            session
                .request_permission(PermissionRequest::new("shell").with_tool_call_id("tc1"))
                .await
        });
        let requests = sender.wait_for(PERMISSION_REQUEST, 1).await;
        assert_eq!(
            requests[0],
            vec![json!("a1"), json!({"toolCallId": "tc1", "kind": "shell"})]
        );
        assert!(permissions.resolve("a1", "tc1", PermissionDecision::Approved));
        assert_eq!(waiter.await.unwrap(), PermissionDecision::Approved);
    }
}
