//! Correlation of permission requests with UI decisions
//!
//! A request raised inside a session is parked under
//! `(agent_id, tool_call_id)` with a one-shot responder, announced on
//! `session.permission.request`, and settled when the UI answers on
//! `session.permission.respond`. The table entry is removed atomically by
//! whichever settles it first (a decision, a cancellation or the waiter going
//! away), so a request is settled exactly once and a late or duplicate
//! decision finds nothing to settle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::json;
use tokio::sync::oneshot;

use super::{PermissionSource, SessionScope};
use crate::converter::now_millis;
use crate::ipc::IpcSender;
use crate::ipc::channels::PERMISSION_REQUEST;
use crate::types::{PermissionDecision, PermissionRequest};

/// Key of an outstanding permission request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationKey {
    pub agent_id: String,
    pub tool_call_id: String,
}

impl CorrelationKey {
    pub fn new(agent_id: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            tool_call_id: tool_call_id.into(),
        }
    }
}

#[derive(Debug)]
struct PendingPermission {
    kind: String,
    generation: u64,
    seq: u64,
    requested_at: Instant,
    responder: oneshot::Sender<PermissionDecision>,
}

/// A parked request: its key and the receiving end of its responder
#[derive(Debug)]
pub struct Registration {
    pub key: CorrelationKey,
    pub receiver: oneshot::Receiver<PermissionDecision>,
    seq: u64,
}

/// Permission correlation table
#[derive(Debug)]
pub struct PermissionCorrelator {
    pending: DashMap<CorrelationKey, PendingPermission>,
    next_seq: AtomicU64,
    sender: Arc<dyn IpcSender>,
}

impl PermissionCorrelator {
    pub fn new(sender: Arc<dyn IpcSender>) -> Self {
        Self {
            pending: DashMap::new(),
            next_seq: AtomicU64::new(0),
            sender,
        }
    }

    /// Ask the UI and wait for its decision
    ///
    /// Resolves to `denied` if the request is cancelled before a decision
    /// arrives. There is no timeout.
    pub async fn request(&self, scope: &SessionScope, request: PermissionRequest) -> PermissionDecision {
        let Registration { key, receiver, seq } =
            self.register(scope, &request.kind, request.tool_call_id);
        let mut guard = PendingGuard {
            correlator: self,
            key: Some(key.clone()),
            seq,
        };

        tracing::info!(
            agent_id = %key.agent_id,
            generation = scope.generation,
            tool_call_id = %key.tool_call_id,
            kind = %request.kind,
            "Requesting permission from UI"
        );
        self.sender.send(
            PERMISSION_REQUEST,
            vec![
                json!(key.agent_id),
                json!({"toolCallId": key.tool_call_id, "kind": request.kind}),
            ],
        );

        let decision = receiver.await.unwrap_or(PermissionDecision::Denied);
        guard.disarm();
        decision
    }

    /// Register a one-shot responder for a session instance
    ///
    /// Without a tool call id the capture time in milliseconds is used,
    /// bumped until it is unique among outstanding requests of the agent.
    pub fn register(
        &self,
        scope: &SessionScope,
        kind: &str,
        tool_call_id: Option<String>,
    ) -> Registration {
        let (responder, receiver) = oneshot::channel();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let pending = PendingPermission {
            kind: kind.to_string(),
            generation: scope.generation,
            seq,
            requested_at: Instant::now(),
            responder,
        };

        if let Some(tool_call_id) = tool_call_id {
            let key = CorrelationKey::new(scope.agent_id.as_str(), tool_call_id);
            if let Some(replaced) = self.pending.insert(key.clone(), pending) {
                // Dropping the old responder settles the old waiter as denied
                tracing::warn!(
                    agent_id = %key.agent_id,
                    tool_call_id = %key.tool_call_id,
                    kind = %replaced.kind,
                    "Duplicate permission request replaced an outstanding one"
                );
            }
            return Registration { key, receiver, seq };
        }

        let mut stamp = now_millis();
        loop {
            let key = CorrelationKey::new(scope.agent_id.as_str(), stamp.to_string());
            match self.pending.entry(key.clone()) {
                Entry::Vacant(vacant) => {
                    vacant.insert(pending);
                    return Registration { key, receiver, seq };
                }
                Entry::Occupied(_) => stamp += 1,
            }
        }
    }

    /// Settle an outstanding request with a decision from the UI
    ///
    /// Returns `false` if nothing was pending under the key (already
    /// settled, cancelled, or never requested); the decision is dropped.
    pub fn resolve(&self, agent_id: &str, tool_call_id: &str, decision: PermissionDecision) -> bool {
        let key = CorrelationKey::new(agent_id, tool_call_id);
        let Some((_, pending)) = self.pending.remove(&key) else {
            tracing::debug!(
                agent_id = %agent_id,
                tool_call_id = %tool_call_id,
                decision = %decision.as_str(),
                "Dropping permission decision with no pending request"
            );
            return false;
        };

        tracing::info!(
            agent_id = %agent_id,
            tool_call_id = %tool_call_id,
            kind = %pending.kind,
            decision = %decision.as_str(),
            waited_ms = pending.requested_at.elapsed().as_millis(),
            "Permission request resolved"
        );
        if pending.responder.send(decision).is_err() {
            tracing::debug!(
                agent_id = %agent_id,
                tool_call_id = %tool_call_id,
                "Permission waiter went away before the decision arrived"
            );
        }
        true
    }

    /// Cancel every outstanding request raised by one session instance
    ///
    /// Requests of a newer session under the same agent id are left alone.
    /// Cancelled waiters resolve to `denied`. Returns how many were cancelled.
    pub fn cancel_session(&self, scope: &SessionScope) -> usize {
        let owned = |key: &CorrelationKey, pending: &PendingPermission| {
            key.agent_id == scope.agent_id && pending.generation == scope.generation
        };
        let keys: Vec<CorrelationKey> = self
            .pending
            .iter()
            .filter(|entry| owned(entry.key(), entry.value()))
            .map(|entry| entry.key().clone())
            .collect();

        // Re-checked on removal: the key may have been taken over meanwhile
        let cancelled = keys
            .iter()
            .filter(|key| self.pending.remove_if(*key, |k, p| owned(k, p)).is_some())
            .count();
        if cancelled > 0 {
            tracing::info!(
                agent_id = %scope.agent_id,
                generation = scope.generation,
                cancelled = cancelled,
                "Cancelled outstanding permission requests"
            );
        }
        cancelled
    }

    /// Check whether a request is outstanding
    pub fn is_pending(&self, agent_id: &str, tool_call_id: &str) -> bool {
        self.pending
            .contains_key(&CorrelationKey::new(agent_id, tool_call_id))
    }

    /// Number of outstanding requests
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl PermissionSource for PermissionCorrelator {
    async fn request(&self, scope: &SessionScope, request: PermissionRequest) -> PermissionDecision {
        PermissionCorrelator::request(self, scope, request).await
    }

    fn cancel_session(&self, scope: &SessionScope) {
        PermissionCorrelator::cancel_session(self, scope);
    }
}

/// Removes its own registration if the waiting future is dropped early
struct PendingGuard<'a> {
    correlator: &'a PermissionCorrelator,
    key: Option<CorrelationKey>,
    seq: u64,
}

impl PendingGuard<'_> {
    fn disarm(&mut self) {
        self.key = None;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };
        let seq = self.seq;
        if self
            .correlator
            .pending
            .remove_if(&key, |_, pending| pending.seq == seq)
            .is_some()
        {
            tracing::debug!(
                agent_id = %key.agent_id,
                tool_call_id = %key.tool_call_id,
                "Permission request abandoned by its waiter"
            );
        }
    }
}
