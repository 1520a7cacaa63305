//! Session event types
//!
//! [`RawSessionEvent`] is what an upstream session subscription delivers;
//! [`AgentEvent`] is the closed union the host forwards to the UI.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event as delivered by an upstream session subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSessionEvent {
    /// Upstream event kind, e.g. `assistant.message_delta`
    #[serde(rename = "type")]
    pub kind: String,

    /// Kind-specific payload
    #[serde(default)]
    pub data: Value,
}

impl RawSessionEvent {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// String field of the payload, if present
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

/// Normalized event forwarded on `session.event`
///
/// Serialized as `{"kind": "<kebab-case>", ...camelCase fields, "timestamp": ms}`.
/// The timestamp is the capture time on this host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AgentEvent {
    #[serde(rename_all = "camelCase")]
    ToolStart {
        tool_call_id: String,
        tool_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        arguments: Option<String>,
        timestamp: i64,
    },

    #[serde(rename_all = "camelCase")]
    ToolComplete {
        tool_call_id: String,
        tool_name: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        timestamp: i64,
    },

    #[serde(rename_all = "camelCase")]
    ToolProgress {
        tool_call_id: String,
        progress_message: String,
        timestamp: i64,
    },

    #[serde(rename_all = "camelCase")]
    ToolPartialResult {
        tool_call_id: String,
        partial_output: String,
        timestamp: i64,
    },

    #[serde(rename_all = "camelCase")]
    AssistantMessage {
        message_id: String,
        content: String,
        timestamp: i64,
    },

    #[serde(rename_all = "camelCase")]
    AssistantDelta {
        message_id: String,
        delta_content: String,
        timestamp: i64,
    },

    #[serde(rename_all = "camelCase")]
    Error {
        error_type: String,
        message: String,
        timestamp: i64,
    },

    SessionIdle { timestamp: i64 },

    #[serde(rename_all = "camelCase")]
    SubagentStarted {
        tool_call_id: String,
        agent_name: String,
        agent_display_name: String,
        timestamp: i64,
    },

    #[serde(rename_all = "camelCase")]
    SubagentCompleted {
        tool_call_id: String,
        agent_name: String,
        timestamp: i64,
    },

    #[serde(rename_all = "camelCase")]
    SubagentFailed {
        tool_call_id: String,
        agent_name: String,
        error: String,
        timestamp: i64,
    },
}

impl AgentEvent {
    /// Wire tag of this variant
    pub fn kind(&self) -> &'static str {
        match self {
            AgentEvent::ToolStart { .. } => "tool-start",
            AgentEvent::ToolComplete { .. } => "tool-complete",
            AgentEvent::ToolProgress { .. } => "tool-progress",
            AgentEvent::ToolPartialResult { .. } => "tool-partial-result",
            AgentEvent::AssistantMessage { .. } => "assistant-message",
            AgentEvent::AssistantDelta { .. } => "assistant-delta",
            AgentEvent::Error { .. } => "error",
            AgentEvent::SessionIdle { .. } => "session-idle",
            AgentEvent::SubagentStarted { .. } => "subagent-started",
            AgentEvent::SubagentCompleted { .. } => "subagent-completed",
            AgentEvent::SubagentFailed { .. } => "subagent-failed",
        }
    }

    /// Capture time in milliseconds since the Unix epoch
    pub fn timestamp(&self) -> i64 {
        match self {
            AgentEvent::ToolStart { timestamp, .. }
            | AgentEvent::ToolComplete { timestamp, .. }
            | AgentEvent::ToolProgress { timestamp, .. }
            | AgentEvent::ToolPartialResult { timestamp, .. }
            | AgentEvent::AssistantMessage { timestamp, .. }
            | AgentEvent::AssistantDelta { timestamp, .. }
            | AgentEvent::Error { timestamp, .. }
            | AgentEvent::SessionIdle { timestamp }
            | AgentEvent::SubagentStarted { timestamp, .. }
            | AgentEvent::SubagentCompleted { timestamp, .. }
            | AgentEvent::SubagentFailed { timestamp, .. } => *timestamp,
        }
    }
}
