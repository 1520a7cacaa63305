//! Upstream session event to [`AgentEvent`] conversion
//!
//! The mapping is a finite table of `upstream kind -> projection`. Kinds that
//! are not in the table (administrative or internal upstream chatter) map to
//! `None` and never reach the UI. Adding an upstream kind is one table row.

use serde_json::Value;

use crate::types::{AgentEvent, RawSessionEvent};

type Projection = fn(&Value, i64) -> AgentEvent;

const PROJECTIONS: &[(&str, Projection)] = &[
    ("tool.execution_start", tool_start),
    ("tool.execution_complete", tool_complete),
    ("tool.execution_progress", tool_progress),
    ("tool.execution_partial_result", tool_partial_result),
    ("assistant.message", assistant_message),
    ("assistant.message_delta", assistant_delta),
    ("session.error", session_error),
    ("session.idle", session_idle),
    ("subagent.started", subagent_started),
    ("subagent.completed", subagent_completed),
    ("subagent.failed", subagent_failed),
];

/// Normalize a raw event, stamping it with the current time
pub fn normalize(raw: &RawSessionEvent) -> Option<AgentEvent> {
    normalize_at(raw, now_millis())
}

/// Normalize a raw event with an explicit capture timestamp
pub fn normalize_at(raw: &RawSessionEvent, timestamp: i64) -> Option<AgentEvent> {
    projection_for(&raw.kind).map(|project| project(&raw.data, timestamp))
}

/// Check whether an upstream kind is part of the UI contract
pub fn is_recognized(kind: &str) -> bool {
    projection_for(kind).is_some()
}

/// Milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn projection_for(kind: &str) -> Option<Projection> {
    PROJECTIONS
        .iter()
        .find(|(name, _)| *name == kind)
        .map(|(_, project)| *project)
}

// Missing string fields project to "" so a sparse upstream event still
// produces a well-formed variant.
fn text(data: &Value, key: &str) -> String {
    opt_text(data, key).unwrap_or_default()
}

fn opt_text(data: &Value, key: &str) -> Option<String> {
    data.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Tool arguments as a string; structured arguments are JSON-encoded
fn arguments(data: &Value) -> Option<String> {
    match data.get("arguments") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

/// Error text that may arrive as a plain string or as `{message}`
fn error_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("message").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn tool_start(data: &Value, timestamp: i64) -> AgentEvent {
    AgentEvent::ToolStart {
        tool_call_id: text(data, "toolCallId"),
        tool_name: text(data, "toolName"),
        arguments: arguments(data),
        timestamp,
    }
}

fn tool_complete(data: &Value, timestamp: i64) -> AgentEvent {
    AgentEvent::ToolComplete {
        tool_call_id: text(data, "toolCallId"),
        tool_name: opt_text(data, "toolName").unwrap_or_else(|| "unknown".to_string()),
        success: data.get("success").and_then(Value::as_bool).unwrap_or(false),
        result: data
            .get("result")
            .and_then(|r| r.get("content"))
            .and_then(Value::as_str)
            .map(str::to_string),
        error: error_text(data.get("error")),
        timestamp,
    }
}

fn tool_progress(data: &Value, timestamp: i64) -> AgentEvent {
    AgentEvent::ToolProgress {
        tool_call_id: text(data, "toolCallId"),
        progress_message: text(data, "progressMessage"),
        timestamp,
    }
}

fn tool_partial_result(data: &Value, timestamp: i64) -> AgentEvent {
    AgentEvent::ToolPartialResult {
        tool_call_id: text(data, "toolCallId"),
        partial_output: text(data, "partialOutput"),
        timestamp,
    }
}

fn assistant_message(data: &Value, timestamp: i64) -> AgentEvent {
    AgentEvent::AssistantMessage {
        message_id: text(data, "messageId"),
        content: text(data, "content"),
        timestamp,
    }
}

fn assistant_delta(data: &Value, timestamp: i64) -> AgentEvent {
    AgentEvent::AssistantDelta {
        message_id: text(data, "messageId"),
        delta_content: text(data, "deltaContent"),
        timestamp,
    }
}

fn session_error(data: &Value, timestamp: i64) -> AgentEvent {
    AgentEvent::Error {
        error_type: text(data, "errorType"),
        message: text(data, "message"),
        timestamp,
    }
}

fn session_idle(_data: &Value, timestamp: i64) -> AgentEvent {
    AgentEvent::SessionIdle { timestamp }
}

fn subagent_started(data: &Value, timestamp: i64) -> AgentEvent {
    AgentEvent::SubagentStarted {
        tool_call_id: text(data, "toolCallId"),
        agent_name: text(data, "agentName"),
        agent_display_name: text(data, "agentDisplayName"),
        timestamp,
    }
}

fn subagent_completed(data: &Value, timestamp: i64) -> AgentEvent {
    AgentEvent::SubagentCompleted {
        tool_call_id: text(data, "toolCallId"),
        agent_name: text(data, "agentName"),
        timestamp,
    }
}

fn subagent_failed(data: &Value, timestamp: i64) -> AgentEvent {
    AgentEvent::SubagentFailed {
        tool_call_id: text(data, "toolCallId"),
        agent_name: text(data, "agentName"),
        error: error_text(data.get("error")).unwrap_or_default(),
        timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const T: i64 = 1_717_000_000_000;

    fn raw(kind: &str, data: Value) -> RawSessionEvent {
        RawSessionEvent::new(kind, data)
    }

    #[test]
    fn test_assistant_delta() {
        let event = normalize_at(
            &raw(
                "assistant.message_delta",
                json!({"messageId": "m1", "deltaContent": "hi"}),
            ),
            T,
        );
        assert_eq!(
            event,
            Some(AgentEvent::AssistantDelta {
                message_id: "m1".to_string(),
                delta_content: "hi".to_string(),
                timestamp: T,
            })
        );
    }

    #[test]
    fn test_unknown_kinds_are_dropped() {
        for kind in ["session.usage_info", "assistant.turn_start", "", "tool.execution"] {
            assert!(normalize_at(&raw(kind, json!({})), T).is_none(), "{kind}");
            assert!(!is_recognized(kind));
        }
    }

    #[test]
    fn test_tool_complete_without_start() {
        let event = normalize_at(
            &raw(
                "tool.execution_complete",
                json!({
                    "toolCallId": "tc9",
                    "success": false,
                    "error": {"message": "exit code 2"}
                }),
            ),
            T,
        );
        assert_eq!(
            event,
            Some(AgentEvent::ToolComplete {
                tool_call_id: "tc9".to_string(),
                tool_name: "unknown".to_string(),
                success: false,
                result: None,
                error: Some("exit code 2".to_string()),
                timestamp: T,
            })
        );
    }

    #[test]
    fn test_tool_complete_result_content() {
        let event = normalize_at(
            &raw(
                "tool.execution_complete",
                json!({
                    "toolCallId": "tc1",
                    "toolName": "bash",
                    "success": true,
                    "result": {"content": "ok\n"}
                }),
            ),
            T,
        )
        .unwrap();
        let AgentEvent::ToolComplete {
            tool_name, result, ..
        } = event
        else {
            panic!("expected tool-complete, got {event:?}");
        };
        assert_eq!(tool_name, "bash");
        assert_eq!(result.as_deref(), Some("ok\n"));
    }

    #[test]
    fn test_tool_start_arguments() {
        let structured = normalize_at(
            &raw(
                "tool.execution_start",
                json!({"toolCallId": "tc1", "toolName": "view", "arguments": {"path": "a.rs"}}),
            ),
            T,
        );
        let Some(AgentEvent::ToolStart { arguments, .. }) = structured else {
            panic!("expected tool-start");
        };
        assert_eq!(arguments.as_deref(), Some(r#"{"path":"a.rs"}"#));

        let plain = normalize_at(
            &raw(
                "tool.execution_start",
                json!({"toolCallId": "tc2", "toolName": "bash", "arguments": "ls"}),
            ),
            T,
        );
        let Some(AgentEvent::ToolStart { arguments, .. }) = plain else {
            panic!("expected tool-start");
        };
        assert_eq!(arguments.as_deref(), Some("ls"));

        let none = normalize_at(
            &raw("tool.execution_start", json!({"toolCallId": "tc3", "toolName": "x"})),
            T,
        );
        let Some(AgentEvent::ToolStart { arguments, .. }) = none else {
            panic!("expected tool-start");
        };
        assert!(arguments.is_none());
    }

    #[test]
    fn test_assistant_message_defaults_content() {
        let event = normalize_at(&raw("assistant.message", json!({"messageId": "m2"})), T);
        assert_eq!(
            event,
            Some(AgentEvent::AssistantMessage {
                message_id: "m2".to_string(),
                content: String::new(),
                timestamp: T,
            })
        );
    }

    #[test]
    fn test_session_events() {
        assert_eq!(
            normalize_at(&raw("session.idle", Value::Null), T),
            Some(AgentEvent::SessionIdle { timestamp: T })
        );
        assert_eq!(
            normalize_at(
                &raw(
                    "session.error",
                    json!({"errorType": "rate_limit", "message": "slow down"})
                ),
                T
            ),
            Some(AgentEvent::Error {
                error_type: "rate_limit".to_string(),
                message: "slow down".to_string(),
                timestamp: T,
            })
        );
    }

    #[test]
    fn test_subagent_lifecycle() {
        let started = normalize_at(
            &raw(
                "subagent.started",
                json!({"toolCallId": "tc4", "agentName": "reviewer", "agentDisplayName": "Code Reviewer"}),
            ),
            T,
        );
        assert_eq!(started.as_ref().map(AgentEvent::kind), Some("subagent-started"));

        let failed = normalize_at(
            &raw(
                "subagent.failed",
                json!({"toolCallId": "tc4", "agentName": "reviewer", "error": "crashed"}),
            ),
            T,
        );
        assert_eq!(
            failed,
            Some(AgentEvent::SubagentFailed {
                tool_call_id: "tc4".to_string(),
                agent_name: "reviewer".to_string(),
                error: "crashed".to_string(),
                timestamp: T,
            })
        );
    }

    #[test]
    fn test_every_table_row_produces_its_variant() {
        let expected = [
            ("tool.execution_start", "tool-start"),
            ("tool.execution_complete", "tool-complete"),
            ("tool.execution_progress", "tool-progress"),
            ("tool.execution_partial_result", "tool-partial-result"),
            ("assistant.message", "assistant-message"),
            ("assistant.message_delta", "assistant-delta"),
            ("session.error", "error"),
            ("session.idle", "session-idle"),
            ("subagent.started", "subagent-started"),
            ("subagent.completed", "subagent-completed"),
            ("subagent.failed", "subagent-failed"),
        ];
        assert_eq!(PROJECTIONS.len(), expected.len());
        for (upstream, kind) in expected {
            let event = normalize_at(&raw(upstream, json!({})), T).unwrap();
            assert_eq!(event.kind(), kind);
            assert_eq!(event.timestamp(), T);
        }
    }

    #[test]
    fn test_normalize_stamps_capture_time() {
        let before = now_millis();
        let event = normalize(&raw("session.idle", json!({}))).unwrap();
        assert!(event.timestamp() >= before);
    }
}
