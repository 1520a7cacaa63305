//! Messages exchanged with the UI process
//!
//! One JSON object per line, tagged by `type`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::AgentError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum IpcMessage {
    /// UI to host request
    Invoke {
        id: u64,
        channel: String,
        #[serde(default)]
        args: Vec<Value>,
    },
    /// Successful reply to an invoke
    Reply {
        id: u64,
        #[serde(default)]
        result: Value,
    },
    /// Failed reply to an invoke
    Error { id: u64, error: IpcError },
    /// Host to UI fire-and-forget event
    Event {
        channel: String,
        #[serde(default)]
        args: Vec<Value>,
    },
}

impl IpcMessage {
    /// Reply message for the outcome of invoke `id`
    pub fn reply(id: u64, outcome: &Result<Value, AgentError>) -> Self {
        match outcome {
            Ok(result) => IpcMessage::Reply {
                id,
                result: result.clone(),
            },
            Err(e) => IpcMessage::Error {
                id,
                error: IpcError::from(e),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpcError {
    pub code: i32,
    pub message: String,
}

impl From<&AgentError> for IpcError {
    fn from(e: &AgentError) -> Self {
        Self {
            code: e.error_code().code(),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_invoke_parses_without_args() {
        let msg: IpcMessage =
            serde_json::from_str(r#"{"type":"invoke","id":3,"channel":"terminal.list"}"#).unwrap();
        assert_eq!(
            msg,
            IpcMessage::Invoke {
                id: 3,
                channel: "terminal.list".to_string(),
                args: vec![],
            }
        );
    }

    #[test]
    fn test_error_reply_shape() {
        let msg = IpcMessage::reply(7, &Err(AgentError::session_not_found("a1")));
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "type": "error",
                "id": 7,
                "error": {"code": -32001, "message": "Session not found: a1"}
            })
        );
    }

    #[test]
    fn test_event_shape() {
        let msg = IpcMessage::Event {
            channel: "terminal.exit".to_string(),
            args: vec![json!("t1"), json!(0)],
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "event", "channel": "terminal.exit", "args": ["t1", 0]})
        );
    }
}
