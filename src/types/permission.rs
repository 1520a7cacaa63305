//! Permission request and decision types

use serde::{Deserialize, Serialize};

/// Approval request raised from inside an agent session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    /// Tool call the request belongs to, when the upstream provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Kind of access requested (`shell`, `write`, `read`, `url`, `mcp`, ...)
    pub kind: String,
}

impl PermissionRequest {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            tool_call_id: None,
            kind: kind.into(),
        }
    }

    pub fn with_tool_call_id(mut self, tool_call_id: impl Into<String>) -> Self {
        self.tool_call_id = Some(tool_call_id.into());
        self
    }
}

/// Outcome of a permission request
///
/// Serialized in kebab-case: `approved`, `denied`,
/// `denied-interactively-by-user`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionDecision {
    /// Allowed
    Approved,
    /// Denied without asking anyone (request cancelled, session gone)
    Denied,
    /// A human answered no
    DeniedInteractivelyByUser,
}

impl PermissionDecision {
    /// Map a decision string sent by the UI
    ///
    /// Only `approved` approves; anything else is a human denial.
    pub fn from_ui(decision: &str) -> Self {
        if decision == "approved" {
            PermissionDecision::Approved
        } else {
            PermissionDecision::DeniedInteractivelyByUser
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PermissionDecision::Approved => "approved",
            PermissionDecision::Denied => "denied",
            PermissionDecision::DeniedInteractivelyByUser => "denied-interactively-by-user",
        }
    }

    pub fn is_approved(self) -> bool {
        matches!(self, PermissionDecision::Approved)
    }
}

/// Result object handed back to the upstream session: `{"kind": "<decision>"}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionResult {
    pub kind: PermissionDecision,
}

impl From<PermissionDecision> for PermissionResult {
    fn from(kind: PermissionDecision) -> Self {
        Self { kind }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decision_wire_names() {
        for decision in [
            PermissionDecision::Approved,
            PermissionDecision::Denied,
            PermissionDecision::DeniedInteractivelyByUser,
        ] {
            assert_eq!(serde_json::to_value(decision).unwrap(), json!(decision.as_str()));
        }
    }

    #[test]
    fn test_from_ui() {
        assert_eq!(PermissionDecision::from_ui("approved"), PermissionDecision::Approved);
        assert_eq!(
            PermissionDecision::from_ui("denied"),
            PermissionDecision::DeniedInteractivelyByUser
        );
        assert_eq!(
            PermissionDecision::from_ui(""),
            PermissionDecision::DeniedInteractivelyByUser
        );
    }

    #[test]
    fn test_result_shape() {
        let result = PermissionResult::from(PermissionDecision::Approved);
        assert_eq!(serde_json::to_value(result).unwrap(), json!({"kind": "approved"}));
    }

    #[test]
    fn test_request_without_tool_call_id() {
        let request: PermissionRequest = serde_json::from_value(json!({"kind": "shell"})).unwrap();
        assert_eq!(request, PermissionRequest::new("shell"));
        assert_eq!(serde_json::to_value(&request).unwrap(), json!({"kind": "shell"}));
    }
}
