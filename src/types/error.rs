//! Error types for the agent session host

use thiserror::Error;

/// IPC error codes
///
/// Standard JSON-RPC error codes and host-specific codes. These are the
/// `code` values carried by IPC error replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Standard JSON-RPC errors (-32xxx)
    /// Parse error: Invalid JSON
    ParseError = -32700,
    /// Invalid request: Not a valid request object
    InvalidRequest = -32600,
    /// Method (channel) not found
    MethodNotFound = -32601,
    /// Invalid params
    InvalidParams = -32602,
    /// Internal error
    InternalError = -32603,

    // Host-specific errors (-32000 to -32099)
    /// Agent session not found
    SessionNotFound = -32001,
    /// Prompt did not finish in time
    Timeout = -32002,
    /// Shared client could not be started or is gone
    ClientUnavailable = -32003,
    /// Upstream agent reported a failure
    UpstreamFailed = -32004,
    /// Terminal backend failed
    TerminalFailed = -32009,
}

impl ErrorCode {
    /// Get the error code value
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Errors raised by the pseudo-terminal backend
#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("Failed to open pseudo-terminal: {0}")]
    OpenFailed(String),

    #[error("Failed to spawn shell '{shell}': {message}")]
    SpawnFailed { shell: String, message: String },

    #[error("Failed to write to terminal: {0}")]
    WriteFailed(String),

    #[error("Failed to resize terminal: {0}")]
    ResizeFailed(String),

    #[error("Failed to kill terminal process: {0}")]
    KillFailed(String),
}

/// Main error type for the host
#[derive(Debug, Error)]
pub enum AgentError {
    // === Session errors ===
    /// No active session for the agent id
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Prompt exceeded the configured upper bound
    #[error("Prompt timed out after {0}s")]
    PromptTimeout(u64),

    // === Upstream client errors ===
    /// Shared client failed to start
    #[error("Failed to start agent client: {0}")]
    ClientStartFailed(String),

    /// Connection to the agent client was closed
    #[error("Agent client connection closed")]
    ClientClosed,

    /// JSON-RPC error returned by the agent client
    #[error("Agent client error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Failure reported by the upstream session itself
    #[error("Upstream error: {0}")]
    Upstream(String),

    // === Terminal errors ===
    #[error(transparent)]
    Terminal(#[from] TerminalError),

    // === Boundary errors ===
    /// Unknown IPC channel
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    /// Malformed IPC arguments
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    // === Wrapped errors ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for the host
pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// Get the IPC error code for this error
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AgentError::SessionNotFound(_) => ErrorCode::SessionNotFound,
            AgentError::PromptTimeout(_) => ErrorCode::Timeout,
            AgentError::ClientStartFailed(_) | AgentError::ClientClosed => {
                ErrorCode::ClientUnavailable
            }
            AgentError::Rpc { .. } | AgentError::Upstream(_) => ErrorCode::UpstreamFailed,
            AgentError::Terminal(_) => ErrorCode::TerminalFailed,
            AgentError::UnknownChannel(_) => ErrorCode::MethodNotFound,
            AgentError::InvalidParams(_) => ErrorCode::InvalidParams,
            AgentError::Json(_) => ErrorCode::ParseError,
            AgentError::Io(_) | AgentError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Whether the same request may succeed if sent again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::ClientStartFailed(_)
                | AgentError::ClientClosed
                | AgentError::PromptTimeout(_)
                | AgentError::Upstream(_)
        )
    }

    /// Whether the UI caused the error (unknown id, channel or arguments)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AgentError::SessionNotFound(_)
                | AgentError::UnknownChannel(_)
                | AgentError::InvalidParams(_)
        )
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AgentError::Internal(msg.into())
    }

    pub fn session_not_found(agent_id: impl Into<String>) -> Self {
        AgentError::SessionNotFound(agent_id.into())
    }

    pub fn client_start_failed(msg: impl Into<String>) -> Self {
        AgentError::ClientStartFailed(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        AgentError::Upstream(msg.into())
    }

    pub fn invalid_params(msg: impl Into<String>) -> Self {
        AgentError::InvalidParams(msg.into())
    }

    pub fn unknown_channel(channel: impl Into<String>) -> Self {
        AgentError::UnknownChannel(channel.into())
    }
}
