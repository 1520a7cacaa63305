//! Error tracing extensions
//!
//! Errors that reach the IPC boundary are logged once, with their code,
//! classification and source chain.

use crate::types::AgentError;
use std::error::Error as StdError;

/// Extension trait for adding tracing context to errors
pub trait ErrorTraceExt {
    /// Log the error once with its code, classification and cause chain
    ///
    /// Caller mistakes (unknown session, bad arguments) are logged at WARN,
    /// everything else at ERROR.
    fn trace_error(&self) -> &Self;
}

impl ErrorTraceExt for AgentError {
    fn trace_error(&self) -> &Self {
        let code = self.error_code();
        let chain = source_chain(self);

        if self.is_client_error() {
            tracing::warn!(
                error = %self,
                error_code = code.code(),
                error_code_name = ?code,
                "Request rejected"
            );
        } else {
            tracing::error!(
                error = %self,
                error_code = code.code(),
                error_code_name = ?code,
                is_retryable = self.is_retryable(),
                error_chain_len = chain.len(),
                error_chain = ?chain,
                "Request failed"
            );
        }
        self
    }
}

/// Messages of every underlying cause, outermost first
fn source_chain(error: &dyn StdError) -> Vec<String> {
    let mut chain = Vec::new();
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push(cause.to_string());
        source = cause.source();
    }
    chain
}

/// Extension trait for Result types
pub trait ResultTraceExt<T, E>: Sized {
    /// Convert error to AgentError and log with context
    fn trace_context(self) -> Result<T, AgentError>
    where
        E: StdError + Send + Sync + 'static;
}

impl<T, E> ResultTraceExt<T, E> for Result<T, E>
where
    E: StdError + Send + Sync + 'static,
    AgentError: From<E>,
{
    fn trace_context(self) -> Result<T, AgentError> {
        self.map_err(|e| {
            let agent_error = AgentError::from(e);
            agent_error.trace_error();
            agent_error
        })
    }
}
