//! Inbound invoke dispatch

use std::sync::Arc;

use serde_json::{Value, json};

use super::channels::*;
use crate::permissions::PermissionCorrelator;
use crate::session::AgentSessionManager;
use crate::terminal::TerminalManager;
use crate::types::{AgentError, PermissionDecision, Result};

/// Routes invokes from the UI to the host services
#[derive(Debug, Clone)]
pub struct IpcRouter {
    sessions: Arc<AgentSessionManager>,
    terminals: Arc<TerminalManager>,
    permissions: Arc<PermissionCorrelator>,
}

impl IpcRouter {
    pub fn new(
        sessions: Arc<AgentSessionManager>,
        terminals: Arc<TerminalManager>,
        permissions: Arc<PermissionCorrelator>,
    ) -> Self {
        Self {
            sessions,
            terminals,
            permissions,
        }
    }

    /// Handle one invoke and produce its reply value
    pub async fn dispatch(&self, channel: &str, args: Vec<Value>) -> Result<Value> {
        let args = Args { channel, values: args };
        match channel {
            SESSION_CREATE => {
                let model = args.opt_str(2)?.map(str::to_string);
                self.sessions
                    .create_session(args.str(0)?, args.str(1)?, model)
                    .await?;
                Ok(Value::Null)
            }
            SESSION_SEND => {
                let reply = self
                    .sessions
                    .send_prompt(args.str(0)?, args.str(1)?)
                    .await?;
                Ok(json!(reply))
            }
            SESSION_STOP => {
                self.sessions.stop_agent(args.str(0)?).await;
                Ok(Value::Null)
            }
            SESSION_DESTROY => {
                self.sessions.destroy_session(args.str(0)?).await;
                Ok(Value::Null)
            }
            SESSION_HAS => Ok(json!(self.sessions.has_session(args.str(0)?))),
            SESSION_LIST => Ok(serde_json::to_value(self.sessions.list_sessions())?),
            PERMISSION_RESPOND => {
                let decision = PermissionDecision::from_ui(args.str(2)?);
                let resolved = self
                    .permissions
                    .resolve(args.str(0)?, args.str(1)?, decision);
                Ok(json!({ "resolved": resolved }))
            }
            MODELS_LIST => Ok(serde_json::to_value(self.sessions.list_models().await?)?),
            TERMINAL_CREATE => {
                let created = self
                    .terminals
                    .create(args.str(0)?, args.str(1)?, args.opt_str(2)?.map(str::to_string))
                    .await?;
                Ok(serde_json::to_value(created)?)
            }
            TERMINAL_WRITE => {
                self.terminals.write(args.str(0)?, args.str(1)?);
                Ok(Value::Null)
            }
            TERMINAL_RESIZE => {
                self.terminals
                    .resize(args.str(0)?, args.u16(1)?, args.u16(2)?);
                Ok(Value::Null)
            }
            TERMINAL_KILL => {
                self.terminals.kill(args.str(0)?);
                Ok(Value::Null)
            }
            TERMINAL_LIST => Ok(json!(self.terminals.ids())),
            other => Err(AgentError::unknown_channel(other)),
        }
    }
}

/// Positional invoke arguments
struct Args<'a> {
    channel: &'a str,
    values: Vec<Value>,
}

impl Args<'_> {
    fn invalid(&self, index: usize, expected: &str) -> AgentError {
        AgentError::invalid_params(format!(
            "{}: argument {index} must be {expected}",
            self.channel
        ))
    }

    fn str(&self, index: usize) -> Result<&str> {
        self.values
            .get(index)
            .and_then(Value::as_str)
            .ok_or_else(|| self.invalid(index, "a string"))
    }

    fn opt_str(&self, index: usize) -> Result<Option<&str>> {
        match self.values.get(index) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(_) => Err(self.invalid(index, "a string or null")),
        }
    }

    fn u16(&self, index: usize) -> Result<u16> {
        self.values
            .get(index)
            .and_then(Value::as_u64)
            .and_then(|n| u16::try_from(n).ok())
            .ok_or_else(|| self.invalid(index, "an integer between 0 and 65535"))
    }
}
