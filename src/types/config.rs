//! Host configuration from environment variables

use std::path::PathBuf;
use std::time::Duration;

/// Agent CLI launched when nothing else is configured
pub const DEFAULT_CLI_COMMAND: &str = "copilot";

/// Upper bound on a single prompt round trip
pub const DEFAULT_PROMPT_TIMEOUT_SECS: u64 = 300;

/// Host configuration loaded from environment variables
///
/// Command-line flags override these values, see [`crate::cli::Cli`].
#[derive(Debug, Clone, Default)]
pub struct HostConfig {
    /// Agent CLI executable
    /// Environment variable: `AGENT_HOST_CLI_PATH`
    pub cli_path: Option<String>,

    /// Extra arguments appended to the agent CLI command line
    /// Environment variable: `AGENT_HOST_CLI_ARGS` (whitespace separated)
    pub cli_args: Vec<String>,

    /// Directory the agent CLI writes its own logs to
    /// Environment variable: `AGENT_HOST_LOG_DIR`
    pub log_dir: Option<PathBuf>,

    /// Model used when `session.create` does not name one
    /// Environment variable: `AGENT_HOST_MODEL`
    pub default_model: Option<String>,

    /// Prompt timeout in seconds
    /// Environment variable: `AGENT_HOST_PROMPT_TIMEOUT_SECS`
    pub prompt_timeout_secs: Option<u64>,
}

impl HostConfig {
    /// Create a new empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let cli_args = get("AGENT_HOST_CLI_ARGS")
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        let prompt_timeout_secs = get("AGENT_HOST_PROMPT_TIMEOUT_SECS").and_then(|s| {
            s.trim().parse::<u64>().ok().filter(|secs| *secs > 0).or_else(|| {
                tracing::warn!(value = %s, "Ignoring invalid AGENT_HOST_PROMPT_TIMEOUT_SECS");
                None
            })
        });

        Self {
            cli_path: get("AGENT_HOST_CLI_PATH"),
            cli_args,
            log_dir: get("AGENT_HOST_LOG_DIR").map(PathBuf::from),
            default_model: get("AGENT_HOST_MODEL"),
            prompt_timeout_secs,
        }
    }

    /// Check if any configuration is set
    pub fn is_configured(&self) -> bool {
        self.cli_path.is_some()
            || !self.cli_args.is_empty()
            || self.log_dir.is_some()
            || self.default_model.is_some()
            || self.prompt_timeout_secs.is_some()
    }

    /// Agent CLI executable to spawn
    pub fn cli_command(&self) -> &str {
        self.cli_path.as_deref().unwrap_or(DEFAULT_CLI_COMMAND)
    }

    /// Log directory handed to the agent CLI
    ///
    /// Defaults to `~/.copilot/logs`, falling back to the temp dir when no
    /// home directory is known.
    pub fn resolved_log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(".copilot")
                .join("logs")
        })
    }

    /// Full argument list for the agent CLI in server mode
    pub fn cli_arguments(&self) -> Vec<String> {
        let mut args = vec![
            "--server".to_string(),
            "--stdio".to_string(),
            "--log-level".to_string(),
            "all".to_string(),
            "--log-dir".to_string(),
            self.resolved_log_dir().display().to_string(),
        ];
        args.extend(self.cli_args.iter().cloned());
        args
    }

    /// Bound applied to `session.send`
    pub fn prompt_timeout(&self) -> Duration {
        Duration::from_secs(
            self.prompt_timeout_secs
                .unwrap_or(DEFAULT_PROMPT_TIMEOUT_SECS),
        )
    }
}
