//! Command-line interface definitions
//!
//! Provides CLI argument parsing using clap for the agent session host.

use std::path::PathBuf;

use clap::Parser;

use crate::types::HostConfig;

/// Agent session host - run coding agents and terminals for a UI over stdio
#[derive(Parser, Debug, Clone)]
#[command(name = "agent-session-host")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Write logs to a file in the temp directory instead of stderr
    #[arg(short, long)]
    pub diagnostic: bool,

    /// Directory for the diagnostic log file (implies --diagnostic)
    #[arg(short = 'l', long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Name of the diagnostic log file (implies --diagnostic)
    #[arg(short = 'f', long, value_name = "FILE")]
    pub log_file: Option<String>,

    /// More log output: -v for debug, -vv for trace (RUST_LOG wins when set)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log errors only (RUST_LOG wins when set)
    #[arg(short, long)]
    pub quiet: bool,

    /// OTLP collector for span export, e.g. http://localhost:4317
    /// (accepted but ignored in builds without the `otel` feature)
    #[arg(long, value_name = "URL", env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otel_endpoint: Option<String>,

    /// Service name reported with exported spans
    #[arg(long, value_name = "NAME", default_value = "agent-session-host")]
    pub otel_service_name: String,

    /// Agent CLI executable (defaults to `copilot` on PATH)
    #[arg(long, value_name = "PATH", env = "AGENT_HOST_CLI_PATH")]
    pub agent_cli: Option<String>,

    /// Upper bound for a single prompt in seconds
    #[arg(long, value_name = "SECS", env = "AGENT_HOST_PROMPT_TIMEOUT_SECS")]
    pub prompt_timeout: Option<u64>,
}

#[allow(clippy::derivable_impls)]
impl Default for Cli {
    fn default() -> Self {
        Self {
            diagnostic: false,
            log_dir: None,
            log_file: None,
            verbose: 0,
            quiet: false,
            otel_endpoint: None,
            otel_service_name: "agent-session-host".to_string(),
            agent_cli: None,
            prompt_timeout: None,
        }
    }
}

impl Cli {
    /// Logging goes to a file when any of the file options is given
    pub fn is_diagnostic(&self) -> bool {
        self.diagnostic || self.log_dir.is_some() || self.log_file.is_some()
    }

    #[cfg(feature = "otel")]
    pub fn is_otel_enabled(&self) -> bool {
        self.otel_endpoint.is_some()
    }

    #[cfg(not(feature = "otel"))]
    pub fn is_otel_enabled(&self) -> bool {
        if self.otel_endpoint.is_some() {
            tracing::warn!("--otel-endpoint specified but otel feature is not enabled, ignoring");
        }
        false
    }

    /// Level used when RUST_LOG is unset; `--quiet` beats `-v`
    pub fn log_level(&self) -> tracing::Level {
        match (self.quiet, self.verbose) {
            (true, _) => tracing::Level::ERROR,
            (false, 0) => tracing::Level::INFO,
            (false, 1) => tracing::Level::DEBUG,
            (false, _) => tracing::Level::TRACE,
        }
    }

    /// Diagnostic log file, `<temp>/agent-session-host-<timestamp>.log` by default
    pub fn log_path(&self) -> PathBuf {
        let dir = self.log_dir.clone().unwrap_or_else(std::env::temp_dir);

        let filename = self.log_file.clone().unwrap_or_else(|| {
            let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            format!("agent-session-host-{timestamp}.log")
        });

        dir.join(filename)
    }

    /// Overlay command-line values on a configuration
    pub fn apply_to(&self, config: &mut HostConfig) {
        if let Some(agent_cli) = &self.agent_cli {
            config.cli_path = Some(agent_cli.clone());
        }
        if let Some(secs) = self.prompt_timeout.filter(|secs| *secs > 0) {
            config.prompt_timeout_secs = Some(secs);
        }
    }

    /// Host configuration from the environment with CLI overrides applied
    pub fn host_config(&self) -> HostConfig {
        let mut config = HostConfig::from_env();
        self.apply_to(&mut config);
        config
    }
}
