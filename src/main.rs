//! Agent session host binary
//!
//! Run with: cargo run
//!
//! For help: cargo run -- --help

use agent_session_host::{cli::Cli, run_host_with_cli, shutdown_otel};
use clap::Parser;
use std::io::IsTerminal;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let shutdown = CancellationToken::new();

    let host = run_host_with_cli(&cli, shutdown.clone());
    tokio::pin!(host);

    // Signals cancel the host, which then releases sessions and terminals
    let result = tokio::select! {
        result = &mut host => result,
        _ = signal::ctrl_c() => {
            eprintln!("Received SIGINT, shutting down...");
            shutdown.cancel();
            host.await
        }
        () = async {
            #[cfg(unix)]
            {
                let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM handler");
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await
            }
        } => {
            eprintln!("Received SIGTERM, shutting down...");
            shutdown.cancel();
            host.await
        }
    };

    // Shutdown OpenTelemetry to flush all pending spans
    shutdown_otel();

    if let Err(e) = result {
        // Output error to stderr (stdout carries IPC messages)
        eprintln!("Error: {}", e);

        if std::io::stdin().is_terminal() {
            eprintln!("\nFor debugging, run with --diagnostic to log to a file.");
            eprintln!("Or use -v/-vv/-vvv for more verbose logging.");
        }

        std::process::exit(1);
    }

    Ok(())
}
