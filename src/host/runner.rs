//! Host runner
//!
//! Entry point for running the agent session host over stdio.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use super::core::SessionHost;
use crate::cli::Cli;
use crate::ipc::stdio;
use crate::types::HostConfig;

#[cfg(feature = "otel")]
use opentelemetry_sdk::trace::SdkTracerProvider;

/// Tracer provider kept for the final flush in [`shutdown_otel`]
#[cfg(feature = "otel")]
static OTEL_PROVIDER: std::sync::OnceLock<SdkTracerProvider> = std::sync::OnceLock::new();

/// Flush pending spans and stop the exporter
///
/// Call once before the process exits. A no-op when OpenTelemetry was never
/// configured.
#[cfg(feature = "otel")]
pub fn shutdown_otel() {
    let Some(provider) = OTEL_PROVIDER.get() else {
        return;
    };
    match provider.shutdown() {
        Ok(()) => tracing::info!("OpenTelemetry spans flushed"),
        Err(e) => eprintln!("Failed to flush OpenTelemetry spans: {e:?}"),
    }
}

/// No-op without the `otel` feature
#[cfg(not(feature = "otel"))]
pub fn shutdown_otel() {}

/// OTLP export layer, present only when `--otel-endpoint` is given
#[cfg(feature = "otel")]
fn otel_layer<S>(cli: &Cli) -> anyhow::Result<Option<impl tracing_subscriber::Layer<S>>>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    use opentelemetry::trace::TracerProvider;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::Resource;

    let Some(endpoint) = cli.otel_endpoint.as_deref().filter(|_| cli.is_otel_enabled()) else {
        return Ok(None);
    };
    eprintln!(
        "OpenTelemetry enabled: endpoint={}, service={}",
        endpoint, cli.otel_service_name
    );

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;
    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            Resource::builder()
                .with_service_name(cli.otel_service_name.clone())
                .build(),
        )
        .build();
    opentelemetry::global::set_tracer_provider(provider.clone());

    let tracer = provider.tracer("agent-session-host");
    drop(OTEL_PROVIDER.set(provider));
    Ok(Some(tracing_opentelemetry::layer().with_tracer(tracer)))
}

/// `RUST_LOG` wins over `-v`/`-q` when set and non-empty
fn build_env_filter(cli: &Cli) -> tracing_subscriber::EnvFilter {
    match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.is_empty() => tracing_subscriber::EnvFilter::new(directives),
        _ => tracing_subscriber::EnvFilter::from_default_env().add_directive(cli.log_level().into()),
    }
}

/// Log writer: a file in diagnostic mode, stderr otherwise
///
/// stdout is reserved for the IPC protocol.
fn log_writer(cli: &Cli) -> anyhow::Result<BoxMakeWriter> {
    if !cli.is_diagnostic() {
        return Ok(BoxMakeWriter::new(std::io::stderr));
    }

    let log_path = cli.log_path();
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(&log_path)?;
    eprintln!("Diagnostic mode: logging to {}", log_path.display());

    Ok(BoxMakeWriter::new(std::sync::Mutex::new(file)))
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_writer(cli)?)
        .with_ansi(false);
    let subscriber = tracing_subscriber::registry()
        .with(build_env_filter(cli))
        .with(fmt_layer);

    #[cfg(feature = "otel")]
    let subscriber = subscriber.with(otel_layer(cli)?);

    subscriber.init();
    Ok(())
}

/// Run the host with CLI arguments until stdin closes or `shutdown` fires
///
/// Initializes logging, serves the IPC boundary over stdio, and releases all
/// sessions and terminals before returning.
pub async fn run_host_with_cli(cli: &Cli, shutdown: CancellationToken) -> anyhow::Result<()> {
    let startup_time = std::time::Instant::now();

    // Initialize logging first (must happen before any tracing)
    init_logging(cli)?;

    // Short-lived span so startup is exported right away
    {
        let startup_span = tracing::info_span!(
            "host_startup",
            version = %env!("CARGO_PKG_VERSION"),
            pid = %std::process::id(),
            diagnostic = %cli.is_diagnostic(),
            otel_enabled = %cli.otel_endpoint.is_some(),
        );
        let _enter = startup_span.enter();

        tracing::info!("========== Agent Session Host Starting ==========");
        if cli.is_diagnostic() {
            tracing::info!(
                log_path = %cli.log_path().display(),
                "Diagnostic mode enabled"
            );
        }
        if let Some(otel_endpoint) = &cli.otel_endpoint {
            tracing::info!(otel_endpoint = %otel_endpoint, "OpenTelemetry tracing enabled");
        }
        tracing::info!(
            init_elapsed_ms = startup_time.elapsed().as_millis(),
            "Logging initialized"
        );
    }

    emit_host_ready_trace(startup_time.elapsed()).await;

    run_host(
        cli.host_config(),
        tokio::io::stdin(),
        tokio::io::stdout(),
        shutdown,
    )
    .await;

    emit_host_shutdown_trace(startup_time.elapsed()).await;
    Ok(())
}

#[tracing::instrument(name = "host_ready", skip_all, fields(
    startup_ms = %startup_duration.as_millis(),
    version = %env!("CARGO_PKG_VERSION"),
    pid = %std::process::id(),
))]
async fn emit_host_ready_trace(startup_duration: std::time::Duration) {
    tracing::info!(
        startup_ms = startup_duration.as_millis(),
        "Host ready and waiting for IPC messages"
    );
    // Small delay to ensure span is exported before continuing
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
}

#[tracing::instrument(name = "host_shutdown", skip_all, fields(
    uptime_secs = %total_uptime.as_secs(),
    uptime_ms = %total_uptime.as_millis(),
))]
async fn emit_host_shutdown_trace(total_uptime: std::time::Duration) {
    tracing::info!(
        uptime_secs = total_uptime.as_secs(),
        uptime_ms = total_uptime.as_millis(),
        "========== Host Shutdown Complete =========="
    );
}

/// Serve the IPC boundary over `reader`/`writer`
///
/// Returns when `reader` reaches EOF or `shutdown` is cancelled; either way
/// every session and terminal is released first.
#[tracing::instrument(name = "host_main", skip_all)]
pub async fn run_host<R, W>(config: HostConfig, reader: R, writer: W, shutdown: CancellationToken)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let server_start_time = std::time::Instant::now();
    let is_tty = atty::is(atty::Stream::Stdin);
    print_banner(&config, is_tty);

    if is_tty {
        eprintln!("Agent session host is running in interactive mode.");
        eprintln!("It expects newline-delimited JSON IPC messages on stdin.");
        eprintln!("(Press Ctrl+C to exit)");
    }

    let (sender, queue) = stdio::channel();
    let host = SessionHost::new(config, Arc::new(sender.clone()));
    let router = Arc::new(host.router());
    tracing::info!(host = %host.name(), version = %host.version(), "Host created");

    tokio::select! {
        () = stdio::serve(router, reader, writer, sender, queue) => {
            tracing::info!("IPC input reached EOF");
        }
        () = shutdown.cancelled() => {
            tracing::info!("Shutdown requested");
        }
    }

    host.shutdown().await;

    let uptime = server_start_time.elapsed();
    tracing::info!(
        uptime_secs = uptime.as_secs(),
        uptime_ms = uptime.as_millis(),
        "Host stopped"
    );
}

fn print_banner(config: &HostConfig, is_tty: bool) {
    let host_run_id = uuid::Uuid::new_v4();
    let start_time = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");

    tracing::info!(
        "================================================================================"
    );
    tracing::info!("  Agent Session Host - Start");
    tracing::info!(
        "--------------------------------------------------------------------------------"
    );
    tracing::info!("  Version:    {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("  Start Time: {}", start_time);
    tracing::info!("  Run ID:     {}", host_run_id);
    tracing::info!("  PID:        {}", std::process::id());
    tracing::info!("  Agent CLI:  {}", config.cli_command());
    tracing::info!(
        "  TTY Mode:   {}",
        if is_tty { "interactive" } else { "subprocess" }
    );
    tracing::info!(
        "================================================================================"
    );

    tracing::debug!(
        rust_log = ?std::env::var("RUST_LOG").ok(),
        cwd = ?std::env::current_dir().ok(),
        prompt_timeout_secs = config.prompt_timeout().as_secs(),
        default_model = ?config.default_model,
        "Environment configuration"
    );
}
