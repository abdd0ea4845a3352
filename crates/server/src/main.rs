use std::sync::Arc;
use std::thread;

use clap::{Parser, ValueEnum};
use miette::{IntoDiagnostic, Result};
use ratelimit_advisor_core::{Engine, EngineConfig};
use ratelimit_advisor_server::{handlers, Metrics};
use tiny_http::Server;

#[derive(Parser)]
#[command(name = "ratelimit-advisord", version, about = "Adaptive rate-limit advisor")]
struct Cli {
    #[arg(long, env = "RATELIMIT_ADVISOR_ADDR", default_value = "0.0.0.0:8080")]
    addr: String,
    #[arg(long, env = "RATELIMIT_ADVISOR_METRICS_ADDR")]
    metrics_addr: Option<String>,
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormat,
    #[arg(long, default_value = "info")]
    log_level: String,
    #[arg(long, default_value_t = 4)]
    workers: usize,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

fn init_tracing(log_format: LogFormat, log_level: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
        .into_diagnostic()?;
    let fmt = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    match log_format {
        LogFormat::Json => fmt.json().init(),
        LogFormat::Pretty => fmt.init(),
    }
    Ok(())
}

/// Runs one `tiny_http::Server` to completion on the current thread, dispatching every
/// accepted connection to `handlers::handle_request`.
fn serve(server: Arc<Server>, engine: Arc<Engine>, metrics: Arc<Metrics>) {
    for request in server.incoming_requests() {
        handlers::handle_request(request, &engine, &metrics);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format, &cli.log_level)?;

    let config = EngineConfig::from_env();
    tracing::info!(?config, "engine configuration loaded");

    let engine = Arc::new(Engine::new(config));
    let metrics = Arc::new(Metrics::new()?);

    let server = Server::http(&cli.addr)
        .map_err(|e| miette::miette!("failed to bind {}: {e}", cli.addr))?;
    let server = Arc::new(server);
    tracing::info!(addr = %cli.addr, "listening for decision requests");

    let mut handles = Vec::new();

    if let Some(metrics_addr) = cli.metrics_addr.clone() {
        let metrics_server = Server::http(&metrics_addr)
            .map_err(|e| miette::miette!("failed to bind metrics listener {}: {e}", metrics_addr))?;
        let metrics_server = Arc::new(metrics_server);
        let metrics_for_thread = Arc::clone(&metrics);
        tracing::info!(addr = %metrics_addr, "listening for metrics scrapes on a separate port");
        handles.push(thread::spawn(move || {
            for request in metrics_server.incoming_requests() {
                handlers::handle_metrics_request(request, &metrics_for_thread);
            }
        }));
    }

    for _ in 0..cli.workers.max(1) {
        let server = Arc::clone(&server);
        let engine = Arc::clone(&engine);
        let metrics = Arc::clone(&metrics);
        handles.push(thread::spawn(move || serve(server, engine, metrics)));
    }

    for handle in handles {
        let _ = handle.join();
    }

    Ok(())
}
