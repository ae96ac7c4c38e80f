use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use serde_json::json;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use operator_bridge::config::Config;
use operator_bridge::events::EventLog;
use operator_bridge::registry::RegistryReader;
use operator_bridge::server::{self, AppState};
use operator_bridge::spawn::{ActiveSpawnTracker, SpawnCoordinator, SpawnLock};
use operator_bridge::terminate::ProcessTerminator;

/// Operator Bridge - HTTP control plane for spawning and stopping agents
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "operator-bridge.yaml")]
    config: String,

    /// Host to listen on (overrides config file)
    #[arg(long)]
    host: Option<IpAddr>,

    /// Port to listen on (overrides config file)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    match run().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config).await?;

    // CLI overrides config
    if let Some(host) = args.host {
        config.server.host = host.to_string();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let paths = config.resolved_paths(Path::new(&args.config));
    info!(
        registry = %paths.registry_file.display(),
        event_log = %paths.event_log.display(),
        spawn_lock = %paths.spawn_lock.display(),
        "Resolved workspace paths"
    );

    let events = EventLog::new(paths.event_log.clone());
    let registry = RegistryReader::new(paths.registry_file.clone());
    let tracker = ActiveSpawnTracker::new();

    let coordinator = Arc::new(SpawnCoordinator::new(
        config.spawn.command.clone(),
        config.spawn.timeout_seconds,
        config.spawn.output_tail_bytes,
        SpawnLock::new(paths.spawn_lock.clone()),
        tracker.clone(),
        events.clone(),
    ));
    let terminator = Arc::new(ProcessTerminator::new(registry.clone(), events.clone()));

    let state = AppState {
        coordinator,
        terminator,
        registry,
        events: events.clone(),
        tracker,
        api_token: config.effective_api_token(),
        started_at: Instant::now(),
    };

    let app = server::build_app(state, config.server.request_timeout_seconds);

    let ip: IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::new(ip, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    events
        .append("started", json!({ "addr": addr.to_string() }))
        .await;
    info!(addr = %addr, "Starting operator bridge");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    events.append("shutdown", json!({})).await;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
