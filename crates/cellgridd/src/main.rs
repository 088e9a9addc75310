mod cli;
mod config;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use url::Url;

use cellgrid_api::{ReconnectConfig, TowerClient, TowerStream, TransportConfig};
use cellgrid_core::agents::spawn_stream_listener;
use cellgrid_core::{
    CorrelationAgent, DryRunMailer, IncidentBus, LogRing, PolicyStore, RcaAgent, SnapshotStore,
    Supervisor, TowerBridge, TowerDevice, TroubleshootAgent,
};

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Setup tracing based on verbosity
    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        tracing::error!(error = %err, "startup failed");
        eprintln!("cellgridd: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();
}

async fn run(cli: cli::Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load(&cli)?;

    let base_url: Url = config.tower_url.parse()?;
    let stream_url: Url = config.tower_stream_url.parse()?;

    // ── Transport ────────────────────────────────────────────────────
    let transport = TransportConfig {
        timeout: Duration::from_secs(config.request_timeout_secs),
        ..TransportConfig::default()
    };
    let client = Arc::new(TowerClient::new(base_url, &transport)?);
    let device: Arc<dyn TowerDevice> = client;

    // ── Core components ──────────────────────────────────────────────
    let bus = Arc::new(IncidentBus::new());
    let store = Arc::new(SnapshotStore::new());
    let supervisor_log = Arc::new(LogRing::new("supervisor"));
    let policy = Arc::new(PolicyStore::load_or_default(config.policy_path.clone()));

    let correlation = Arc::new(CorrelationAgent::new(
        policy.subscribe(),
        Duration::from_secs(config.correlation_window_secs),
    ));
    let troubleshoot = Arc::new(TroubleshootAgent::new(
        Arc::clone(&device),
        Arc::clone(&store),
        policy.subscribe(),
    ));
    let rca = Arc::new(RcaAgent::new(
        Arc::clone(&device),
        Some(Arc::new(DryRunMailer)),
        config.casebook_capacity,
    ));

    let supervisor = Supervisor::new(
        Arc::clone(&bus),
        Arc::clone(&store),
        Arc::clone(&device),
        policy.subscribe(),
        Arc::clone(&correlation),
        Arc::clone(&troubleshoot),
        Arc::clone(&rca),
        Arc::clone(&supervisor_log),
    );

    // ── Background tasks ─────────────────────────────────────────────
    let root = CancellationToken::new();

    let stream = TowerStream::connect(stream_url, ReconnectConfig::default(), root.child_token())?;
    let bridge = TowerBridge::new(
        Arc::clone(&device),
        Arc::clone(&store),
        Arc::clone(&bus),
        Arc::clone(&supervisor_log),
        &config,
    );

    let mut tasks = bridge.spawn(stream.subscribe(), root.child_token());
    tasks.push(spawn_stream_listener(
        Arc::clone(&correlation),
        &bus,
        root.child_token(),
    ));
    tasks.push(Arc::clone(&supervisor).spawn_event_loop(root.child_token()));

    let response = supervisor.start().await;
    tracing::info!(status = response.status.as_str(), "supervisor {}", response.message);

    // ── Run until interrupted ────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    supervisor.stop();
    root.cancel();
    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}
