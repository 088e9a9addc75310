//! Clap derive structures for the `cellgridd` daemon.

use std::path::PathBuf;

use clap::Parser;

/// cellgridd -- control plane for a cell-site fleet
#[derive(Debug, Parser)]
#[command(
    name = "cellgridd",
    version,
    about = "Orchestrate tower-state ingest, incident correlation, and automated mitigation",
    long_about = "Long-running control plane: ingests tower snapshots from the fleet\n\
        simulator, correlates alarms into incidents, and mitigates them\n\
        automatically or through the human approval queue, per policy."
)]
pub struct Cli {
    /// Path to a TOML config file (defaults to the XDG location)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Simulator base URL
    #[arg(long, env = "CELLGRID_TOWER_URL")]
    pub tower_url: Option<String>,

    /// Simulator streaming endpoint
    #[arg(long, env = "CELLGRID_TOWER_STREAM_URL")]
    pub stream_url: Option<String>,

    /// Snapshot polling interval in seconds
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Correlation window in seconds
    #[arg(long)]
    pub window: Option<u64>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}
