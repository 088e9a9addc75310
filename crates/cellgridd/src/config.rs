//! Config resolution for the daemon.
//!
//! Layered figment-style: built-in defaults ← TOML file ← `CELLGRID_*`
//! environment ← command-line flags. The honored env names include
//! `CELLGRID_TOWER_URL` and `CELLGRID_TOWER_STREAM_URL`.

use std::path::PathBuf;

use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use cellgrid_core::CoreConfig;

use crate::cli::Cli;

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "cellgrid", "cellgrid")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("cellgrid.toml"))
}

/// Load the full CoreConfig from file + environment + flags.
pub fn load(cli: &Cli) -> Result<CoreConfig, figment::Error> {
    let path = cli.config.clone().unwrap_or_else(config_path);

    let figment = Figment::new()
        .merge(Serialized::defaults(CoreConfig::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("CELLGRID_"));

    let mut config: CoreConfig = figment.extract()?;

    // Flags win over file and environment.
    if let Some(ref url) = cli.tower_url {
        config.tower_url = url.clone();
    }
    if let Some(ref url) = cli.stream_url {
        config.tower_stream_url = url.clone();
    }
    if let Some(secs) = cli.poll_interval {
        config.poll_interval_secs = secs;
    }
    if let Some(secs) = cli.window {
        config.correlation_window_secs = secs;
    }
    Ok(config)
}
