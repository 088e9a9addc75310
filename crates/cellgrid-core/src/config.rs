// ── Core orchestrator configuration ──
//
// These values describe *how* the control plane runs: where the simulator
// lives, how often to poll, and the correlation window. The daemon
// resolves them figment-style (defaults ← TOML file ← `CELLGRID_*` env)
// and hands the result in; the core never reads config files itself.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the orchestration core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Simulator base URL. Honored env name: `CELLGRID_TOWER_URL`.
    pub tower_url: String,

    /// Simulator streaming endpoint. Honored env name:
    /// `CELLGRID_TOWER_STREAM_URL`.
    pub tower_stream_url: String,

    /// Snapshot polling interval (runs regardless of stream health).
    pub poll_interval_secs: u64,

    /// Per-request timeout against the simulator.
    pub request_timeout_secs: u64,

    /// Correlation window for Agent A.
    pub correlation_window_secs: u64,

    /// Emit `alarm.raised { bootstrap: true }` for alarms present on the
    /// very first ingest. Operator-visible: it affects what the cold-start
    /// sweep sees on the first connect.
    pub bootstrap_emit: bool,

    /// Warn when the stream is connected but silent for longer than this.
    pub quiet_after_secs: u64,

    /// Bound on the RCA casebook.
    pub casebook_capacity: usize,

    /// Where accepted policy mutations are persisted. `None` keeps the
    /// policy memory-only.
    pub policy_path: Option<PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            tower_url: "http://127.0.0.1:9000/".into(),
            tower_stream_url: "ws://127.0.0.1:9000/stream".into(),
            poll_interval_secs: 5,
            request_timeout_secs: 3,
            correlation_window_secs: 300,
            bootstrap_emit: true,
            quiet_after_secs: 15,
            casebook_capacity: 500,
            policy_path: None,
        }
    }
}
