// Shared transport configuration for building reqwest::Client instances.
//
// The request/response client and any tooling share timeout and
// user-agent settings through this module. The simulator speaks plain
// HTTP, so there are no TLS knobs here.

use std::time::Duration;

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-request timeout. The simulator answers quickly or not at all.
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            user_agent: "cellgridd/0.1.0".into(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::ApiError> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(crate::error::ApiError::Transport)
    }
}
