// Tower simulator HTTP client
//
// Wraps `reqwest::Client` with the simulator's four endpoints. Transient
// failures are retried on a fixed budget (2 retries, 1 s spacing) before
// the error is surfaced; callers receive errors as values, never panics.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use crate::error::ApiError;
use crate::transport::TransportConfig;
use crate::wire::{AntennaPort, FleetSnapshot, SwitchState};

const RETRY_BUDGET: u32 = 2;
const RETRY_SPACING: Duration = Duration::from_secs(1);

/// Target of a `POST /power` command: one site or the whole fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowerTarget {
    All,
    Site(String),
}

impl PowerTarget {
    pub fn as_str(&self) -> &str {
        match self {
            Self::All => "all",
            Self::Site(id) => id,
        }
    }
}

/// Request/response client for the tower simulator.
pub struct TowerClient {
    http: reqwest::Client,
    base_url: Url,
}

impl TowerClient {
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, ApiError> {
        let http = transport.build_client()?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url.join(path).map_err(ApiError::InvalidUrl)
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Fetch the current fleet snapshot.
    ///
    /// `GET /state`. The response is normalized whether the simulator
    /// wraps it as `{ "state": {…} }` or returns the mapping bare.
    pub async fn get_state(&self) -> Result<FleetSnapshot, ApiError> {
        let url = self.endpoint("state")?;
        debug!("GET {}", url);
        let value: serde_json::Value = self.request_json(|http| http.get(url.clone())).await?;
        FleetSnapshot::from_value(value.clone()).map_err(|e| ApiError::Deserialization {
            message: e.to_string(),
            body: value.to_string(),
        })
    }

    /// Switch mains power for one site or the whole fleet.
    ///
    /// `POST /power` with `{"sites": "<siteId>"|"all", "state": "on"|"off"}`.
    pub async fn set_power(
        &self,
        target: &PowerTarget,
        state: SwitchState,
    ) -> Result<(), ApiError> {
        let url = self.endpoint("power")?;
        debug!(sites = target.as_str(), state = state.as_str(), "power command");
        let body = json!({ "sites": target.as_str(), "state": state });
        self.request_ok(|http| http.post(url.clone()).json(&body))
            .await
    }

    /// Switch one antenna's radio head on or off.
    ///
    /// `POST /rru` with `{"site": …, "antenna": "a1"|"a2", "state": "on"|"off"}`.
    pub async fn set_rru(
        &self,
        site: &str,
        antenna: AntennaPort,
        state: SwitchState,
    ) -> Result<(), ApiError> {
        let url = self.endpoint("rru")?;
        debug!(site, antenna = antenna.api_name(), state = state.as_str(), "rru command");
        let body = json!({ "site": site, "antenna": antenna.api_name(), "state": state });
        self.request_ok(|http| http.post(url.clone()).json(&body))
            .await
    }

    /// Inject a fault scenario (tooling surface, unused by the core).
    ///
    /// `POST /scenario` with `{"site": …, "mode": …, "crqId": …}`.
    pub async fn set_scenario(&self, site: &str, mode: &str, crq_id: &str) -> Result<(), ApiError> {
        let url = self.endpoint("scenario")?;
        debug!(site, mode, crq_id, "scenario command");
        let body = json!({ "site": site, "mode": mode, "crqId": crq_id });
        self.request_ok(|http| http.post(url.clone()).json(&body))
            .await
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send a request, retrying transient failures (any non-2xx status or
    /// network error) up to the retry budget with fixed spacing. The last
    /// error is surfaced.
    async fn send_with_retry(
        &self,
        build: impl Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ApiError> {
        let mut attempt: u32 = 0;
        loop {
            let err = match build(&self.http).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let body = resp.text().await.unwrap_or_default();
                    ApiError::Status { status, body }
                }
                Err(e) => ApiError::Transport(e),
            };

            if attempt >= RETRY_BUDGET || !err.is_transient() {
                return Err(err);
            }
            warn!(error = %err, attempt, "tower request failed, retrying");
            attempt += 1;
            tokio::time::sleep(RETRY_SPACING).await;
        }
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        build: impl Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let resp = self.send_with_retry(build).await?;
        let body = resp.text().await.map_err(ApiError::Transport)?;
        serde_json::from_str(&body).map_err(|e| ApiError::Deserialization {
            message: e.to_string(),
            body,
        })
    }

    async fn request_ok(
        &self,
        build: impl Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    ) -> Result<(), ApiError> {
        self.send_with_retry(build).await.map(|_| ())
    }
}
