//! Snapshot stream with auto-reconnect.
//!
//! Connects to the simulator's streaming endpoint and pushes parsed
//! snapshots through a [`tokio::sync::broadcast`] channel. Handles
//! reconnection with exponential backoff + jitter automatically; the
//! bridge layers delta extraction and polling fallback on top.
//!
//! # Example
//!
//! ```rust,ignore
//! use cellgrid_api::stream::{ReconnectConfig, StreamMessage, TowerStream};
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! let cancel = CancellationToken::new();
//! let ws_url = Url::parse("ws://127.0.0.1:9000/stream")?;
//!
//! let stream = TowerStream::connect(ws_url, ReconnectConfig::default(), cancel.clone())?;
//! let mut rx = stream.subscribe();
//!
//! while let Ok(msg) = rx.recv().await {
//!     if let StreamMessage::Snapshot(snapshot) = msg {
//!         println!("{} sites", snapshot.len());
//!     }
//! }
//!
//! stream.shutdown();
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::ApiError;
use crate::wire::FleetSnapshot;

// ── Broadcast channel capacity ───────────────────────────────────────

const MESSAGE_CHANNEL_CAPACITY: usize = 256;

// ── StreamMessage ────────────────────────────────────────────────────

/// A message from the snapshot stream.
#[derive(Debug, Clone)]
pub enum StreamMessage {
    /// The connection (re)opened. Consumers holding diff state against the
    /// old connection must reset it.
    Connected,
    /// The connection dropped; a reconnect is scheduled.
    Disconnected,
    /// A snapshot envelope pushed by the simulator.
    Snapshot(Arc<FleetSnapshot>),
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for stream reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 10s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: None,
        }
    }
}

// ── TowerStream ──────────────────────────────────────────────────────

/// Handle to a running snapshot stream.
///
/// Drop all receivers and call [`shutdown`](Self::shutdown) to tear down
/// the background task.
pub struct TowerStream {
    message_rx: broadcast::Receiver<StreamMessage>,
    cancel: CancellationToken,
}

impl TowerStream {
    /// Spawn the reconnection loop against the given streaming endpoint.
    ///
    /// Returns immediately; the first connection attempt happens
    /// asynchronously. Subscribe to the receiver to consume messages.
    pub fn connect(
        ws_url: Url,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Result<Self, ApiError> {
        let (message_tx, message_rx) = broadcast::channel(MESSAGE_CHANNEL_CAPACITY);

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            stream_loop(ws_url, message_tx, reconnect, task_cancel).await;
        });

        Ok(Self { message_rx, cancel })
    }

    /// Get a new broadcast receiver for the message stream.
    ///
    /// Multiple consumers can subscribe concurrently. If a consumer falls
    /// behind, it receives [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<StreamMessage> {
        self.message_rx.resubscribe()
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → read → on error, backoff → reconnect.
async fn stream_loop(
    ws_url: Url,
    message_tx: broadcast::Sender<StreamMessage>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = connect_and_read(&ws_url, &message_tx, &cancel) => {
                let _ = message_tx.send(StreamMessage::Disconnected);
                match result {
                    // Clean disconnect (server close frame or stream ended).
                    // Reset attempt counter and reconnect immediately.
                    Ok(()) => {
                        tracing::info!("snapshot stream disconnected cleanly, reconnecting");
                        attempt = 0;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, attempt, "snapshot stream error");

                        if let Some(max) = reconnect.max_retries {
                            if attempt >= max {
                                tracing::error!(
                                    max_retries = max,
                                    "stream reconnection limit reached, giving up"
                                );
                                break;
                            }
                        }

                        let delay = calculate_backoff(attempt, &reconnect);
                        tracing::info!(
                            delay_ms = delay.as_millis() as u64,
                            attempt,
                            "waiting before reconnect"
                        );

                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }

                        attempt += 1;
                    }
                }
            }
        }
    }

    #[allow(unreachable_code)]
    {
        tracing::debug!("snapshot stream loop exiting");
    }
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish a single connection, read messages until it drops.
async fn connect_and_read(
    url: &Url,
    message_tx: &broadcast::Sender<StreamMessage>,
    cancel: &CancellationToken,
) -> Result<(), ApiError> {
    tracing::info!(url = %url, "connecting to snapshot stream");

    let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| ApiError::StreamConnect(e.to_string()))?;

    tracing::info!("snapshot stream connected");
    let _ = message_tx.send(StreamMessage::Connected);

    let (_write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        if let Some(snapshot) = parse_snapshot_frame(&text) {
                            let _ = message_tx.send(StreamMessage::Snapshot(Arc::new(snapshot)));
                        }
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite handles pong replies automatically
                        tracing::trace!("snapshot stream ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(
                                code = %cf.code,
                                reason = %cf.reason,
                                "snapshot stream close frame received"
                            );
                        } else {
                            tracing::info!("snapshot stream close frame received (no payload)");
                        }
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        return Err(ApiError::StreamConnect(e.to_string()));
                    }
                    None => {
                        // Stream ended without a close frame
                        tracing::info!("snapshot stream ended");
                        return Ok(());
                    }
                    _ => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }
    }
}

// ── Frame parsing ────────────────────────────────────────────────────

/// Parse a text frame into a snapshot, if it is one.
///
/// Accepts the `{ "state": {…} }` envelope or a bare site mapping.
/// Anything else (keep-alives, chatter) is skipped with a debug log.
fn parse_snapshot_frame(text: &str) -> Option<FleetSnapshot> {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "unparseable stream frame, skipping");
            return None;
        }
    };

    match FleetSnapshot::from_value(value) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            tracing::debug!(error = %e, "stream frame is not a snapshot, skipping");
            None
        }
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * jitter`
///
/// Jitter is ±20% to spread out reconnection storms. It is deterministic,
/// seeded from the attempt number — good enough for backoff spread without
/// pulling in an RNG.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(attempt as i32);
    let capped = base.min(config.max_delay.as_secs_f64());

    let jitter_factor = 1.0 + 0.2 * ((attempt as f64 * 7.3).sin());
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────
