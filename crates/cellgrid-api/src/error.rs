use thiserror::Error;

/// Top-level error type for the `cellgrid-api` crate.
///
/// Covers every failure mode of the simulator transport: HTTP errors,
/// non-2xx responses, malformed payloads, and stream failures.
/// `cellgrid-core` treats these as transient by default — the bridge and
/// agents retry or observe the fault on the next read rather than crash.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The simulator answered with a non-2xx status.
    #[error("Tower API error (HTTP {status}): {body}")]
    Status { status: u16, body: String },

    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// Stream connection failed.
    #[error("Stream connection failed: {0}")]
    StreamConnect(String),
}

impl ApiError {
    /// Returns `true` if this is a transient error worth retrying.
    ///
    /// The client retries any non-2xx status or network failure on its
    /// fixed budget; malformed URLs and unparseable bodies come back the
    /// same no matter how often the request is repeated.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Status { .. } | Self::StreamConnect(_)
        )
    }
}
