//! Async Rust client for the tower fleet simulator.
//!
//! This crate provides the transport layer for talking to the external
//! tower simulator. It exposes two surfaces:
//!
//! - **Request/response** ([`TowerClient`]) — plain HTTP against the
//!   simulator's `/state`, `/power`, `/rru`, and `/scenario` endpoints,
//!   with a bounded retry budget for transient failures.
//!
//! - **Streaming** ([`TowerStream`]) — a long-lived WebSocket connection
//!   that pushes fleet snapshots as they change, with automatic
//!   reconnection (exponential backoff + jitter).
//!
//! Both share a common [`TransportConfig`]. Higher layers (`cellgrid-core`)
//! combine the stream with periodic polling so correlation stays alive
//! across stream outages.

pub mod client;
pub mod error;
pub mod stream;
pub mod transport;
pub mod wire;

pub use client::{PowerTarget, TowerClient};
pub use error::ApiError;
pub use stream::{ReconnectConfig, StreamMessage, TowerStream};
pub use transport::TransportConfig;
pub use wire::{AntennaPort, AntennaState, FleetSnapshot, SiteState, SwitchState};
