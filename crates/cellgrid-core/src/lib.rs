//! Orchestration core for the cellgrid control plane.
//!
//! Ingests tower-state snapshots from the simulator (stream + polling
//! fallback), converts them into discrete normalized events, fans those
//! out on an in-process incident bus, and drives a policy-conditioned
//! supervisor that coordinates three agents per event: correlation
//! clustering, bounded troubleshooting with a human-approval path, and
//! RCA case recording with dispatch-email composition.
//!
//! Ownership is strict: each component owns its own mutable state and
//! everything crosses component boundaries by value — through the bus,
//! policy snapshots, or operation calls.

pub mod agents;
pub mod bridge;
pub mod bus;
pub mod config;
pub mod delta;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod feed;
pub mod logring;
pub mod model;
pub mod policy;
pub mod store;
pub mod supervisor;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::TowerBridge;
pub use bus::{BusSubscription, IncidentBus};
pub use config::CoreConfig;
pub use delta::DeltaEmitter;
pub use device::TowerDevice;
pub use dispatch::{DispatchEmail, DryRunMailer, Mailer};
pub use error::CoreError;
pub use logring::{LogEntry, LogRing};
pub use policy::{
    AlarmPrioritization, KpiAlignment, Policy, PolicyPatch, PolicyStore, WaysOfWorking,
};
pub use store::SnapshotStore;
pub use supervisor::{LifecycleResponse, RunStatus, Summary, Supervisor};

// Re-export agent surfaces at the crate root for ergonomics.
pub use agents::{
    Agent, AgentStatus, CorrelationAgent, CorrelationEvent, IncidentReport, MitigateError,
    MitigationOutcome, RcaAgent, RecordOutcome, TroubleshootAgent,
};

// Domain model types.
pub use model::{
    Approval, ApprovalDecision, BusEvent, Case, CloseReason, EventSource, Incident, PlanStep,
    Resolution,
};
