// ── Unified domain model ──
//
// Canonical types flowing between the bridge, bus, supervisor, and
// agents. Wire-level snapshot types come from `cellgrid-api` and are
// re-exported here — the simulator's shape *is* the domain shape, so a
// conversion layer would only add noise.

pub mod alarms;
pub mod approval;
pub mod case;
pub mod event;
pub mod incident;
pub mod plan;

// ── Re-exports ──────────────────────────────────────────────────────
// Flat access: `use cellgrid_core::model::*` gives you everything.

pub use cellgrid_api::{AntennaPort, AntennaState, FleetSnapshot, SiteState, SwitchState};

pub use approval::{Approval, ApprovalDecision};
pub use case::{Case, Resolution};
pub use event::{iso_now, BusEvent, EventSource};
pub use incident::{CloseReason, CorrelatedEvent, Incident};
pub use plan::PlanStep;
