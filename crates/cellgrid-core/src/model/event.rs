// ── Normalized bus events ──
//
// Every snapshot delta, stream-health change, and synthesized alarm is
// expressed as one of these variants before it reaches the bus. The `ts`
// field is an ISO-8601 string preserved verbatim — the supervisor's
// duplicate ledger keys on it string-for-string, so it is never reparsed
// or normalized once assigned.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use cellgrid_api::{AntennaPort, FleetSnapshot};

/// Current wall time as the ISO-8601 string all emissions carry.
pub fn iso_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Which channel produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventSource {
    Stream,
    Poll,
    ColdStart,
}

/// A normalized event on the incident bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BusEvent {
    #[serde(rename = "alarm.raised")]
    AlarmRaised {
        #[serde(rename = "siteId")]
        site: String,
        alarm: String,
        ts: String,
        source: EventSource,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        bootstrap: bool,
    },

    #[serde(rename = "alarm.cleared")]
    AlarmCleared {
        #[serde(rename = "siteId")]
        site: String,
        alarm: String,
        ts: String,
        source: EventSource,
    },

    #[serde(rename = "service.changed")]
    ServiceChanged {
        #[serde(rename = "siteId")]
        site: String,
        antenna: AntennaPort,
        from: String,
        to: String,
        ts: String,
        source: EventSource,
    },

    /// Full fleet state, republished for live views. `siteId` is `"all"`.
    #[serde(rename = "state.update")]
    StateUpdate {
        #[serde(rename = "siteId")]
        site: String,
        payload: FleetSnapshot,
        ts: String,
    },

    /// Stream health, visibility only.
    #[serde(rename = "bus.disconnected")]
    BusDisconnected { ts: String },

    #[serde(rename = "bus.reconnected")]
    BusReconnected { ts: String },
}

impl BusEvent {
    pub fn state_update(payload: FleetSnapshot, ts: String) -> Self {
        Self::StateUpdate {
            site: "all".into(),
            payload,
            ts,
        }
    }

    /// The wire name of this variant (`"alarm.raised"`, …).
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::AlarmRaised { .. } => "alarm.raised",
            Self::AlarmCleared { .. } => "alarm.cleared",
            Self::ServiceChanged { .. } => "service.changed",
            Self::StateUpdate { .. } => "state.update",
            Self::BusDisconnected { .. } => "bus.disconnected",
            Self::BusReconnected { .. } => "bus.reconnected",
        }
    }

    pub fn site_id(&self) -> Option<&str> {
        match self {
            Self::AlarmRaised { site, .. }
            | Self::AlarmCleared { site, .. }
            | Self::ServiceChanged { site, .. }
            | Self::StateUpdate { site, .. } => Some(site),
            Self::BusDisconnected { .. } | Self::BusReconnected { .. } => None,
        }
    }

    pub fn ts(&self) -> &str {
        match self {
            Self::AlarmRaised { ts, .. }
            | Self::AlarmCleared { ts, .. }
            | Self::ServiceChanged { ts, .. }
            | Self::StateUpdate { ts, .. }
            | Self::BusDisconnected { ts }
            | Self::BusReconnected { ts } => ts,
        }
    }

    pub fn alarm(&self) -> Option<&str> {
        match self {
            Self::AlarmRaised { alarm, .. } | Self::AlarmCleared { alarm, .. } => Some(alarm),
            _ => None,
        }
    }

    /// Exact-duplicate identity: `(type, siteId, alarm, ts)` with the
    /// timestamp string taken verbatim.
    pub fn ledger_key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.event_type(),
            self.site_id().unwrap_or("-"),
            self.alarm().unwrap_or("-"),
            self.ts()
        )
    }
}
