// Wire types for the tower simulator.
//
// The snapshot is a mapping from site id to per-site state. Field names on
// the wire are camelCase (`siteAlive`, `batteryPercent`). `GET /state` may
// wrap the mapping as `{ "state": {…} }` or return it bare;
// [`FleetSnapshot::from_value`] normalizes both to one shape.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

// ── Switch state ─────────────────────────────────────────────────────

/// `"on"` / `"off"`, used for both the mains field and power/rru commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchState {
    On,
    Off,
}

impl SwitchState {
    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

// ── Antenna selector ─────────────────────────────────────────────────

/// One of a site's two radio heads.
///
/// Serializes with the snapshot field names (`"antenna1"` / `"antenna2"`);
/// the device API's `"a1"` / `"a2"` spelling goes through
/// [`api_name`](Self::api_name) instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AntennaPort {
    #[serde(rename = "antenna1")]
    A1,
    #[serde(rename = "antenna2")]
    A2,
}

impl AntennaPort {
    pub const ALL: [AntennaPort; 2] = [Self::A1, Self::A2];

    /// Name used on the device API (`"a1"` / `"a2"`).
    pub fn api_name(self) -> &'static str {
        match self {
            Self::A1 => "a1",
            Self::A2 => "a2",
        }
    }

    /// Name used in normalized bus events (`"antenna1"` / `"antenna2"`).
    pub fn field_name(self) -> &'static str {
        match self {
            Self::A1 => "antenna1",
            Self::A2 => "antenna2",
        }
    }
}

// ── Per-site state ───────────────────────────────────────────────────

/// Service state of one antenna. The simulator reports free-form strings
/// (`"Available"`, `"Unavailable"`, …); comparisons downstream are plain
/// string inequality, so the value is kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AntennaState {
    #[serde(default)]
    pub service: String,
}

impl AntennaState {
    pub fn is_available(&self) -> bool {
        self.service == "Available"
    }
}

/// State of a single cell site as the simulator reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteState {
    pub mains: SwitchState,
    pub site_alive: bool,
    pub battery_percent: u8,
    #[serde(default)]
    pub antenna1: AntennaState,
    #[serde(default)]
    pub antenna2: AntennaState,
    #[serde(default)]
    pub alarms: BTreeSet<String>,
}

impl SiteState {
    pub fn antenna(&self, port: AntennaPort) -> &AntennaState {
        match port {
            AntennaPort::A1 => &self.antenna1,
            AntennaPort::A2 => &self.antenna2,
        }
    }
}

// ── Fleet snapshot ───────────────────────────────────────────────────

/// Full fleet state: site id → per-site state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FleetSnapshot(pub BTreeMap<String, SiteState>);

impl FleetSnapshot {
    pub fn site(&self, id: &str) -> Option<&SiteState> {
        self.0.get(id)
    }

    pub fn sites(&self) -> impl Iterator<Item = (&String, &SiteState)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Normalize either `{ "state": {…} }` or a bare mapping into a snapshot.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        struct Enveloped {
            state: FleetSnapshot,
        }

        if let Ok(enveloped) = serde_json::from_value::<Enveloped>(value.clone()) {
            return Ok(enveloped.state);
        }
        serde_json::from_value(value)
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn site_json() -> serde_json::Value {
        json!({
            "mains": "on",
            "siteAlive": true,
            "batteryPercent": 87,
            "antenna1": { "service": "Available" },
            "antenna2": { "service": "Unavailable" },
            "alarms": ["ServiceUnavailable"]
        })
    }

    #[test]
    fn deserialize_site_state_camel_case() {
        let site: SiteState = serde_json::from_value(site_json()).unwrap();
        assert!(site.mains.is_on());
        assert!(site.site_alive);
        assert_eq!(site.battery_percent, 87);
        assert!(site.antenna1.is_available());
        assert!(!site.antenna2.is_available());
        assert!(site.alarms.contains("ServiceUnavailable"));
    }

    #[test]
    fn missing_alarms_defaults_to_empty() {
        let site: SiteState = serde_json::from_value(json!({
            "mains": "off",
            "siteAlive": false,
            "batteryPercent": 12
        }))
        .unwrap();
        assert!(site.alarms.is_empty());
        assert_eq!(site.antenna1.service, "");
    }

    #[test]
    fn from_value_accepts_envelope() {
        let snapshot =
            FleetSnapshot::from_value(json!({ "state": { "S1": site_json() } })).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.site("S1").is_some());
    }

    #[test]
    fn from_value_accepts_bare_mapping() {
        let snapshot = FleetSnapshot::from_value(json!({ "S1": site_json() })).unwrap();
        assert!(snapshot.site("S1").unwrap().site_alive);
    }

    #[test]
    fn antenna_port_names() {
        assert_eq!(AntennaPort::A1.api_name(), "a1");
        assert_eq!(AntennaPort::A2.field_name(), "antenna2");
        assert_eq!(
            serde_json::to_string(&AntennaPort::A1).unwrap(),
            "\"antenna1\""
        );
    }
}
