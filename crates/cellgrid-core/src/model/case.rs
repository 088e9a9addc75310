// ── RCA case records ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome class of a recorded case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Investigating,
    Restored,
    Stabilized,
    Unknown,
}

impl Resolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Investigating => "investigating",
            Self::Restored => "restored",
            Self::Stabilized => "stabilized",
            Self::Unknown => "unknown",
        }
    }
}

/// A persisted RCA record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub ts: DateTime<Utc>,
    #[serde(rename = "siteId")]
    pub site: String,
    pub cause: String,
    pub actions: Vec<String>,
    pub resolution: Resolution,
    pub ongoing: bool,
    #[serde(rename = "dispatchSuggested")]
    pub dispatch_suggested: bool,
    pub summary: String,
}
