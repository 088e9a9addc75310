// ── Mitigation plan steps ──

use std::fmt;

use serde::{Deserialize, Serialize};

use cellgrid_api::AntennaPort;

/// One step of an Agent B recovery plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum PlanStep {
    /// Restore mains power to the site.
    #[serde(rename = "power.on")]
    PowerOn { site: String },

    /// Drive an antenna's radio head until its service is `Available`.
    #[serde(rename = "rru.ensure")]
    RruEnsure { site: String, antenna: AntennaPort },

    /// Shed an antenna's radio head to conserve battery.
    #[serde(rename = "rru.off")]
    RruOff { site: String, antenna: AntennaPort },
}

impl fmt::Display for PlanStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PowerOn { site } => write!(f, "power.on({site})"),
            Self::RruEnsure { site, antenna } => {
                write!(f, "rru.ensure({site}, {})", antenna.api_name())
            }
            Self::RruOff { site, antenna } => {
                write!(f, "rru.off({site}, {})", antenna.api_name())
            }
        }
    }
}
