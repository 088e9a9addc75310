// ── Approval queue records ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::plan::PlanStep;

/// A pending authorization of an Agent B plan in HITL mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approval {
    /// Monotonic integer rendered as a string.
    pub id: String,
    #[serde(rename = "siteId")]
    pub site: String,
    pub actions: Vec<PlanStep>,
    pub reason: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

impl ApprovalDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}
