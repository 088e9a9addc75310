// ── Policy store ──
//
// Validated enum settings with change notifications. Every accepted
// mutation bumps the version by exactly one; a rejected patch leaves the
// stored value untouched. Values are canonicalized case-insensitively
// against the fixed word sets, so `"e2e AUTOMATION"` patches cleanly.
//
// Accepted mutations are optionally rewritten to a TOML file — the one
// piece of orchestration state that survives a restart.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::warn;

use crate::error::CoreError;

// ── Enum settings ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmPrioritization {
    #[default]
    #[serde(rename = "Critical First")]
    CriticalFirst,
    #[serde(rename = "Adaptive Correlation")]
    AdaptiveCorrelation,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaysOfWorking {
    #[default]
    #[serde(rename = "E2E automation")]
    E2eAutomation,
    #[serde(rename = "Human intervention at critical steps")]
    HumanIntervention,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KpiAlignment {
    #[default]
    #[serde(rename = ">95%")]
    High,
    #[serde(rename = "75%")]
    Moderate,
}

impl AlarmPrioritization {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CriticalFirst => "Critical First",
            Self::AdaptiveCorrelation => "Adaptive Correlation",
        }
    }

    pub fn canonicalize(input: &str) -> Option<Self> {
        [Self::CriticalFirst, Self::AdaptiveCorrelation]
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(input.trim()))
    }
}

impl WaysOfWorking {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E2eAutomation => "E2E automation",
            Self::HumanIntervention => "Human intervention at critical steps",
        }
    }

    pub fn canonicalize(input: &str) -> Option<Self> {
        [Self::E2eAutomation, Self::HumanIntervention]
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(input.trim()))
    }

    /// True when policy alone allows unattended mitigation.
    pub fn is_auto(self) -> bool {
        matches!(self, Self::E2eAutomation)
    }
}

impl KpiAlignment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => ">95%",
            Self::Moderate => "75%",
        }
    }

    pub fn canonicalize(input: &str) -> Option<Self> {
        [Self::High, Self::Moderate]
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(input.trim()))
    }
}

// ── Policy value ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub alarm_prioritization: AlarmPrioritization,
    pub ways_of_working: WaysOfWorking,
    pub kpi_alignment: KpiAlignment,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
    pub source: String,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            alarm_prioritization: AlarmPrioritization::default(),
            ways_of_working: WaysOfWorking::default(),
            kpi_alignment: KpiAlignment::default(),
            updated_at: Utc::now(),
            version: 0,
            source: "default".into(),
        }
    }
}

/// A partial mutation. Raw strings — canonicalization happens in
/// [`PolicyStore::patch`], so adapters can pass operator input through.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyPatch {
    pub alarm_prioritization: Option<String>,
    pub ways_of_working: Option<String>,
    pub kpi_alignment: Option<String>,
}

// ── Persistent shape ─────────────────────────────────────────────────

/// What lands in the policy file. Version and timestamps are process
/// state, not configuration, so only the values persist.
#[derive(Debug, Serialize, Deserialize)]
struct PolicyFile {
    alarm_prioritization: AlarmPrioritization,
    ways_of_working: WaysOfWorking,
    kpi_alignment: KpiAlignment,
}

// ── Store ────────────────────────────────────────────────────────────

pub struct PolicyStore {
    tx: watch::Sender<Policy>,
    path: Option<PathBuf>,
}

impl PolicyStore {
    pub fn new(initial: Policy, path: Option<PathBuf>) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx, path }
    }

    /// Load from the policy file if it exists, else defaults. A malformed
    /// file is logged and ignored rather than blocking startup.
    pub fn load_or_default(path: Option<PathBuf>) -> Self {
        let mut initial = Policy::default();
        if let Some(ref p) = path {
            match Self::read_file(p) {
                Ok(Some(file)) => {
                    initial.alarm_prioritization = file.alarm_prioritization;
                    initial.ways_of_working = file.ways_of_working;
                    initial.kpi_alignment = file.kpi_alignment;
                    initial.source = "file".into();
                }
                Ok(None) => {}
                Err(e) => warn!(path = %p.display(), error = %e, "ignoring unreadable policy file"),
            }
        }
        Self::new(initial, path)
    }

    fn read_file(path: &Path) -> Result<Option<PolicyFile>, CoreError> {
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path)?;
        let file = toml::from_str(&text).map_err(|e| CoreError::Validation {
            field: "policy file".into(),
            reason: e.to_string(),
        })?;
        Ok(Some(file))
    }

    pub fn get(&self) -> Policy {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Policy> {
        self.tx.subscribe()
    }

    /// Apply a patch. All-or-nothing: one invalid value rejects the whole
    /// patch with no state change; an accepted patch bumps `version` by 1.
    pub fn patch(&self, patch: &PolicyPatch, source: &str) -> Result<Policy, CoreError> {
        let prioritization = patch
            .alarm_prioritization
            .as_deref()
            .map(|raw| {
                AlarmPrioritization::canonicalize(raw).ok_or_else(|| invalid("alarmPrioritization", raw))
            })
            .transpose()?;
        let ways = patch
            .ways_of_working
            .as_deref()
            .map(|raw| WaysOfWorking::canonicalize(raw).ok_or_else(|| invalid("waysOfWorking", raw)))
            .transpose()?;
        let kpi = patch
            .kpi_alignment
            .as_deref()
            .map(|raw| KpiAlignment::canonicalize(raw).ok_or_else(|| invalid("kpiAlignment", raw)))
            .transpose()?;

        let mut updated = Policy::default();
        self.tx.send_modify(|policy| {
            if let Some(v) = prioritization {
                policy.alarm_prioritization = v;
            }
            if let Some(v) = ways {
                policy.ways_of_working = v;
            }
            if let Some(v) = kpi {
                policy.kpi_alignment = v;
            }
            policy.version += 1;
            policy.updated_at = Utc::now();
            policy.source = source.to_owned();
            updated = policy.clone();
        });

        if let Err(e) = self.persist(&updated) {
            warn!(error = %e, "policy persisted in memory only");
        }
        Ok(updated)
    }

    fn persist(&self, policy: &Policy) -> Result<(), CoreError> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        let file = PolicyFile {
            alarm_prioritization: policy.alarm_prioritization,
            ways_of_working: policy.ways_of_working,
            kpi_alignment: policy.kpi_alignment,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(&file)?)?;
        Ok(())
    }
}

fn invalid(field: &str, raw: &str) -> CoreError {
    CoreError::Validation {
        field: field.into(),
        reason: format!("unknown value '{raw}'"),
    }
}
