//! Agent C — case recording and dispatch composition.
//!
//! A pure recording component: the supervisor hands it incident reports,
//! it filters noise, suppresses near-identical follow-ups, stamps each
//! accepted case with the site's current alarm picture, and appends to a
//! bounded casebook. Cases that look like they need boots on the ground
//! get a dispatch email composed and handed to the mailer.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};

use cellgrid_api::SiteState;

use super::{Agent, AgentCore, AgentStatus};
use crate::device::TowerDevice;
use crate::dispatch::{DispatchEmail, Mailer};
use crate::error::CoreError;
use crate::logring::LogRing;
use crate::model::alarms::detect_alarms;
use crate::model::{Case, Resolution};

/// Cause strings that never become cases.
const NOISE_CAUSES: [&str; 3] = ["unknown", "heartbeat", "noop"];

/// Window in which a same-(cause, resolution) follow-up for a site is
/// suppressed.
const DEDUP_WINDOW_SECS: i64 = 10;

/// What the supervisor reports into the casebook.
#[derive(Debug, Clone)]
pub struct IncidentReport {
    pub site: String,
    pub cause: String,
    pub actions: Vec<String>,
    pub resolution: Resolution,
}

/// Result of a `record_incident` call. Rejections are answers, not errors.
#[derive(Debug, Clone)]
pub enum RecordOutcome {
    Recorded(Case),
    Skipped { reason: &'static str },
}

impl RecordOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded(_))
    }
}

struct LastAccepted {
    cause: String,
    resolution: Resolution,
    ts: DateTime<Utc>,
}

pub struct RcaAgent {
    core: AgentCore,
    device: Arc<dyn TowerDevice>,
    mailer: Option<Arc<dyn Mailer>>,
    casebook: Mutex<VecDeque<Case>>,
    last_by_site: Mutex<HashMap<String, LastAccepted>>,
    capacity: usize,
    tasks: AtomicU64,
}

impl RcaAgent {
    pub fn new(
        device: Arc<dyn TowerDevice>,
        mailer: Option<Arc<dyn Mailer>>,
        capacity: usize,
    ) -> Self {
        Self {
            core: AgentCore::new("rca"),
            device,
            mailer,
            casebook: Mutex::new(VecDeque::with_capacity(64)),
            last_by_site: Mutex::new(HashMap::new()),
            capacity,
            tasks: AtomicU64::new(0),
        }
    }

    /// Record an incident into the casebook.
    ///
    /// Auto-starts the agent, drops noise, and suppresses a follow-up
    /// whose (cause, resolution) matches the site's last accepted case
    /// within the dedup window. Accepted cases are stamped with the
    /// site's freshly-read alarm picture.
    pub async fn record_incident(&self, report: IncidentReport) -> RecordOutcome {
        if !self.core.is_running() {
            self.core.start();
        }

        if Self::is_noise(&report.site, &report.cause) {
            self.core
                .log()
                .push(format!("case skipped (noise): site={}", report.site));
            return RecordOutcome::Skipped {
                reason: "noise_or_unknown",
            };
        }

        let now = Utc::now();
        {
            let last = self.last_by_site.lock().expect("rca last poisoned");
            if let Some(prev) = last.get(&report.site) {
                if prev.cause == report.cause
                    && prev.resolution == report.resolution
                    && (now - prev.ts).num_seconds() < DEDUP_WINDOW_SECS
                {
                    return RecordOutcome::Skipped {
                        reason: "dedup_suppressed",
                    };
                }
            }
        }

        let open_alarms = self
            .read_site(&report.site)
            .await
            .map(|site| detect_alarms(&site))
            .unwrap_or_default();

        let ongoing = report.resolution != Resolution::Restored || !open_alarms.is_empty();
        let dispatch_suggested = ongoing;

        let summary = format!(
            "{}: {} -> {}; {} open alarm(s); {} action(s) taken",
            report.site,
            report.cause,
            report.resolution.as_str(),
            open_alarms.len(),
            report.actions.len(),
        );

        let case = Case {
            ts: now,
            site: report.site.clone(),
            cause: report.cause.clone(),
            actions: report.actions,
            resolution: report.resolution,
            ongoing,
            dispatch_suggested,
            summary,
        };

        {
            let mut casebook = self.casebook.lock().expect("rca casebook poisoned");
            if casebook.len() == self.capacity {
                casebook.pop_front();
            }
            casebook.push_back(case.clone());
        }
        self.last_by_site
            .lock()
            .expect("rca last poisoned")
            .insert(
                report.site.clone(),
                LastAccepted {
                    cause: report.cause,
                    resolution: report.resolution,
                    ts: now,
                },
            );
        self.tasks.fetch_add(1, Ordering::Relaxed);
        self.core
            .log()
            .push(format!("case recorded: {}", case.summary));

        if dispatch_suggested {
            if let Some(mailer) = self.mailer.clone() {
                match self.compose_dispatch_email(&case.site).await {
                    Ok(email) => mailer.send(&email),
                    Err(e) => {
                        self.core
                            .log()
                            .push(format!("dispatch compose failed: {e}"));
                    }
                }
            }
        }

        RecordOutcome::Recorded(case)
    }

    /// Compose the deterministic dispatch email for the site's most
    /// recent dispatch-suggested case.
    pub async fn compose_dispatch_email(&self, site_id: &str) -> Result<DispatchEmail, CoreError> {
        let case = {
            let casebook = self.casebook.lock().expect("rca casebook poisoned");
            casebook
                .iter()
                .rev()
                .find(|c| c.site == site_id && c.dispatch_suggested)
                .cloned()
        }
        .ok_or_else(|| CoreError::NoUnresolvedCase(site_id.to_owned()))?;

        let state = self.read_site(site_id).await;

        let mut body = String::new();
        body.push_str(&format!("Site: {site_id}\n"));
        body.push_str(&format!(
            "Time: {}\n",
            case.ts.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
        match state {
            Some(ref site) => {
                body.push_str(&format!(
                    "Mains: {} | Alive: {} | A1: {} | A2: {} | Battery: {}%\n",
                    site.mains.as_str(),
                    site.site_alive,
                    site.antenna1.service,
                    site.antenna2.service,
                    site.battery_percent,
                ));
                let alarms = if site.alarms.is_empty() {
                    "none".to_owned()
                } else {
                    site.alarms.iter().cloned().collect::<Vec<_>>().join(", ")
                };
                body.push_str(&format!("Open alarms: {alarms}\n"));
            }
            None => body.push_str("Site state unavailable\n"),
        }
        body.push_str("Actions taken so far:\n");
        if case.actions.is_empty() {
            body.push_str("  - none\n");
        } else {
            for action in &case.actions {
                body.push_str(&format!("  - {action}\n"));
            }
        }
        body.push_str("Requested next step: field dispatch\n");
        body.push_str(&format!("Summary: {}\n", case.summary));

        Ok(DispatchEmail {
            subject: format!("[DISPATCH] {site_id} – {} – Action required", case.cause),
            body,
        })
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn cases(&self) -> Vec<Case> {
        self.casebook
            .lock()
            .expect("rca casebook poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn tasks_recorded(&self) -> u64 {
        self.tasks.load(Ordering::Relaxed)
    }

    async fn read_site(&self, site_id: &str) -> Option<SiteState> {
        match self.device.fetch_state().await {
            Ok(snapshot) => snapshot.site(site_id).cloned(),
            Err(e) => {
                self.core
                    .log()
                    .push(format!("site read failed (ignored): {e}"));
                None
            }
        }
    }

    fn is_noise(site: &str, cause: &str) -> bool {
        site.is_empty()
            || site.eq_ignore_ascii_case("unknown")
            || NOISE_CAUSES
                .iter()
                .any(|n| n.eq_ignore_ascii_case(cause))
    }
}

impl Agent for RcaAgent {
    fn name(&self) -> &'static str {
        self.core.name()
    }

    fn start(&self) {
        self.core.start();
    }

    fn stop(&self) {
        self.core.stop();
    }

    fn status(&self) -> AgentStatus {
        self.core.status()
    }

    fn log(&self) -> &LogRing {
        self.core.log()
    }
}
