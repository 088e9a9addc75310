//! Agent B — bounded mitigation of a site's faults.
//!
//! Given a site, derives discrete alarms from its snapshot, builds an
//! ordered recovery plan, and (when policy or the manual override allows)
//! executes it against the device: mains power, radio-heal loops with a
//! fixed attempt budget, and up to three alarm sweeps. Every wait is
//! bounded and cancellable; device failures are swallowed per call and
//! observed as persistent alarms on the next read.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use cellgrid_api::{AntennaPort, PowerTarget, SiteState, SwitchState};

use super::{Agent, AgentCore, AgentStatus};
use crate::device::TowerDevice;
use crate::logring::LogRing;
use crate::model::alarms::{
    antenna_for_alarm, detect_alarms_with_battery, is_actionable, LOW_BATTERY_THRESHOLD,
    MAINS_OFF,
};
use crate::model::PlanStep;
use crate::policy::Policy;
use crate::store::SnapshotStore;

// ── Timing budget ────────────────────────────────────────────────────

/// Settle time after a mains power command before any further step.
const BOOT_SETTLE: Duration = Duration::from_millis(2500);
/// Breather between consecutive plan steps.
const STEP_GAP: Duration = Duration::from_millis(500);

const HEAL_ATTEMPTS: u32 = 3;
const HEAL_SETTLE: Duration = Duration::from_millis(1200);
const HEAL_OFF_GAP: Duration = Duration::from_millis(400);
const BOOT_WAIT_POLLS: u32 = 3;

const SWEEP_LIMIT: u32 = 3;
const SWEEP_READ_POLLS: u32 = 2;
const SWEEP_READ_GAP: Duration = Duration::from_millis(1200);
const SWEEP_BOOT_POLLS: u32 = 3;
const SWEEP_BOOT_GAP: Duration = Duration::from_millis(1500);

// ── Results ──────────────────────────────────────────────────────────

/// Mitigation refusals. `ApprovalRequired` is a distinguishable signal,
/// not a failure — the supervisor converts it into a queued approval.
#[derive(Debug, Error)]
pub enum MitigateError {
    #[error("Agent not running")]
    NotRunning,

    #[error("site_not_found: {0}")]
    SiteNotFound(String),

    #[error("approval_required")]
    ApprovalRequired {
        site: String,
        plan: Vec<PlanStep>,
        alarms: Vec<String>,
    },
}

/// What a completed mitigation did and what it left behind.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MitigationOutcome {
    pub ok: bool,
    pub site: Option<SiteState>,
    pub actions_taken: Vec<String>,
    pub cleared_alarms: Vec<String>,
    pub remaining_alarms: Vec<String>,
    pub passes: u32,
    pub all_clear: bool,
}

// ── Agent ────────────────────────────────────────────────────────────

pub struct TroubleshootAgent {
    core: AgentCore,
    device: Arc<dyn TowerDevice>,
    store: Arc<SnapshotStore>,
    policy: watch::Receiver<Policy>,
}

impl TroubleshootAgent {
    pub fn new(
        device: Arc<dyn TowerDevice>,
        store: Arc<SnapshotStore>,
        policy: watch::Receiver<Policy>,
    ) -> Self {
        Self {
            core: AgentCore::new("troubleshoot"),
            device,
            store,
            policy,
        }
    }

    /// Decide and (if allowed) execute a recovery plan for one site.
    ///
    /// Planning reads the cached snapshot — in HITL mode the plan comes
    /// back via [`MitigateError::ApprovalRequired`] without a single
    /// device call. Execution reads live state from the device.
    /// `auto_override` is the supervisor's manual toggle; policy is read
    /// here, at decision time.
    pub async fn mitigate_site(
        &self,
        site_id: &str,
        auto_override: bool,
    ) -> Result<MitigationOutcome, MitigateError> {
        if !self.core.is_running() {
            return Err(MitigateError::NotRunning);
        }
        let cancel = self.core.cancel_token();

        let planning_site = self
            .store
            .site(site_id)
            .ok_or_else(|| MitigateError::SiteNotFound(site_id.to_owned()))?;
        let initial_alarms = detect_alarms_with_battery(&planning_site);
        let plan = build_plan(site_id, &planning_site);

        let auto = self.policy.borrow().ways_of_working.is_auto() || auto_override;
        if !auto {
            self.core.log().push(format!(
                "approval required for {site_id}: {} step(s)",
                plan.len()
            ));
            return Err(MitigateError::ApprovalRequired {
                site: site_id.to_owned(),
                plan,
                alarms: initial_alarms,
            });
        }

        self.core.log().push(format!(
            "mitigating {site_id}: {} alarm(s), {} step(s)",
            initial_alarms.len(),
            plan.len()
        ));

        let mut actions: Vec<String> = Vec::new();
        let mut last_known = (*planning_site).clone();

        // Initial plan, in order, with a breather between steps.
        for (index, step) in plan.iter().enumerate() {
            if index > 0 {
                self.pause(STEP_GAP, &cancel).await?;
            }
            self.execute_step(step, &mut actions, &mut last_known, &cancel)
                .await?;
        }

        // Alarm sweeps: re-read, re-detect, heal what remains.
        let mut passes = 0u32;
        let mut remaining: Vec<String> = Vec::new();
        while passes < SWEEP_LIMIT {
            passes += 1;

            last_known = self
                .read_site_patiently(site_id, last_known, &cancel)
                .await?;

            remaining = detect_alarms_with_battery(&last_known);
            if !remaining.iter().any(|a| is_actionable(a)) {
                break;
            }
            self.core.log().push(format!(
                "sweep {passes}: {} alarm(s) remain on {site_id}",
                remaining.len()
            ));

            for alarm in remaining.clone() {
                if let Some(port) = antenna_for_alarm(&alarm) {
                    actions.push(
                        PlanStep::RruEnsure {
                            site: site_id.to_owned(),
                            antenna: port,
                        }
                        .to_string(),
                    );
                    if let Some(site) = self.heal_antenna(site_id, port, &cancel).await? {
                        last_known = site;
                    }
                }
            }

            if remaining.iter().any(|a| a == MAINS_OFF) {
                actions.push(
                    PlanStep::PowerOn {
                        site: site_id.to_owned(),
                    }
                    .to_string(),
                );
                self.power_on(site_id, &cancel).await?;
            }
        }

        // Report the freshest state if the sweep budget ran out mid-fault.
        if remaining.iter().any(|a| is_actionable(a)) {
            if let Some(site) = self.read_site(site_id).await {
                last_known = site;
                remaining = detect_alarms_with_battery(&last_known);
            }
        }

        let cleared: Vec<String> = initial_alarms
            .iter()
            .filter(|a| !remaining.contains(a))
            .cloned()
            .collect();
        let all_clear = remaining.is_empty();

        self.core
            .log()
            .push(format!("mitigation finished for {site_id}: allClear={all_clear}"));

        Ok(MitigationOutcome {
            ok: true,
            site: Some(last_known),
            actions_taken: actions,
            cleared_alarms: cleared,
            remaining_alarms: remaining,
            passes,
            all_clear,
        })
    }

    // ── Step execution ───────────────────────────────────────────────

    async fn execute_step(
        &self,
        step: &PlanStep,
        actions: &mut Vec<String>,
        last_known: &mut SiteState,
        cancel: &CancellationToken,
    ) -> Result<(), MitigateError> {
        actions.push(step.to_string());
        match step {
            PlanStep::PowerOn { site } => self.power_on(site, cancel).await?,
            PlanStep::RruEnsure { site, antenna } => {
                if let Some(fresh) = self.heal_antenna(site, *antenna, cancel).await? {
                    *last_known = fresh;
                }
            }
            PlanStep::RruOff { site, antenna } => {
                self.try_rru(site, *antenna, SwitchState::Off).await;
            }
        }
        Ok(())
    }

    /// Drive mains power on, then hold for boot-settle.
    async fn power_on(&self, site: &str, cancel: &CancellationToken) -> Result<(), MitigateError> {
        if let Err(e) = self
            .device
            .power(PowerTarget::Site(site.to_owned()), SwitchState::On)
            .await
        {
            self.core
                .log()
                .push(format!("power.on failed (observed on next read): {e}"));
        }
        self.pause(BOOT_SETTLE, cancel).await
    }

    /// Radio-heal loop: up to [`HEAL_ATTEMPTS`] on/settle/read rounds,
    /// each falling back to an off/on cycle, terminating on the first
    /// `Available` reading. Exhaustion is surfaced per antenna as an
    /// `rru_unavailable` log line, never as an operation failure.
    async fn heal_antenna(
        &self,
        site_id: &str,
        port: AntennaPort,
        cancel: &CancellationToken,
    ) -> Result<Option<SiteState>, MitigateError> {
        let mut freshest: Option<SiteState> = None;

        for attempt in 1..=HEAL_ATTEMPTS {
            self.try_rru(site_id, port, SwitchState::On).await;
            self.pause(HEAL_SETTLE, cancel).await?;

            if let Some(site) = self.read_site(site_id).await {
                if site.antenna(port).is_available() {
                    self.core
                        .log()
                        .push(format!("healed {site_id}/{}", port.api_name()));
                    return Ok(Some(site));
                }
                // Mains is back but the site is still booting — give it time.
                if site.mains.is_on() && !site.site_alive {
                    let mut booted = site;
                    for _ in 0..BOOT_WAIT_POLLS {
                        self.pause(HEAL_SETTLE, cancel).await?;
                        if let Some(s) = self.read_site(site_id).await {
                            let alive = s.site_alive;
                            booted = s;
                            if alive {
                                break;
                            }
                        }
                    }
                    freshest = Some(booted);
                } else {
                    freshest = Some(site);
                }
            }

            // Off/on cycle, then one more reading.
            self.try_rru(site_id, port, SwitchState::Off).await;
            self.pause(HEAL_OFF_GAP, cancel).await?;
            self.try_rru(site_id, port, SwitchState::On).await;
            self.pause(HEAL_SETTLE, cancel).await?;

            if let Some(site) = self.read_site(site_id).await {
                let available = site.antenna(port).is_available();
                freshest = Some(site);
                if available {
                    self.core
                        .log()
                        .push(format!("healed {site_id}/{} after cycle", port.api_name()));
                    return Ok(freshest);
                }
            }

            self.core.log().push(format!(
                "heal attempt {attempt} failed for {site_id}/{}",
                port.api_name()
            ));
        }

        self.core
            .log()
            .push(format!("rru_unavailable: {site_id}/{}", port.api_name()));
        Ok(freshest)
    }

    // ── Device helpers ───────────────────────────────────────────────

    async fn try_rru(&self, site: &str, port: AntennaPort, state: SwitchState) {
        if let Err(e) = self.device.rru(site, port, state).await {
            self.core.log().push(format!(
                "rru {} {} failed (ignored): {e}",
                port.api_name(),
                state.as_str()
            ));
        }
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

    /// Sweep re-read: a couple of polls for a successful reading, plus
    /// extra patience while a freshly-powered site boots.
    async fn read_site_patiently(
        &self,
        site_id: &str,
        mut last_known: SiteState,
        cancel: &CancellationToken,
    ) -> Result<SiteState, MitigateError> {
        for poll in 0..SWEEP_READ_POLLS {
            if poll > 0 {
                self.pause(SWEEP_READ_GAP, cancel).await?;
            }
            if let Some(site) = self.read_site(site_id).await {
                last_known = site;
                break;
            }
        }

        if last_known.mains.is_on() && !last_known.site_alive {
            for _ in 0..SWEEP_BOOT_POLLS {
                self.pause(SWEEP_BOOT_GAP, cancel).await?;
                if let Some(site) = self.read_site(site_id).await {
                    last_known = site;
                    if last_known.site_alive {
                        break;
                    }
                }
            }
        }
        Ok(last_known)
    }

    /// Cancellable bounded wait. A stop() mid-mitigation abandons the
    /// sleep and surfaces as `NotRunning`; in-flight device requests are
    /// left to finish and their results discarded.
    async fn pause(
        &self,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), MitigateError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MitigateError::NotRunning),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

impl Agent for TroubleshootAgent {
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

// ── Plan construction ────────────────────────────────────────────────

/// Ordered recovery plan for a site's current state:
/// mains first, then each antenna, then the battery-conserving shed of
/// A2 when the site is coasting on a low battery with both heads up.
pub fn build_plan(site_id: &str, site: &SiteState) -> Vec<PlanStep> {
    let mut plan = Vec::new();

    if !site.mains.is_on() {
        plan.push(PlanStep::PowerOn {
            site: site_id.to_owned(),
        });
    }
    if !site.antenna1.is_available() {
        plan.push(PlanStep::RruEnsure {
            site: site_id.to_owned(),
            antenna: AntennaPort::A1,
        });
    }
    if !site.antenna2.is_available() {
        plan.push(PlanStep::RruEnsure {
            site: site_id.to_owned(),
            antenna: AntennaPort::A2,
        });
    }
    if !site.mains.is_on()
        && site.battery_percent < LOW_BATTERY_THRESHOLD
        && site.antenna1.is_available()
        && site.antenna2.is_available()
    {
        plan.push(PlanStep::RruOff {
            site: site_id.to_owned(),
            antenna: AntennaPort::A2,
        });
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellgrid_api::AntennaState;

    fn site(mains: SwitchState, battery: u8, a1: &str, a2: &str) -> SiteState {
        SiteState {
            mains,
            site_alive: true,
            battery_percent: battery,
            antenna1: AntennaState { service: a1.into() },
            antenna2: AntennaState { service: a2.into() },
            alarms: Default::default(),
        }
    }

    #[test]
    fn full_outage_builds_three_steps() {
        let plan = build_plan(
            "S1",
            &site(SwitchState::Off, 80, "Unavailable", "Unavailable"),
        );
        assert_eq!(
            plan,
            vec![
                PlanStep::PowerOn { site: "S1".into() },
                PlanStep::RruEnsure {
                    site: "S1".into(),
                    antenna: AntennaPort::A1
                },
                PlanStep::RruEnsure {
                    site: "S1".into(),
                    antenna: AntennaPort::A2
                },
            ]
        );
    }

    #[test]
    fn low_battery_sheds_a2_when_both_available() {
        let plan = build_plan("S1", &site(SwitchState::Off, 30, "Available", "Available"));
        assert_eq!(
            plan,
            vec![
                PlanStep::PowerOn { site: "S1".into() },
                PlanStep::RruOff {
                    site: "S1".into(),
                    antenna: AntennaPort::A2
                },
            ]
        );
    }

    #[test]
    fn low_battery_with_antenna_down_does_not_shed() {
        let plan = build_plan("S1", &site(SwitchState::Off, 30, "Available", "Unavailable"));
        assert!(!plan
            .iter()
            .any(|s| matches!(s, PlanStep::RruOff { .. })));
    }

    #[test]
    fn healthy_site_builds_empty_plan() {
        let plan = build_plan("S1", &site(SwitchState::On, 100, "Available", "Available"));
        assert!(plan.is_empty());
    }
}
