//! Supervisor — lifecycle, per-event orchestration, approvals, and the
//! operator log.
//!
//! The supervisor owns the run-state machine (idle → running ↔ paused →
//! stopped → idle), consumes bus events strictly one at a time, and
//! coordinates the three agents per event: correlation probe, an
//! "investigating" case, then mitigation — executed directly under E2E
//! automation, or parked in the approval queue under human-in-the-loop.
//! Errors inside an event never escape to the bus; they end in the log.

mod approvals;
mod ledger;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use approvals::ApprovalQueue;
pub use ledger::{DuplicateLedger, LEDGER_CAPACITY, LEDGER_TTL};

use crate::agents::{
    Agent, AgentStatus, CorrelationAgent, CorrelationEvent, IncidentReport, MitigateError,
    MitigationOutcome, RcaAgent, RecordOutcome, TroubleshootAgent,
};
use crate::bus::IncidentBus;
use crate::device::TowerDevice;
use crate::logring::LogRing;
use crate::model::{
    iso_now, Approval, ApprovalDecision, BusEvent, EventSource, PlanStep, Resolution,
};
use crate::policy::Policy;
use crate::store::SnapshotStore;

// ── Run status ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Idle,
    Running,
    Paused,
    Stopped,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        }
    }
}

/// Outcome of a lifecycle operation. Invalid transitions are no-ops with
/// a descriptive message, not errors.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleResponse {
    pub changed: bool,
    pub status: RunStatus,
    pub message: String,
}

impl LifecycleResponse {
    fn changed(status: RunStatus, message: impl Into<String>) -> Self {
        Self {
            changed: true,
            status,
            message: message.into(),
        }
    }

    fn unchanged(status: RunStatus, message: impl Into<String>) -> Self {
        Self {
            changed: false,
            status,
            message: message.into(),
        }
    }
}

/// Operator-facing snapshot of the supervisor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub runtime_secs: u64,
    pub tasks_routed: u64,
    pub last_note: Option<String>,
    pub approvals_pending: usize,
    pub auto_override: bool,
    pub policy_version: u64,
    pub agents: Vec<AgentSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    pub name: &'static str,
    pub status: AgentStatus,
}

// ── Supervisor ───────────────────────────────────────────────────────

struct RuntimeState {
    started_at: Option<DateTime<Utc>>,
    accumulated_runtime: Duration,
    tasks_routed: u64,
    last_note: Option<String>,
    auto_override: bool,
}

pub struct Supervisor {
    status: watch::Sender<RunStatus>,
    state: Mutex<RuntimeState>,
    log: Arc<LogRing>,
    ledger: Mutex<DuplicateLedger>,
    approvals: Mutex<ApprovalQueue>,
    registry: Vec<Arc<dyn Agent>>,
    correlation: Arc<CorrelationAgent>,
    troubleshoot: Arc<TroubleshootAgent>,
    rca: Arc<RcaAgent>,
    policy: watch::Receiver<Policy>,
    device: Arc<dyn TowerDevice>,
    store: Arc<SnapshotStore>,
    bus: Arc<IncidentBus>,
}

impl Supervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bus: Arc<IncidentBus>,
        store: Arc<SnapshotStore>,
        device: Arc<dyn TowerDevice>,
        policy: watch::Receiver<Policy>,
        correlation: Arc<CorrelationAgent>,
        troubleshoot: Arc<TroubleshootAgent>,
        rca: Arc<RcaAgent>,
        log: Arc<LogRing>,
    ) -> Arc<Self> {
        let (status, _) = watch::channel(RunStatus::Idle);
        let registry: Vec<Arc<dyn Agent>> = vec![
            Arc::clone(&correlation) as Arc<dyn Agent>,
            Arc::clone(&troubleshoot) as Arc<dyn Agent>,
            Arc::clone(&rca) as Arc<dyn Agent>,
        ];
        Arc::new(Self {
            status,
            state: Mutex::new(RuntimeState {
                started_at: None,
                accumulated_runtime: Duration::ZERO,
                tasks_routed: 0,
                last_note: None,
                auto_override: false,
            }),
            log,
            ledger: Mutex::new(DuplicateLedger::new()),
            approvals: Mutex::new(ApprovalQueue::new()),
            registry,
            correlation,
            troubleshoot,
            rca,
            policy,
            device,
            store,
            bus,
        })
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// idle|stopped → running (paused delegates to [`resume`](Self::resume)).
    /// Starts all agents, then runs the one-shot cold-start sweep so
    /// pre-existing faults become actionable.
    pub async fn start(&self) -> LifecycleResponse {
        let current = *self.status.borrow();
        match current {
            RunStatus::Running => LifecycleResponse::unchanged(current, "Already running"),
            RunStatus::Paused => self.resume(),
            RunStatus::Idle | RunStatus::Stopped => {
                self.state.lock().expect("supervisor state poisoned").started_at =
                    Some(Utc::now());
                let _ = self.status.send(RunStatus::Running);
                for agent in &self.registry {
                    agent.start();
                }
                self.log.push("supervisor started");
                self.cold_start_sweep().await;
                LifecycleResponse::changed(RunStatus::Running, "started")
            }
        }
    }

    /// running|paused → stopped. Accumulates runtime and stops all agents.
    pub fn stop(&self) -> LifecycleResponse {
        let current = *self.status.borrow();
        match current {
            RunStatus::Running | RunStatus::Paused => {
                self.accumulate_runtime();
                let _ = self.status.send(RunStatus::Stopped);
                for agent in &self.registry {
                    agent.stop();
                }
                self.log.push("supervisor stopped");
                LifecycleResponse::changed(RunStatus::Stopped, "stopped")
            }
            _ => LifecycleResponse::unchanged(current, "Not running"),
        }
    }

    /// running → paused. Events received while paused are ignored.
    pub fn pause(&self) -> LifecycleResponse {
        let current = *self.status.borrow();
        match current {
            RunStatus::Running => {
                self.accumulate_runtime();
                let _ = self.status.send(RunStatus::Paused);
                self.log.push("supervisor paused");
                LifecycleResponse::changed(RunStatus::Paused, "paused")
            }
            _ => LifecycleResponse::unchanged(current, "Not running"),
        }
    }

    /// paused → running. Re-asserts agent running state.
    pub fn resume(&self) -> LifecycleResponse {
        let current = *self.status.borrow();
        match current {
            RunStatus::Paused => {
                self.state.lock().expect("supervisor state poisoned").started_at =
                    Some(Utc::now());
                let _ = self.status.send(RunStatus::Running);
                for agent in &self.registry {
                    agent.start();
                }
                self.log.push("supervisor resumed");
                LifecycleResponse::changed(RunStatus::Running, "resumed")
            }
            _ => LifecycleResponse::unchanged(current, "Not paused"),
        }
    }

    pub fn status(&self) -> RunStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<RunStatus> {
        self.status.subscribe()
    }

    fn accumulate_runtime(&self) {
        let mut state = self.state.lock().expect("supervisor state poisoned");
        if let Some(started) = state.started_at.take() {
            state.accumulated_runtime +=
                (Utc::now() - started).to_std().unwrap_or(Duration::ZERO);
        }
    }

    /// Total seconds spent running, accumulated across pause/stop windows.
    pub fn runtime_secs(&self) -> u64 {
        let state = self.state.lock().expect("supervisor state poisoned");
        let mut total = state.accumulated_runtime;
        if let Some(started) = state.started_at {
            total += (Utc::now() - started).to_std().unwrap_or(Duration::ZERO);
        }
        total.as_secs()
    }

    // ── Operator surface ─────────────────────────────────────────────

    pub fn summary(&self) -> Summary {
        let (started_at, tasks_routed, last_note, auto_override) = {
            let state = self.state.lock().expect("supervisor state poisoned");
            (
                state.started_at,
                state.tasks_routed,
                state.last_note.clone(),
                state.auto_override,
            )
        };
        Summary {
            status: self.status(),
            started_at,
            runtime_secs: self.runtime_secs(),
            tasks_routed,
            last_note,
            approvals_pending: self.approvals.lock().expect("approvals poisoned").len(),
            auto_override,
            policy_version: self.policy.borrow().version,
            agents: self
                .registry
                .iter()
                .map(|a| AgentSummary {
                    name: a.name(),
                    status: a.status(),
                })
                .collect(),
        }
    }

    pub fn note(&self, message: impl Into<String>) {
        let message = message.into();
        self.log.push(format!("note: {message}"));
        self.state.lock().expect("supervisor state poisoned").last_note = Some(message);
    }

    /// Manual override of `autoEffective` — mitigations execute even
    /// under a human-intervention policy while this is on.
    pub fn set_auto_override(&self, on: bool) {
        self.state.lock().expect("supervisor state poisoned").auto_override = on;
        self.log.push(format!("auto override set to {on}"));
    }

    pub fn auto_override(&self) -> bool {
        self.state.lock().expect("supervisor state poisoned").auto_override
    }

    pub fn log(&self) -> &Arc<LogRing> {
        &self.log
    }

    // ── Approvals ────────────────────────────────────────────────────

    pub fn list_approvals(&self) -> Vec<Approval> {
        self.approvals.lock().expect("approvals poisoned").list()
    }

    /// Remove the approval exactly once. Unknown ids answer `None` and
    /// are otherwise indistinguishable from a no-op. Resolution is a pure
    /// record — the next alarm for the site re-drives the pipeline.
    pub fn resolve_approval(&self, id: &str, decision: ApprovalDecision) -> Option<Approval> {
        let removed = self.approvals.lock().expect("approvals poisoned").resolve(id);
        match &removed {
            Some(approval) => self.log.push(format!(
                "approval.resolved id={id} site={} decision={}",
                approval.site,
                decision.as_str()
            )),
            None => self.log.push(format!("approval.not_found id={id}")),
        };
        removed
    }

    pub fn approve(&self, id: &str) -> Option<Approval> {
        self.resolve_approval(id, ApprovalDecision::Approved)
    }

    pub fn reject(&self, id: &str) -> Option<Approval> {
        self.resolve_approval(id, ApprovalDecision::Rejected)
    }

    // ── Event consumption ────────────────────────────────────────────

    /// Spawn the sequential consumer: one event is handled to completion
    /// before the next is taken from the bus. The subscription's hydration
    /// backlog is deliberately skipped — the cold-start sweep already
    /// covers pre-existing faults.
    pub fn spawn_event_loop(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let subscription = self.bus.subscribe();
        tokio::spawn(async move {
            let mut rx = subscription.receiver;
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    event = rx.recv() => match event {
                        Ok(event) => self.handle_event(&event).await,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            self.log.push(format!("bus.lagged dropped={n}"));
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        })
    }

    /// Handle one bus event to completion. Any failure is caught here and
    /// logged; nothing propagates back to the bus.
    pub async fn handle_event(&self, event: &BusEvent) {
        if let Err(e) = self.process_event(event).await {
            self.log
                .push(format!("event.error type={}: {e}", event.event_type()));
        }
    }

    async fn process_event(&self, event: &BusEvent) -> Result<(), crate::error::CoreError> {
        // Exact-duplicate suppression comes first: a mirrored event is
        // consumed even if the supervisor is paused.
        let key = event.ledger_key();
        if self
            .ledger
            .lock()
            .expect("ledger poisoned")
            .check_and_record(&key)
        {
            self.log.push(format!("event.duplicate {key}"));
            return Ok(());
        }

        let status = self.status();
        if status != RunStatus::Running {
            self.log.push(format!(
                "event.ignored status={} type={}",
                status.as_str(),
                event.event_type()
            ));
            return Ok(());
        }

        let Some(site) = event.site_id().map(str::to_owned) else {
            self.log
                .push(format!("event.skipped no-site type={}", event.event_type()));
            return Ok(());
        };
        if site.is_empty() {
            self.log
                .push(format!("event.skipped no-site type={}", event.event_type()));
            return Ok(());
        }

        if !matches!(
            event,
            BusEvent::AlarmRaised { .. } | BusEvent::ServiceChanged { .. }
        ) {
            self.log
                .push(format!("event.skipped type={}", event.event_type()));
            return Ok(());
        }

        // Probe Agent A with this single event: anything worth escalating?
        if self.correlation.status() != AgentStatus::Running {
            self.correlation.start();
        }
        let code = event
            .alarm()
            .unwrap_or_else(|| event.event_type())
            .to_owned();
        let ts = DateTime::parse_from_rfc3339(event.ts())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        let incidents = self.correlation.correlate(&[CorrelationEvent {
            site: site.clone(),
            code: code.clone(),
            ts,
        }]);
        if incidents.is_empty() {
            self.store.rebroadcast();
            return Ok(());
        }
        self.log
            .push(format!("incident.detected site={site} code={code}"));

        // Open an investigating case; failures are logged, never fatal.
        let investigating = self
            .rca
            .record_incident(IncidentReport {
                site: site.clone(),
                cause: code.clone(),
                actions: Vec::new(),
                resolution: Resolution::Investigating,
            })
            .await;
        if let RecordOutcome::Skipped { reason } = investigating {
            self.log
                .push(format!("case.skipped site={site} reason={reason}"));
        }

        let auto_override = self.auto_override();
        let auto_effective = self.policy.borrow().ways_of_working.is_auto() || auto_override;

        if self.troubleshoot.status() != AgentStatus::Running {
            self.troubleshoot.start();
        }

        if !auto_effective {
            // HITL: convert Agent B's plan into a queued approval.
            match self.troubleshoot.mitigate_site(&site, false).await {
                Err(MitigateError::ApprovalRequired { plan, .. }) => {
                    let approval = self.enqueue_approval(&site, &code, plan);
                    self.log
                        .push(format!("approval.queued id={} site={site}", approval.id));
                }
                Err(e) => {
                    self.log.push(format!("mitigation.refused site={site}: {e}"));
                }
                // Policy flipped to automation mid-flight; keep the result.
                Ok(outcome) => self.record_final_case(&site, &code, &outcome).await,
            }
            self.store.rebroadcast();
            return Ok(());
        }

        // E2E automation: route the task and record the final case.
        self.state
            .lock()
            .expect("supervisor state poisoned")
            .tasks_routed += 1;
        match self.troubleshoot.mitigate_site(&site, auto_override).await {
            Ok(outcome) => self.record_final_case(&site, &code, &outcome).await,
            Err(e) => {
                self.log.push(format!("mitigation.failed site={site}: {e}"));
            }
        }
        self.store.rebroadcast();
        Ok(())
    }

    fn enqueue_approval(&self, site: &str, code: &str, plan: Vec<PlanStep>) -> Approval {
        self.approvals
            .lock()
            .expect("approvals poisoned")
            .enqueue(
                site.to_owned(),
                plan,
                format!("mitigation of {code} on {site}"),
            )
    }

    async fn record_final_case(&self, site: &str, code: &str, outcome: &MitigationOutcome) {
        let resolution = if outcome.all_clear {
            Resolution::Restored
        } else {
            Resolution::Stabilized
        };
        self.log.push(format!(
            "mitigation.done site={site} allClear={} passes={}",
            outcome.all_clear, outcome.passes
        ));
        let recorded = self
            .rca
            .record_incident(IncidentReport {
                site: site.to_owned(),
                cause: code.to_owned(),
                actions: outcome.actions_taken.clone(),
                resolution,
            })
            .await;
        if let RecordOutcome::Skipped { reason } = recorded {
            self.log
                .push(format!("case.skipped site={site} reason={reason}"));
        }
    }

    // ── Cold-start sweep ─────────────────────────────────────────────

    /// Fetch a fresh snapshot and feed every present alarm through the
    /// normal orchestration path as a synthesized `alarm.raised`.
    async fn cold_start_sweep(&self) {
        let snapshot = match self.device.fetch_state().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.log.push(format!("coldstart.skipped: {e}"));
                return;
            }
        };
        self.store.apply(&snapshot);

        let ts = iso_now();
        let mut synthesized = Vec::new();
        for (site, state) in snapshot.sites() {
            for alarm in &state.alarms {
                synthesized.push(BusEvent::AlarmRaised {
                    site: site.clone(),
                    alarm: alarm.clone(),
                    ts: ts.clone(),
                    source: EventSource::ColdStart,
                    bootstrap: false,
                });
            }
        }
        if !synthesized.is_empty() {
            self.log
                .push(format!("coldstart.sweep {} alarm(s)", synthesized.len()));
        }
        for event in synthesized {
            self.handle_event(&event).await;
        }
    }
}
