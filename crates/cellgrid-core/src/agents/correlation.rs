//! Agent A — per-site windowed incident clustering.
//!
//! Two entry points share one grouping algorithm:
//!
//! - **Streaming**: [`handle_stream_event`](CorrelationAgent::handle_stream_event)
//!   folds live bus events into per-site buffers, opening, extending, and
//!   closing incidents as the window dictates.
//! - **Batch**: [`correlate`](CorrelationAgent::correlate) is stateless —
//!   filter, sort per site, group, flush. The supervisor probes it with a
//!   single event per call as a cheap "worth escalating?" check.
//!
//! Policy is read at decision time, never cached at start.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use cellgrid_api::FleetSnapshot;

use super::{Agent, AgentCore, AgentStatus};
use crate::logring::LogRing;
use crate::model::{BusEvent, CloseReason, CorrelatedEvent, Incident};
use crate::policy::{AlarmPrioritization, Policy};

/// Alarm codes that never open or extend an incident.
const NOISE_CODES: [&str; 3] = ["unknown", "heartbeat", "noop"];

/// Substrings that mark an alarm code as critical (case-insensitive).
const CRITICAL_PATTERNS: [&str; 3] = ["serviceunavailable", "heartbeatfailure", "mainsfailure"];

/// Bound on retained closed incidents per site.
const CLOSED_CAPACITY: usize = 100;

/// A minimal event view for correlation.
#[derive(Debug, Clone)]
pub struct CorrelationEvent {
    pub site: String,
    pub code: String,
    pub ts: DateTime<Utc>,
}

#[derive(Default)]
struct SiteBuffer {
    open: Option<Incident>,
    closed: Vec<Incident>,
}

pub struct CorrelationAgent {
    core: AgentCore,
    policy: watch::Receiver<Policy>,
    window: chrono::Duration,
    buffers: Mutex<HashMap<String, SiteBuffer>>,
}

impl CorrelationAgent {
    pub fn new(policy: watch::Receiver<Policy>, window: Duration) -> Self {
        Self {
            core: AgentCore::new("correlation"),
            policy,
            window: chrono::Duration::from_std(window)
                .unwrap_or_else(|_| chrono::Duration::minutes(5)),
            buffers: Mutex::new(HashMap::new()),
        }
    }

    // ── Filters ──────────────────────────────────────────────────────

    fn is_noise(site: &str, code: &str) -> bool {
        site.is_empty()
            || site.eq_ignore_ascii_case("unknown")
            || NOISE_CODES
                .iter()
                .any(|n| n.eq_ignore_ascii_case(code))
    }

    fn is_critical(code: &str) -> bool {
        let lowered = code.to_ascii_lowercase();
        CRITICAL_PATTERNS.iter().any(|p| lowered.contains(p))
    }

    /// Noise plus the policy-conditioned critical filter, read at
    /// decision time.
    fn admits(&self, site: &str, code: &str) -> bool {
        if Self::is_noise(site, code) {
            return false;
        }
        let prioritization = self.policy.borrow().alarm_prioritization;
        if prioritization == AlarmPrioritization::CriticalFirst && !Self::is_critical(code) {
            return false;
        }
        true
    }

    // ── Batch mode ───────────────────────────────────────────────────

    /// Filter, group per site by the correlation window, and return every
    /// incident formed. Stateless: the streaming buffers are untouched.
    pub fn correlate(&self, events: &[CorrelationEvent]) -> Vec<Incident> {
        let mut by_site: HashMap<&str, Vec<&CorrelationEvent>> = HashMap::new();
        for event in events {
            if self.admits(&event.site, &event.code) {
                by_site.entry(&event.site).or_default().push(event);
            }
        }

        let mut incidents = Vec::new();
        let mut sites: Vec<&str> = by_site.keys().copied().collect();
        sites.sort_unstable();

        for site in sites {
            let mut site_events = by_site.remove(site).unwrap_or_default();
            site_events.sort_by_key(|e| e.ts);

            let mut open: Option<Incident> = None;
            for event in site_events {
                let correlated = CorrelatedEvent {
                    site: event.site.clone(),
                    code: event.code.clone(),
                    ts: event.ts,
                };
                match open.as_mut() {
                    None => open = Some(Incident::open(correlated)),
                    Some(incident)
                        if event.ts.signed_duration_since(incident.start) <= self.window =>
                    {
                        incident.extend(correlated);
                    }
                    Some(_) => {
                        let closed = open
                            .take()
                            .map(|i| i.close(CloseReason::WindowElapsed));
                        incidents.extend(closed);
                        open = Some(Incident::open(correlated));
                    }
                }
            }
            incidents.extend(open.take().map(|i| i.close(CloseReason::Flush)));
        }
        incidents
    }

    // ── Streaming mode ───────────────────────────────────────────────

    /// Fold one live bus event into the per-site buffers. Only alarm
    /// events and snapshots matter here; everything else passes through.
    pub fn handle_stream_event(&self, event: &BusEvent) {
        if !self.core.is_running() {
            return;
        }
        match event {
            BusEvent::StateUpdate { payload, .. } => self.observe_snapshot(payload),
            BusEvent::AlarmRaised {
                site, alarm, ts, ..
            } => self.observe_alarm(site, alarm, ts, false),
            BusEvent::AlarmCleared {
                site, alarm, ts, ..
            } => self.observe_alarm(site, alarm, ts, true),
            _ => {}
        }
    }

    /// A snapshot showing a site back on mains and alive closes its open
    /// incident: service restored.
    fn observe_snapshot(&self, snapshot: &FleetSnapshot) {
        let mut buffers = self.buffers.lock().expect("correlation buffers poisoned");
        for (site, state) in snapshot.sites() {
            if state.mains.is_on() && state.site_alive {
                if let Some(buffer) = buffers.get_mut(site) {
                    if let Some(open) = buffer.open.take() {
                        self.finish(buffer, open, CloseReason::ServiceRestored);
                    }
                }
            }
        }
    }

    fn observe_alarm(&self, site: &str, alarm: &str, ts: &str, cleared: bool) {
        if !self.admits(site, alarm) {
            return;
        }
        let ts = parse_ts(ts);
        let correlated = CorrelatedEvent {
            site: site.to_owned(),
            code: alarm.to_owned(),
            ts,
        };

        let mut buffers = self.buffers.lock().expect("correlation buffers poisoned");
        let buffer = buffers.entry(site.to_owned()).or_default();

        match buffer.open.as_mut() {
            None => {
                buffer.open = Some(Incident::open(correlated));
                self.core
                    .log()
                    .push(format!("incident.started site={site} type={alarm}"));
            }
            Some(incident) if ts.signed_duration_since(incident.start) <= self.window => {
                incident.extend(correlated);
            }
            Some(_) => {
                let open = buffer.open.take();
                if let Some(open) = open {
                    self.finish(buffer, open, CloseReason::WindowElapsed);
                }
                buffer.open = Some(Incident::open(correlated));
                self.core
                    .log()
                    .push(format!("incident.started site={site} type={alarm}"));
            }
        }

        // A clear that leaves no critical codes behind ends the cluster.
        if cleared {
            if let Some(incident) = buffer.open.as_mut() {
                incident.types.remove(alarm);
                if !incident.types.iter().any(|code| Self::is_critical(code)) {
                    let open = buffer.open.take();
                    if let Some(open) = open {
                        self.finish(buffer, open, CloseReason::AlarmCleared);
                    }
                }
            }
        }
    }

    fn finish(&self, buffer: &mut SiteBuffer, incident: Incident, reason: CloseReason) {
        let closed = incident.close(reason);
        self.core.log().push(format!(
            "incident.closed site={} count={} reason={:?}",
            closed.site, closed.count, reason
        ));
        if buffer.closed.len() == CLOSED_CAPACITY {
            buffer.closed.remove(0);
        }
        buffer.closed.push(closed);
    }

    // ── Diagnostics ──────────────────────────────────────────────────

    pub fn open_incident(&self, site: &str) -> Option<Incident> {
        self.buffers
            .lock()
            .expect("correlation buffers poisoned")
            .get(site)
            .and_then(|b| b.open.clone())
    }

    pub fn closed_incidents(&self, site: &str) -> Vec<Incident> {
        self.buffers
            .lock()
            .expect("correlation buffers poisoned")
            .get(site)
            .map(|b| b.closed.clone())
            .unwrap_or_default()
    }
}

impl Agent for CorrelationAgent {
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

/// Parse an event timestamp, falling back to now. The original string
/// stays authoritative for identity; this parse is only for window math.
fn parse_ts(ts: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Spawn the streaming-mode listener: a bus subscription folded into the
/// agent's per-site buffers for as long as the agent is running. Events
/// arriving while the agent is stopped fall through untouched.
pub fn spawn_stream_listener(
    agent: Arc<CorrelationAgent>,
    bus: &crate::bus::IncidentBus,
    cancel: tokio_util::sync::CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe().receiver;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Ok(event) => agent.handle_stream_event(&event),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    })
}
