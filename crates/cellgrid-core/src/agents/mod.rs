// ── Agents ──
//
// The supervisor coordinates three agents: correlation (A), troubleshoot
// (B), and RCA (C). It holds them behind the small [`Agent`] lifecycle
// interface — values populated at construction time, never looked up by
// name — and calls their typed operations directly.

pub mod correlation;
pub mod rca;
pub mod troubleshoot;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::logring::LogRing;

pub use correlation::{spawn_stream_listener, CorrelationAgent, CorrelationEvent};
pub use rca::{IncidentReport, RcaAgent, RecordOutcome};
pub use troubleshoot::{MitigateError, MitigationOutcome, TroubleshootAgent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Running,
    Stopped,
}

/// Minimal lifecycle surface the supervisor drives agents through.
pub trait Agent: Send + Sync {
    fn name(&self) -> &'static str;
    fn start(&self);
    fn stop(&self);
    fn status(&self) -> AgentStatus;
    fn log(&self) -> &LogRing;
}

// ── Shared lifecycle state ───────────────────────────────────────────

/// Common run-state every agent carries: a running flag, a cancellation
/// token renewed on each start (so stop() abandons in-flight sleeps
/// without poisoning the next run), and the agent's own log ring.
pub(crate) struct AgentCore {
    name: &'static str,
    running: AtomicBool,
    started_once: AtomicBool,
    cancel: Mutex<CancellationToken>,
    log: LogRing,
}

impl AgentCore {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            running: AtomicBool::new(false),
            started_once: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
            log: LogRing::new(name),
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    /// Transition to running. Returns `false` if already running.
    pub(crate) fn start(&self) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.started_once.store(true, Ordering::SeqCst);
        let mut cancel = self.cancel.lock().expect("agent cancel poisoned");
        if cancel.is_cancelled() {
            *cancel = CancellationToken::new();
        }
        self.log.push("agent started");
        true
    }

    /// Transition to stopped, cancelling pending waits.
    pub(crate) fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.cancel.lock().expect("agent cancel poisoned").cancel();
        self.log.push("agent stopped");
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn status(&self) -> AgentStatus {
        if self.is_running() {
            AgentStatus::Running
        } else if self.started_once.load(Ordering::SeqCst) {
            AgentStatus::Stopped
        } else {
            AgentStatus::Idle
        }
    }

    /// Clone of the current run's cancellation token.
    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.lock().expect("agent cancel poisoned").clone()
    }

    pub(crate) fn log(&self) -> &LogRing {
        &self.log
    }
}
