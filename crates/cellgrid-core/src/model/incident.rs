// ── Incident domain types ──

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why an open incident was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The next event fell outside the correlation window.
    WindowElapsed,
    /// The last critical alarm in the cluster cleared.
    AlarmCleared,
    /// A snapshot showed the site back on mains and alive.
    ServiceRestored,
    /// End of a batch correlation pass.
    Flush,
}

/// One event folded into an incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelatedEvent {
    pub site: String,
    pub code: String,
    pub ts: DateTime<Utc>,
}

/// A correlation-window-merged cluster of events for one site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub site: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub count: usize,
    pub types: BTreeSet<String>,
    pub events: Vec<CorrelatedEvent>,
    pub reason: Option<CloseReason>,
}

impl Incident {
    /// Open a new incident from its first event.
    pub fn open(event: CorrelatedEvent) -> Self {
        let mut types = BTreeSet::new();
        types.insert(event.code.clone());
        Self {
            site: event.site.clone(),
            start: event.ts,
            end: event.ts,
            count: 1,
            types,
            events: vec![event],
            reason: None,
        }
    }

    /// Fold another event into this incident.
    pub fn extend(&mut self, event: CorrelatedEvent) {
        self.end = event.ts;
        self.count += 1;
        self.types.insert(event.code.clone());
        self.events.push(event);
    }

    pub fn close(mut self, reason: CloseReason) -> Self {
        self.reason = Some(reason);
        self
    }
}
