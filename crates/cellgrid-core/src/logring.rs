// ── Bounded log ring with fan-out ──
//
// Every operator-visible log line lands in one of these: the supervisor
// has one, and each agent has its own. Appends are timestamped ISO-8601,
// kept in a bounded ring, and pushed to all attached subscribers; a slow
// subscriber lags on its broadcast receiver without affecting the ring
// or other subscribers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::broadcast;

use crate::model::iso_now;

pub const LOG_CAPACITY: usize = 2000;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub ts: String,
    pub line: String,
}

pub struct LogRing {
    label: String,
    entries: Mutex<VecDeque<Arc<LogEntry>>>,
    tx: broadcast::Sender<Arc<LogEntry>>,
}

impl LogRing {
    pub fn new(label: impl Into<String>) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            label: label.into(),
            entries: Mutex::new(VecDeque::with_capacity(128)),
            tx,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Append a line and fan it out. Failed subscriber writes are
    /// swallowed — delivery is best-effort.
    pub fn push(&self, line: impl Into<String>) -> Arc<LogEntry> {
        let entry = Arc::new(LogEntry {
            ts: iso_now(),
            line: line.into(),
        });

        tracing::debug!(channel = %self.label, "{}", entry.line);

        {
            let mut entries = self.entries.lock().expect("log ring poisoned");
            if entries.len() == LOG_CAPACITY {
                entries.pop_front();
            }
            entries.push_back(Arc::clone(&entry));
        }
        let _ = self.tx.send(Arc::clone(&entry));
        entry
    }

    /// Snapshot copy of the ring.
    pub fn entries(&self) -> Vec<Arc<LogEntry>> {
        self.entries
            .lock()
            .expect("log ring poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<LogEntry>> {
        self.tx.subscribe()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("log ring poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
