// ── Incident bus ──
//
// In-process pub/sub with a bounded ring buffer. Publishing never blocks:
// delivery rides a broadcast channel, so a slow subscriber lags (losing
// its own oldest undelivered events) without holding anyone else up.
// New subscribers are hydrated with up to the last five buffered events.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::model::BusEvent;

pub const RING_CAPACITY: usize = 100;
pub const HYDRATION_DEPTH: usize = 5;

const CHANNEL_CAPACITY: usize = 256;

/// A live subscription: recent backlog for hydration plus the live feed.
pub struct BusSubscription {
    pub backlog: Vec<Arc<BusEvent>>,
    pub receiver: broadcast::Receiver<Arc<BusEvent>>,
}

pub struct IncidentBus {
    ring: Mutex<VecDeque<Arc<BusEvent>>>,
    tx: broadcast::Sender<Arc<BusEvent>>,
}

impl IncidentBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            ring: Mutex::new(VecDeque::with_capacity(RING_CAPACITY)),
            tx,
        }
    }

    /// Append to the ring (drop-oldest at capacity) and deliver to all
    /// current subscribers. Returns the shared event for callers that
    /// want to keep a handle.
    pub fn publish(&self, event: BusEvent) -> Arc<BusEvent> {
        let event = Arc::new(event);
        {
            let mut ring = self.ring.lock().expect("bus ring poisoned");
            if ring.len() == RING_CAPACITY {
                ring.pop_front();
            }
            ring.push_back(Arc::clone(&event));
        }
        // No receivers is fine — the ring still records the event.
        let _ = self.tx.send(Arc::clone(&event));
        event
    }

    /// Register a live consumer. The receiver is created under the ring
    /// lock so the backlog and the live feed never overlap or gap.
    pub fn subscribe(&self) -> BusSubscription {
        let ring = self.ring.lock().expect("bus ring poisoned");
        let receiver = self.tx.subscribe();
        let skip = ring.len().saturating_sub(HYDRATION_DEPTH);
        let backlog = ring.iter().skip(skip).cloned().collect();
        BusSubscription { backlog, receiver }
    }

    /// Snapshot copy of the ring for diagnostic endpoints.
    pub fn recent_events(&self) -> Vec<Arc<BusEvent>> {
        self.ring
            .lock()
            .expect("bus ring poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for IncidentBus {
    fn default() -> Self {
        Self::new()
    }
}
