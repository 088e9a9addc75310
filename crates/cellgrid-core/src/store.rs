// ── Reactive fleet snapshot store ──
//
// Thread-safe cache of the last known fleet state. Per-site reads are
// lock-free via `DashMap`; whole-fleet mutations rebuild the snapshot
// that `watch` subscribers receive. The bridge is the only writer.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

use cellgrid_api::{FleetSnapshot, SiteState};

pub struct SnapshotStore {
    sites: DashMap<String, Arc<SiteState>>,
    version: watch::Sender<u64>,
    snapshot: watch::Sender<Arc<FleetSnapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(FleetSnapshot::default()));
        Self {
            sites: DashMap::new(),
            version,
            snapshot,
        }
    }

    /// Full replace from a fresh simulator snapshot.
    pub fn apply(&self, snapshot: &FleetSnapshot) {
        self.sites.clear();
        for (id, site) in snapshot.sites() {
            self.sites.insert(id.clone(), Arc::new(site.clone()));
        }
        self.snapshot
            .send_modify(|current| *current = Arc::new(snapshot.clone()));
        self.version.send_modify(|v| *v += 1);
    }

    /// Last known state of one site.
    pub fn site(&self, id: &str) -> Option<Arc<SiteState>> {
        self.sites.get(id).map(|r| Arc::clone(r.value()))
    }

    /// Cheap clone of the current full snapshot.
    pub fn snapshot(&self) -> Arc<FleetSnapshot> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot replacements.
    pub fn subscribe(&self) -> watch::Receiver<Arc<FleetSnapshot>> {
        self.snapshot.subscribe()
    }

    /// Re-notify subscribers with the current snapshot. The supervisor
    /// calls this after orchestration passes so live views refresh even
    /// when the underlying state did not change shape.
    pub fn rebroadcast(&self) {
        self.snapshot.send_modify(|_| {});
    }

    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub fn site_count(&self) -> usize {
        self.sites.len()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
