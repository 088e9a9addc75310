// Shared fixtures: snapshot builders, a scripted fake device, and a
// fully-wired supervisor harness.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use cellgrid_api::{
    AntennaPort, AntennaState, ApiError, FleetSnapshot, PowerTarget, SiteState, SwitchState,
};
use cellgrid_core::{
    CorrelationAgent, IncidentBus, LogRing, PolicyStore, RcaAgent, SnapshotStore, Supervisor,
    TowerDevice, TroubleshootAgent,
};

// ── Snapshot builders ───────────────────────────────────────────────

pub fn healthy_site() -> SiteState {
    SiteState {
        mains: SwitchState::On,
        site_alive: true,
        battery_percent: 95,
        antenna1: AntennaState {
            service: "Available".into(),
        },
        antenna2: AntennaState {
            service: "Available".into(),
        },
        alarms: BTreeSet::new(),
    }
}

/// Mains down, both antennas out, simulator alarms raised.
pub fn outage_site() -> SiteState {
    SiteState {
        mains: SwitchState::Off,
        site_alive: true,
        battery_percent: 80,
        antenna1: AntennaState {
            service: "Unavailable".into(),
        },
        antenna2: AntennaState {
            service: "Unavailable".into(),
        },
        alarms: ["MainsFailure", "ServiceUnavailable"]
            .into_iter()
            .map(String::from)
            .collect(),
    }
}

pub fn snapshot(entries: Vec<(&str, SiteState)>) -> FleetSnapshot {
    FleetSnapshot(
        entries
            .into_iter()
            .map(|(id, site)| (id.to_owned(), site))
            .collect(),
    )
}

// ── Fake device ─────────────────────────────────────────────────────

/// In-memory simulator stand-in. Commands mutate the scripted state the
/// way a cooperative tower would; antennas marked stuck ignore `rru on`.
pub struct FakeTowerDevice {
    state: Mutex<FleetSnapshot>,
    commands: Mutex<Vec<String>>,
    stuck: Mutex<BTreeSet<(String, &'static str)>>,
}

impl FakeTowerDevice {
    pub fn new(initial: FleetSnapshot) -> Self {
        Self {
            state: Mutex::new(initial),
            commands: Mutex::new(Vec::new()),
            stuck: Mutex::new(BTreeSet::new()),
        }
    }

    /// Mutating commands issued so far (reads are not recorded).
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn set_stuck(&self, site: &str, antenna: AntennaPort) {
        self.stuck
            .lock()
            .unwrap()
            .insert((site.to_owned(), antenna.api_name()));
    }

    pub fn set_state(&self, snapshot: FleetSnapshot) {
        *self.state.lock().unwrap() = snapshot;
    }

    pub fn current_state(&self) -> FleetSnapshot {
        self.state.lock().unwrap().clone()
    }

    pub fn mutate_site(&self, id: &str, mutate: impl FnOnce(&mut SiteState)) {
        let mut state = self.state.lock().unwrap();
        if let Some(site) = state.0.get_mut(id) {
            mutate(site);
        }
    }

    fn record(&self, command: String) {
        self.commands.lock().unwrap().push(command);
    }
}

#[async_trait]
impl TowerDevice for FakeTowerDevice {
    async fn fetch_state(&self) -> Result<FleetSnapshot, ApiError> {
        Ok(self.current_state())
    }

    async fn power(&self, target: PowerTarget, state: SwitchState) -> Result<(), ApiError> {
        self.record(format!("power {} {}", target.as_str(), state.as_str()));
        let mut snapshot = self.state.lock().unwrap();
        for (id, site) in snapshot.0.iter_mut() {
            let applies = matches!(target, PowerTarget::All)
                || matches!(target, PowerTarget::Site(ref t) if t == id);
            if applies {
                site.mains = state;
                if state.is_on() {
                    site.site_alive = true;
                    site.alarms.remove("MainsFailure");
                }
            }
        }
        Ok(())
    }

    async fn rru(
        &self,
        site_id: &str,
        antenna: AntennaPort,
        state: SwitchState,
    ) -> Result<(), ApiError> {
        self.record(format!(
            "rru {site_id} {} {}",
            antenna.api_name(),
            state.as_str()
        ));
        let stuck = self
            .stuck
            .lock()
            .unwrap()
            .contains(&(site_id.to_owned(), antenna.api_name()));
        let mut snapshot = self.state.lock().unwrap();
        if let Some(site) = snapshot.0.get_mut(site_id) {
            let service = match antenna {
                AntennaPort::A1 => &mut site.antenna1,
                AntennaPort::A2 => &mut site.antenna2,
            };
            service.service = if state.is_on() && !stuck {
                "Available".into()
            } else {
                "Unavailable".into()
            };
            if site.antenna1.is_available() && site.antenna2.is_available() {
                site.alarms.remove("ServiceUnavailable");
            }
        }
        Ok(())
    }
}

// ── Supervisor harness ──────────────────────────────────────────────

pub struct Harness {
    pub bus: Arc<IncidentBus>,
    pub store: Arc<SnapshotStore>,
    pub device: Arc<FakeTowerDevice>,
    pub policy: Arc<PolicyStore>,
    pub correlation: Arc<CorrelationAgent>,
    pub troubleshoot: Arc<TroubleshootAgent>,
    pub rca: Arc<RcaAgent>,
    pub supervisor: Arc<Supervisor>,
}

pub fn harness(initial: FleetSnapshot) -> Harness {
    let device = Arc::new(FakeTowerDevice::new(initial.clone()));
    let device_dyn: Arc<dyn TowerDevice> = Arc::clone(&device) as Arc<dyn TowerDevice>;

    let bus = Arc::new(IncidentBus::new());
    let store = Arc::new(SnapshotStore::new());
    store.apply(&initial);

    let policy = Arc::new(PolicyStore::load_or_default(None));

    let correlation = Arc::new(CorrelationAgent::new(
        policy.subscribe(),
        Duration::from_secs(300),
    ));
    let troubleshoot = Arc::new(TroubleshootAgent::new(
        Arc::clone(&device_dyn),
        Arc::clone(&store),
        policy.subscribe(),
    ));
    let rca = Arc::new(RcaAgent::new(Arc::clone(&device_dyn), None, 500));

    let supervisor = Supervisor::new(
        Arc::clone(&bus),
        Arc::clone(&store),
        device_dyn,
        policy.subscribe(),
        Arc::clone(&correlation),
        Arc::clone(&troubleshoot),
        Arc::clone(&rca),
        Arc::new(LogRing::new("supervisor")),
    );

    Harness {
        bus,
        store,
        device,
        policy,
        correlation,
        troubleshoot,
        rca,
        supervisor,
    }
}
