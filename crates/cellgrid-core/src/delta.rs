// ── Delta emitter ──
//
// Stateful diff over two successive compact views of the fleet snapshot:
// alarms-by-site and service-by-site. Each `ingest` emits the discrete
// events separating the new snapshot from the previous one, then swaps
// the stored views in one motion.
//
// Emission order within one call: all `alarm.raised` (sites ascending),
// then all `alarm.cleared`, then all `service.changed`. Every emission of
// one call shares a single timestamp string — consumers tolerate ties.

use std::collections::{BTreeMap, BTreeSet};

use cellgrid_api::{AntennaPort, FleetSnapshot};

use crate::model::{iso_now, BusEvent, EventSource};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SiteServices {
    antenna1: String,
    antenna2: String,
}

impl SiteServices {
    fn service(&self, port: AntennaPort) -> &str {
        match port {
            AntennaPort::A1 => &self.antenna1,
            AntennaPort::A2 => &self.antenna2,
        }
    }
}

pub struct DeltaEmitter {
    /// `None` until the first ingest — distinguishes "no prior view" from
    /// "previously saw an empty fleet".
    alarms: Option<BTreeMap<String, BTreeSet<String>>>,
    services: BTreeMap<String, SiteServices>,
    bootstrap_emit: bool,
}

impl DeltaEmitter {
    pub fn new(bootstrap_emit: bool) -> Self {
        Self {
            alarms: None,
            services: BTreeMap::new(),
            bootstrap_emit,
        }
    }

    /// Forget all prior views. Called on every stream (re)connect so no
    /// events are emitted for state that predates the new connection.
    pub fn reset(&mut self) {
        self.alarms = None;
        self.services.clear();
    }

    /// Diff the snapshot against the stored views and return the
    /// normalized events, oldest-view-relative.
    pub fn ingest(&mut self, snapshot: &FleetSnapshot, source: EventSource) -> Vec<BusEvent> {
        let ts = iso_now();
        let next_alarms: BTreeMap<String, BTreeSet<String>> = snapshot
            .sites()
            .map(|(id, site)| (id.clone(), site.alarms.clone()))
            .collect();
        let next_services: BTreeMap<String, SiteServices> = snapshot
            .sites()
            .map(|(id, site)| {
                (
                    id.clone(),
                    SiteServices {
                        antenna1: site.antenna1.service.clone(),
                        antenna2: site.antenna2.service.clone(),
                    },
                )
            })
            .collect();

        let Some(prev_alarms) = self.alarms.as_ref() else {
            let mut events = Vec::new();
            if self.bootstrap_emit {
                for (site, alarms) in &next_alarms {
                    for alarm in alarms {
                        events.push(BusEvent::AlarmRaised {
                            site: site.clone(),
                            alarm: alarm.clone(),
                            ts: ts.clone(),
                            source,
                            bootstrap: true,
                        });
                    }
                }
            }
            self.alarms = Some(next_alarms);
            self.services = next_services;
            return events;
        };

        let empty_alarms = BTreeSet::new();
        let empty_services = SiteServices::default();

        let site_keys: BTreeSet<&String> = prev_alarms
            .keys()
            .chain(next_alarms.keys())
            .chain(self.services.keys())
            .chain(next_services.keys())
            .collect();

        let mut events = Vec::new();

        for site in &site_keys {
            let prev = prev_alarms.get(*site).unwrap_or(&empty_alarms);
            let next = next_alarms.get(*site).unwrap_or(&empty_alarms);
            for alarm in next.difference(prev) {
                events.push(BusEvent::AlarmRaised {
                    site: (*site).clone(),
                    alarm: alarm.clone(),
                    ts: ts.clone(),
                    source,
                    bootstrap: false,
                });
            }
        }

        for site in &site_keys {
            let prev = prev_alarms.get(*site).unwrap_or(&empty_alarms);
            let next = next_alarms.get(*site).unwrap_or(&empty_alarms);
            for alarm in prev.difference(next) {
                events.push(BusEvent::AlarmCleared {
                    site: (*site).clone(),
                    alarm: alarm.clone(),
                    ts: ts.clone(),
                    source,
                });
            }
        }

        for site in &site_keys {
            let prev = self.services.get(*site).unwrap_or(&empty_services);
            let next = next_services.get(*site).unwrap_or(&empty_services);
            for port in AntennaPort::ALL {
                if prev.service(port) != next.service(port) {
                    events.push(BusEvent::ServiceChanged {
                        site: (*site).clone(),
                        antenna: port,
                        from: prev.service(port).to_owned(),
                        to: next.service(port).to_owned(),
                        ts: ts.clone(),
                        source,
                    });
                }
            }
        }

        self.alarms = Some(next_alarms);
        self.services = next_services;
        events
    }

    /// True once a first view has been stored.
    pub fn primed(&self) -> bool {
        self.alarms.is_some()
    }
}
