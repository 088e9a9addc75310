// Tower bridge: stream ingest, polling fallback, delta reset on
// reconnect, and the quiet-stream watchdog. Runs under paused time.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use cellgrid_api::{FleetSnapshot, StreamMessage};
use cellgrid_core::model::EventSource;
use cellgrid_core::{CoreConfig, IncidentBus, LogRing, SnapshotStore, TowerBridge, TowerDevice};

use common::{healthy_site, outage_site, snapshot, FakeTowerDevice};

struct Fixture {
    device: Arc<FakeTowerDevice>,
    store: Arc<SnapshotStore>,
    bus: Arc<IncidentBus>,
    log: Arc<LogRing>,
    bridge: Arc<TowerBridge>,
}

fn fixture(initial: FleetSnapshot, config: &CoreConfig) -> Fixture {
    let device = Arc::new(FakeTowerDevice::new(initial));
    let store = Arc::new(SnapshotStore::new());
    let bus = Arc::new(IncidentBus::new());
    let log = Arc::new(LogRing::new("supervisor"));
    let bridge = TowerBridge::new(
        Arc::clone(&device) as Arc<dyn TowerDevice>,
        Arc::clone(&store),
        Arc::clone(&bus),
        Arc::clone(&log),
        config,
    );
    Fixture {
        device,
        store,
        bus,
        log,
        bridge,
    }
}

/// Config that keeps the poll and watchdog loops out of the way.
fn stream_only_config() -> CoreConfig {
    CoreConfig {
        poll_interval_secs: 86_400,
        quiet_after_secs: 86_400,
        ..CoreConfig::default()
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test(start_paused = true)]
async fn apply_snapshot_runs_the_full_pipeline() {
    let f = fixture(snapshot(vec![]), &stream_only_config());

    // Prime, then degrade: deltas plus a state.update per application.
    f.bridge
        .apply_snapshot(&snapshot(vec![("S1", healthy_site())]), EventSource::Poll);
    f.bridge
        .apply_snapshot(&snapshot(vec![("S1", outage_site())]), EventSource::Poll);

    assert!(f.store.site("S1").is_some());

    let kinds: Vec<&str> = f
        .bus
        .recent_events()
        .iter()
        .map(|e| e.event_type())
        .collect();
    assert_eq!(
        kinds,
        vec![
            "state.update",    // first application (nothing to diff yet)
            "alarm.raised",    // MainsFailure
            "alarm.raised",    // ServiceUnavailable
            "service.changed", // antenna1
            "service.changed", // antenna2
            "state.update",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn stream_messages_flow_onto_the_bus() {
    let f = fixture(snapshot(vec![]), &stream_only_config());
    let (tx, rx) = broadcast::channel(16);
    let cancel = CancellationToken::new();
    let tasks = Arc::clone(&f.bridge).spawn(rx, cancel.clone());

    tx.send(StreamMessage::Connected).unwrap();
    wait_for(|| {
        f.bus
            .recent_events()
            .iter()
            .any(|e| e.event_type() == "bus.reconnected")
    })
    .await;

    tx.send(StreamMessage::Snapshot(Arc::new(snapshot(vec![(
        "S1",
        outage_site(),
    )]))))
    .unwrap();
    wait_for(|| f.store.site("S1").is_some()).await;

    // First snapshot after a connect is a bootstrap ingest: present
    // alarms are raised with the bootstrap marker.
    wait_for(|| {
        f.bus.recent_events().iter().any(|e| {
            matches!(
                e.as_ref(),
                cellgrid_core::BusEvent::AlarmRaised { bootstrap: true, .. }
            )
        })
    })
    .await;

    tx.send(StreamMessage::Disconnected).unwrap();
    wait_for(|| {
        f.bus
            .recent_events()
            .iter()
            .any(|e| e.event_type() == "bus.disconnected")
    })
    .await;

    cancel.cancel();
    for task in tasks {
        let _ = task.await;
    }
}

#[tokio::test(start_paused = true)]
async fn polling_keeps_ingest_alive_without_a_stream() {
    let config = CoreConfig {
        poll_interval_secs: 5,
        quiet_after_secs: 86_400,
        ..CoreConfig::default()
    };
    let f = fixture(snapshot(vec![("S1", outage_site())]), &config);
    let (_tx, rx) = broadcast::channel(16);
    let cancel = CancellationToken::new();
    let tasks = Arc::clone(&f.bridge).spawn(rx, cancel.clone());

    tokio::time::sleep(Duration::from_secs(6)).await;

    wait_for(|| f.store.site("S1").is_some()).await;
    assert!(f
        .bus
        .recent_events()
        .iter()
        .any(|e| e.event_type() == "state.update"));

    cancel.cancel();
    for task in tasks {
        let _ = task.await;
    }
}

#[tokio::test(start_paused = true)]
async fn quiet_connected_stream_warns() {
    let config = CoreConfig {
        poll_interval_secs: 86_400,
        quiet_after_secs: 15,
        ..CoreConfig::default()
    };
    let f = fixture(snapshot(vec![]), &config);
    let (tx, rx) = broadcast::channel(16);
    let cancel = CancellationToken::new();
    let tasks = Arc::clone(&f.bridge).spawn(rx, cancel.clone());

    tx.send(StreamMessage::Connected).unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;

    wait_for(|| f.log.entries().iter().any(|e| e.line.contains("stream quiet"))).await;

    // A silent but disconnected stream does not warn; the device trace
    // proves nothing else ran.
    assert!(f.device.commands().is_empty());

    cancel.cancel();
    for task in tasks {
        let _ = task.await;
    }
}
