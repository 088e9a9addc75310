// Agent A: window grouping (batch + streaming), noise/critical filters,
// and the snapshot-driven service-restored close.

mod common;

use std::time::Duration;

use chrono::{TimeZone, Utc};

use cellgrid_core::model::{BusEvent, CloseReason, EventSource};
use cellgrid_core::{
    Agent, CorrelationAgent, CorrelationEvent, Policy, PolicyPatch, PolicyStore,
};

use common::{healthy_site, snapshot};

const WINDOW: Duration = Duration::from_secs(300);

fn agent() -> (PolicyStore, CorrelationAgent) {
    let store = PolicyStore::new(Policy::default(), None);
    let agent = CorrelationAgent::new(store.subscribe(), WINDOW);
    (store, agent)
}

fn event(site: &str, code: &str, offset_secs: i64) -> CorrelationEvent {
    CorrelationEvent {
        site: site.into(),
        code: code.into(),
        ts: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
            + chrono::Duration::seconds(offset_secs),
    }
}

// ── Batch mode ──────────────────────────────────────────────────────

#[test]
fn windowed_clustering_splits_on_window_from_start() {
    let (_store, agent) = agent();

    // T, T+4m, T+6m with a 5-minute window: [T, T+4m] and [T+6m, T+6m].
    let incidents = agent.correlate(&[
        event("S1", "MainsFailure", 0),
        event("S1", "ServiceUnavailable", 4 * 60),
        event("S1", "ServiceUnavailable", 6 * 60),
    ]);

    assert_eq!(incidents.len(), 2);
    assert_eq!(incidents[0].count, 2);
    assert_eq!(incidents[0].start, event("S1", "", 0).ts);
    assert_eq!(incidents[0].end, event("S1", "", 4 * 60).ts);
    assert_eq!(incidents[0].reason, Some(CloseReason::WindowElapsed));
    assert_eq!(incidents[1].count, 1);
    assert_eq!(incidents[1].start, event("S1", "", 6 * 60).ts);
    assert_eq!(incidents[1].reason, Some(CloseReason::Flush));
}

#[test]
fn window_boundary_is_inclusive() {
    let (_store, agent) = agent();

    let incidents = agent.correlate(&[
        event("S1", "MainsFailure", 0),
        event("S1", "MainsFailure", 300),
    ]);
    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0].count, 2);

    let incidents = agent.correlate(&[
        event("S1", "MainsFailure", 0),
        event("S1", "MainsFailure", 301),
    ]);
    assert_eq!(incidents.len(), 2);
}

#[test]
fn batch_sorts_out_of_order_events() {
    let (_store, agent) = agent();

    let incidents = agent.correlate(&[
        event("S1", "ServiceUnavailable", 120),
        event("S1", "MainsFailure", 0),
    ]);

    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0].count, 2);
    assert!(incidents[0].start < incidents[0].end);
}

#[test]
fn incident_invariants_hold() {
    let (_store, agent) = agent();
    let incidents = agent.correlate(&[
        event("S1", "MainsFailure", 0),
        event("S1", "ServiceUnavailable", 60),
        event("S2", "MainsFailure", 0),
    ]);

    for incident in &incidents {
        assert!(incident.start <= incident.end);
        assert!(!incident.types.is_empty());
        assert_eq!(incident.count, incident.events.len());
    }
    assert_eq!(incidents.len(), 2);
}

#[test]
fn noise_events_are_rejected() {
    let (_store, agent) = agent();

    assert!(agent.correlate(&[event("unknown", "MainsFailure", 0)]).is_empty());
    assert!(agent.correlate(&[event("S1", "heartbeat", 0)]).is_empty());
    assert!(agent.correlate(&[event("S1", "NOOP", 0)]).is_empty());
    assert!(agent.correlate(&[event("", "MainsFailure", 0)]).is_empty());
}

#[test]
fn critical_first_drops_non_critical_codes() {
    let (store, agent) = agent();

    assert!(agent.correlate(&[event("S1", "FanSpeedHigh", 0)]).is_empty());
    // Substring match is case-insensitive.
    assert_eq!(agent.correlate(&[event("S1", "mainsfailure", 0)]).len(), 1);

    store
        .patch(
            &PolicyPatch {
                alarm_prioritization: Some("Adaptive Correlation".into()),
                ..Default::default()
            },
            "test",
        )
        .unwrap();

    // Policy is read at decision time: the same agent now admits it.
    assert_eq!(agent.correlate(&[event("S1", "FanSpeedHigh", 0)]).len(), 1);
}

// ── Streaming mode ──────────────────────────────────────────────────

fn raised(site: &str, alarm: &str, ts: &str) -> BusEvent {
    BusEvent::AlarmRaised {
        site: site.into(),
        alarm: alarm.into(),
        ts: ts.into(),
        source: EventSource::Stream,
        bootstrap: false,
    }
}

fn cleared(site: &str, alarm: &str, ts: &str) -> BusEvent {
    BusEvent::AlarmCleared {
        site: site.into(),
        alarm: alarm.into(),
        ts: ts.into(),
        source: EventSource::Stream,
    }
}

#[test]
fn streaming_opens_and_extends_incidents() {
    let (_store, agent) = agent();
    agent.start();

    agent.handle_stream_event(&raised("S1", "MainsFailure", "2025-01-01T00:00:00Z"));
    agent.handle_stream_event(&raised("S1", "ServiceUnavailable", "2025-01-01T00:02:00Z"));

    let open = agent.open_incident("S1").unwrap();
    assert_eq!(open.count, 2);
    assert!(open.types.contains("MainsFailure"));
    assert!(open.types.contains("ServiceUnavailable"));
}

#[test]
fn streaming_ignores_events_while_stopped() {
    let (_store, agent) = agent();

    agent.handle_stream_event(&raised("S1", "MainsFailure", "2025-01-01T00:00:00Z"));
    assert!(agent.open_incident("S1").is_none());
}

#[test]
fn clear_of_last_critical_closes_early() {
    let (_store, agent) = agent();
    agent.start();

    agent.handle_stream_event(&raised("S1", "MainsFailure", "2025-01-01T00:00:00Z"));
    agent.handle_stream_event(&cleared("S1", "MainsFailure", "2025-01-01T00:01:00Z"));

    assert!(agent.open_incident("S1").is_none());
    let closed = agent.closed_incidents("S1");
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].reason, Some(CloseReason::AlarmCleared));
}

#[test]
fn snapshot_with_mains_and_liveness_restored_closes_open_incident() {
    let (_store, agent) = agent();
    agent.start();

    agent.handle_stream_event(&raised("S1", "MainsFailure", "2025-01-01T00:00:00Z"));
    assert!(agent.open_incident("S1").is_some());

    agent.handle_stream_event(&BusEvent::state_update(
        snapshot(vec![("S1", healthy_site())]),
        "2025-01-01T00:03:00Z".into(),
    ));

    assert!(agent.open_incident("S1").is_none());
    let closed = agent.closed_incidents("S1");
    assert_eq!(closed.last().unwrap().reason, Some(CloseReason::ServiceRestored));
}

#[test]
fn window_elapsed_closes_and_reopens() {
    let (_store, agent) = agent();
    agent.start();

    agent.handle_stream_event(&raised("S1", "MainsFailure", "2025-01-01T00:00:00Z"));
    agent.handle_stream_event(&raised("S1", "MainsFailure", "2025-01-01T00:06:00Z"));

    let closed = agent.closed_incidents("S1");
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].reason, Some(CloseReason::WindowElapsed));
    let open = agent.open_incident("S1").unwrap();
    assert_eq!(open.count, 1);
}
