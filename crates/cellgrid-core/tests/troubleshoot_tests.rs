// Agent B: plan gating, HITL refusal, heal-loop success and exhaustion.
// Timed waits run under paused time so the whole suite is instant.

mod common;

use std::sync::Arc;
use std::time::Duration;

use cellgrid_api::AntennaPort;
use cellgrid_core::{
    Agent, MitigateError, Policy, PolicyPatch, PolicyStore, SnapshotStore, TowerDevice,
    TroubleshootAgent,
};

use common::{healthy_site, outage_site, snapshot, FakeTowerDevice};

struct Fixture {
    device: Arc<FakeTowerDevice>,
    store: Arc<SnapshotStore>,
    policy: Arc<PolicyStore>,
    agent: TroubleshootAgent,
}

fn fixture(initial: cellgrid_api::FleetSnapshot) -> Fixture {
    let device = Arc::new(FakeTowerDevice::new(initial.clone()));
    let store = Arc::new(SnapshotStore::new());
    store.apply(&initial);
    let policy = Arc::new(PolicyStore::new(Policy::default(), None));
    let agent = TroubleshootAgent::new(
        Arc::clone(&device) as Arc<dyn TowerDevice>,
        Arc::clone(&store),
        policy.subscribe(),
    );
    Fixture {
        device,
        store,
        policy,
        agent,
    }
}

#[tokio::test(start_paused = true)]
async fn refuses_when_not_running() {
    let f = fixture(snapshot(vec![("S1", outage_site())]));
    let err = f.agent.mitigate_site("S1", false).await.unwrap_err();
    assert!(matches!(err, MitigateError::NotRunning));
}

#[tokio::test(start_paused = true)]
async fn unknown_site_is_refused() {
    let f = fixture(snapshot(vec![("S1", outage_site())]));
    f.agent.start();
    let err = f.agent.mitigate_site("S9", false).await.unwrap_err();
    assert!(matches!(err, MitigateError::SiteNotFound(ref s) if s == "S9"));
}

#[tokio::test(start_paused = true)]
async fn hitl_returns_plan_without_device_calls() {
    let f = fixture(snapshot(vec![("S1", outage_site())]));
    f.policy
        .patch(
            &PolicyPatch {
                ways_of_working: Some("Human intervention at critical steps".into()),
                ..Default::default()
            },
            "test",
        )
        .unwrap();
    f.agent.start();

    let err = f.agent.mitigate_site("S1", false).await.unwrap_err();
    match err {
        MitigateError::ApprovalRequired { site, plan, alarms } => {
            assert_eq!(site, "S1");
            assert_eq!(plan.len(), 3);
            assert_eq!(plan[0].to_string(), "power.on(S1)");
            assert_eq!(plan[1].to_string(), "rru.ensure(S1, a1)");
            assert_eq!(plan[2].to_string(), "rru.ensure(S1, a2)");
            assert!(alarms.contains(&"Mains.Off".to_owned()));
        }
        other => panic!("expected ApprovalRequired, got {other:?}"),
    }
    assert!(f.device.commands().is_empty());
}

#[tokio::test(start_paused = true)]
async fn auto_override_executes_despite_hitl_policy() {
    let f = fixture(snapshot(vec![("S1", outage_site())]));
    f.policy
        .patch(
            &PolicyPatch {
                ways_of_working: Some("Human intervention at critical steps".into()),
                ..Default::default()
            },
            "test",
        )
        .unwrap();
    f.agent.start();

    let outcome = f.agent.mitigate_site("S1", true).await.unwrap();
    assert!(outcome.all_clear);
    assert!(!f.device.commands().is_empty());
}

#[tokio::test(start_paused = true)]
async fn mains_outage_heals_to_all_clear() {
    let f = fixture(snapshot(vec![("S1", outage_site())]));
    f.agent.start();

    let outcome = f.agent.mitigate_site("S1", false).await.unwrap();

    assert!(outcome.ok);
    assert!(outcome.all_clear);
    assert!(outcome.remaining_alarms.is_empty());
    assert!(outcome.cleared_alarms.contains(&"Mains.Off".to_owned()));
    assert!(outcome
        .actions_taken
        .iter()
        .any(|a| a == "power.on(S1)"));

    let commands = f.device.commands();
    assert_eq!(commands[0], "power S1 on");
    assert!(commands.iter().any(|c| c == "rru S1 a1 on"));
    assert!(commands.iter().any(|c| c == "rru S1 a2 on"));

    let site = outcome.site.unwrap();
    assert!(site.mains.is_on());
    assert!(site.antenna1.is_available());
    assert!(site.antenna2.is_available());
}

#[tokio::test(start_paused = true)]
async fn stuck_antenna_survives_as_remaining_alarm() {
    let mut site = healthy_site();
    site.antenna1.service = "Unavailable".into();
    let f = fixture(snapshot(vec![("S1", site)]));
    f.device.set_stuck("S1", AntennaPort::A1);
    f.agent.start();

    let outcome = f.agent.mitigate_site("S1", false).await.unwrap();

    assert!(outcome.ok);
    assert!(!outcome.all_clear);
    assert!(outcome
        .remaining_alarms
        .contains(&"Antenna.A1.Unavailable".to_owned()));
    assert_eq!(outcome.passes, 3);
    // Healthy head was never touched.
    assert!(!f.device.commands().iter().any(|c| c.contains("a2")));
}

#[tokio::test(start_paused = true)]
async fn heal_loop_stops_after_first_success() {
    let mut site = healthy_site();
    site.antenna2.service = "Unavailable".into();
    let f = fixture(snapshot(vec![("S1", site)]));
    f.agent.start();

    let outcome = f.agent.mitigate_site("S1", false).await.unwrap();
    assert!(outcome.all_clear);

    // One `rru on` heals the cooperative fake; no off/on cycling after.
    let rru_commands: Vec<_> = f
        .device
        .commands()
        .into_iter()
        .filter(|c| c.starts_with("rru"))
        .collect();
    assert_eq!(rru_commands, vec!["rru S1 a2 on"]);
}

#[tokio::test(start_paused = true)]
async fn low_battery_autonomy_sheds_second_antenna() {
    let mut site = healthy_site();
    site.mains = cellgrid_api::SwitchState::Off;
    site.battery_percent = 25;
    let f = fixture(snapshot(vec![("S1", site)]));
    f.agent.start();

    let outcome = f.agent.mitigate_site("S1", false).await.unwrap();

    assert!(outcome
        .actions_taken
        .iter()
        .any(|a| a == "rru.off(S1, a2)"));
    // The fake restores mains on power.on, so the shed is the only off.
    assert!(f.device.commands().iter().any(|c| c == "rru S1 a2 off"));
}

#[tokio::test(start_paused = true)]
async fn stop_mid_run_abandons_mitigation() {
    let f = fixture(snapshot(vec![("S1", outage_site())]));
    f.agent.start();
    f.agent.stop();

    let err = f.agent.mitigate_site("S1", false).await.unwrap_err();
    assert!(matches!(err, MitigateError::NotRunning));
}

#[tokio::test(start_paused = true)]
async fn planning_uses_cached_snapshot_not_device() {
    // Store still shows the outage; the device has quietly recovered.
    let f = fixture(snapshot(vec![("S1", healthy_site())]));
    f.store.apply(&snapshot(vec![("S1", outage_site())]));
    f.policy
        .patch(
            &PolicyPatch {
                ways_of_working: Some("human intervention at critical steps".into()),
                ..Default::default()
            },
            "test",
        )
        .unwrap();
    f.agent.start();

    let err = f.agent.mitigate_site("S1", false).await.unwrap_err();
    match err {
        MitigateError::ApprovalRequired { plan, .. } => assert_eq!(plan.len(), 3),
        other => panic!("expected ApprovalRequired, got {other:?}"),
    }
}
