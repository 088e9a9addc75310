// Policy store: canonicalization, version accounting, rejection
// atomicity, and change notification.

use cellgrid_core::{
    AlarmPrioritization, KpiAlignment, Policy, PolicyPatch, PolicyStore, WaysOfWorking,
};

fn store() -> PolicyStore {
    PolicyStore::new(Policy::default(), None)
}

#[test]
fn defaults_are_critical_first_and_automated() {
    let policy = store().get();
    assert_eq!(policy.alarm_prioritization, AlarmPrioritization::CriticalFirst);
    assert_eq!(policy.ways_of_working, WaysOfWorking::E2eAutomation);
    assert_eq!(policy.kpi_alignment, KpiAlignment::High);
    assert_eq!(policy.version, 0);
}

#[test]
fn accepted_patch_bumps_version_by_one() {
    let store = store();
    let before = store.get();

    let updated = store
        .patch(
            &PolicyPatch {
                ways_of_working: Some("Human intervention at critical steps".into()),
                ..Default::default()
            },
            "operator",
        )
        .unwrap();

    assert_eq!(updated.version, before.version + 1);
    assert_eq!(updated.ways_of_working, WaysOfWorking::HumanIntervention);
    assert_eq!(updated.source, "operator");
    // Untouched fields survive.
    assert_eq!(updated.alarm_prioritization, before.alarm_prioritization);
}

#[test]
fn values_canonicalize_case_insensitively() {
    let store = store();
    let updated = store
        .patch(
            &PolicyPatch {
                alarm_prioritization: Some("ADAPTIVE correlation".into()),
                kpi_alignment: Some("75%".into()),
                ..Default::default()
            },
            "test",
        )
        .unwrap();

    assert_eq!(
        updated.alarm_prioritization,
        AlarmPrioritization::AdaptiveCorrelation
    );
    assert_eq!(updated.kpi_alignment, KpiAlignment::Moderate);
}

#[test]
fn invalid_value_rejects_whole_patch() {
    let store = store();
    let before = store.get();

    let result = store.patch(
        &PolicyPatch {
            ways_of_working: Some("Human intervention at critical steps".into()),
            kpi_alignment: Some("most of the time".into()),
            ..Default::default()
        },
        "test",
    );

    assert!(result.is_err());
    let after = store.get();
    assert_eq!(after.version, before.version);
    assert_eq!(after.ways_of_working, before.ways_of_working);
}

#[test]
fn empty_patch_still_counts_as_mutation() {
    let store = store();
    let updated = store.patch(&PolicyPatch::default(), "test").unwrap();
    assert_eq!(updated.version, 1);
}

#[tokio::test]
async fn subscribers_observe_changes() {
    let store = store();
    let mut rx = store.subscribe();

    store
        .patch(
            &PolicyPatch {
                ways_of_working: Some("e2e automation".into()),
                ..Default::default()
            },
            "test",
        )
        .unwrap();

    rx.changed().await.unwrap();
    assert_eq!(rx.borrow().version, 1);
}

#[test]
fn persists_and_reloads_values() {
    let dir = std::env::temp_dir().join(format!("cellgrid-policy-{}", std::process::id()));
    let path = dir.join("policy.toml");
    let _ = std::fs::remove_file(&path);

    {
        let store = PolicyStore::load_or_default(Some(path.clone()));
        store
            .patch(
                &PolicyPatch {
                    ways_of_working: Some("Human intervention at critical steps".into()),
                    ..Default::default()
                },
                "operator",
            )
            .unwrap();
    }

    let reloaded = PolicyStore::load_or_default(Some(path.clone()));
    assert_eq!(
        reloaded.get().ways_of_working,
        WaysOfWorking::HumanIntervention
    );
    let _ = std::fs::remove_file(&path);
}
