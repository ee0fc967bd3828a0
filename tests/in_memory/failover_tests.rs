//! Health-driven failover through the backend manager.

use crate::in_memory::helpers::{
    descriptor, harness, harness_from, name, test_settings, user, users,
};
use backplane::events::ControlPlaneEvent;
use backplane::health::domain::{HealthPolicy, HealthStatus};
use backplane::manager::ports::ProviderCatalogRepository;
use backplane::provider::domain::{Capability, RecordKey};
use backplane::routing::domain::{BindingReason, BindingState};
use backplane::unified::UnifiedServices;
use rstest::rstest;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn initial_bindings_follow_priority() {
    let bp = harness(&[("charlie", 3), ("alpha", 1), ("bravo", 2)]).await;

    for capability in Capability::ALL {
        assert_eq!(bp.bound(capability), Some(name("alpha")));
    }
    let status = bp.manager.get_status().await.expect("status");
    match status.binding(Capability::Database).expect("database row") {
        BindingState::Bound(bound) => assert_eq!(bound.reason, BindingReason::Initial),
        other => panic!("expected a bound capability, got {other:?}"),
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn equal_priorities_break_ties_by_name() {
    let bp = harness(&[("zulu", 1), ("mike", 1)]).await;
    assert_eq!(bp.bound(Capability::Storage), Some(name("mike")));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unhealthy_provider_fails_over_to_next_priority() {
    let mut bp = harness(&[("alpha", 1), ("bravo", 2), ("charlie", 3)]).await;
    bp.drain_events();

    bp.break_provider("alpha");
    bp.manager.run_health_cycle().await.expect("health cycle");

    assert_eq!(bp.manager.health_of(&name("alpha")), HealthStatus::Unhealthy);
    for capability in Capability::ALL {
        assert_eq!(bp.bound(capability), Some(name("bravo")));
    }
    let failovers = bp
        .drain_events()
        .into_iter()
        .filter(|event| {
            matches!(
                event,
                ControlPlaneEvent::BindingChanged {
                    reason: BindingReason::Failover,
                    ..
                }
            )
        })
        .count();
    assert_eq!(failovers, Capability::ALL.len());
}

#[rstest]
#[case::disabled_provider_ranks_last(2, 3)]
#[case::disabled_provider_ranks_ahead(3, 2)]
#[tokio::test(flavor = "multi_thread")]
async fn failover_skips_disabled_providers_and_never_fails_back(
    #[case] bravo_priority: u32,
    #[case] charlie_priority: u32,
) {
    let mut settings = test_settings();
    settings.health = HealthPolicy {
        unhealthy_after: 3,
        recover_after: 2,
        ..settings.health
    };
    let mut bp = harness_from(
        vec![
            descriptor("alpha", 1),
            descriptor("bravo", bravo_priority),
            descriptor("charlie", charlie_priority).with_enabled(false),
        ],
        settings,
        &[],
    )
    .await;
    assert_eq!(bp.bound(Capability::Database), Some(name("alpha")));
    bp.drain_events();

    bp.break_provider("alpha");
    for _ in 0..2 {
        bp.manager.run_health_cycle().await.expect("health cycle");
    }
    assert_eq!(bp.manager.health_of(&name("alpha")), HealthStatus::Degraded);
    assert_eq!(bp.bound(Capability::Database), Some(name("alpha")));

    bp.manager.run_health_cycle().await.expect("health cycle");
    assert_eq!(bp.manager.health_of(&name("alpha")), HealthStatus::Unhealthy);
    assert_eq!(bp.bound(Capability::Database), Some(name("bravo")));
    let flipped = bp.drain_events().into_iter().any(|event| {
        matches!(
            event,
            ControlPlaneEvent::BindingChanged {
                capability: Capability::Database,
                reason: BindingReason::Failover,
                ..
            }
        )
    });
    assert!(flipped, "expected a failover binding change for database");

    bp.heal_provider("alpha");
    bp.manager.run_health_cycle().await.expect("health cycle");
    assert_eq!(bp.manager.health_of(&name("alpha")), HealthStatus::Unhealthy);
    bp.manager.run_health_cycle().await.expect("health cycle");
    assert_eq!(bp.manager.health_of(&name("alpha")), HealthStatus::Healthy);
    assert_eq!(bp.bound(Capability::Database), Some(name("bravo")));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn calls_reach_the_standby_after_failover() {
    let bp = harness(&[("alpha", 1), ("bravo", 2)]).await;
    let services = UnifiedServices::new(bp.manager.router(), bp.manager.settings().calls);

    bp.break_provider("alpha");
    bp.manager.run_health_cycle().await.expect("health cycle");
    services
        .database
        .create(&users(), user(1))
        .await
        .expect("write lands on standby");

    assert_eq!(bp.provider("bravo").snapshot(&users()).expect("snapshot").len(), 1);
    assert!(bp.provider("alpha").snapshot(&users()).expect("snapshot").is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn losing_every_provider_fails_calls_fast_until_recovery() {
    let bp = harness(&[("alpha", 1), ("bravo", 2)]).await;
    let services = UnifiedServices::new(bp.manager.router(), bp.manager.settings().calls);

    bp.break_provider("alpha");
    bp.break_provider("bravo");
    bp.manager.run_health_cycle().await.expect("health cycle");

    let route = bp.manager.router().current(Capability::Database).expect("route");
    assert!(route.state().is_degraded());
    let err = services
        .database
        .read(&users(), &RecordKey::new("user-00001").expect("key"))
        .await
        .expect_err("no provider");
    assert!(err.is_no_healthy_provider());

    bp.heal_provider("bravo");
    bp.manager.run_health_cycle().await.expect("health cycle");

    assert_eq!(bp.bound(Capability::Database), Some(name("bravo")));
    let status = bp.manager.get_status().await.expect("status");
    match status.binding(Capability::Database).expect("row") {
        BindingState::Bound(bound) => assert_eq!(bound.reason, BindingReason::Recovery),
        other => panic!("expected recovery binding, got {other:?}"),
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn recovered_primary_does_not_take_bindings_back() {
    let bp = harness(&[("alpha", 1), ("bravo", 2)]).await;

    bp.break_provider("alpha");
    bp.manager.run_health_cycle().await.expect("health cycle");
    bp.heal_provider("alpha");
    bp.manager.run_health_cycle().await.expect("health cycle");

    assert_eq!(bp.manager.health_of(&name("alpha")), HealthStatus::Healthy);
    assert_eq!(bp.bound(Capability::Auth), Some(name("bravo")));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failover_is_persisted_in_the_catalog() {
    let bp = harness(&[("alpha", 1), ("bravo", 2)]).await;
    bp.break_provider("alpha");
    bp.manager.run_health_cycle().await.expect("health cycle");

    let saved = bp.catalog.load_bindings().await.expect("load bindings");
    let functions = saved
        .iter()
        .find(|(capability, _)| *capability == Capability::Functions)
        .map(|(_, state)| state.provider().cloned());
    assert_eq!(functions, Some(Some(name("bravo"))));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn background_probes_drive_failover() {
    let bp = harness(&[("alpha", 1), ("bravo", 2)]).await;
    bp.manager.start().await.expect("start");
    bp.break_provider("alpha");

    let mut waited = 0;
    while bp.bound(Capability::Database) != Some(name("bravo")) && waited < 100 {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        waited += 1;
    }
    bp.manager.shutdown().expect("shutdown");
    assert_eq!(bp.bound(Capability::Database), Some(name("bravo")));
}
