//! Provider switches and their migration plans.

use crate::in_memory::helpers::{
    Harness, WriteGate, descriptor, descriptor_serving, harness, harness_with, name, seed_users,
    test_settings, user, users,
};
use backplane::events::ControlPlaneEvent;
use backplane::health::domain::{HealthPolicy, HealthStatus};
use backplane::manager::{
    domain::{SwitchOutcome, SwitchProviderRequest},
    services::ManagerError,
};
use backplane::migration::domain::{
    MatchRate, MigrationPlan, MigrationSettings, MigrationStatus, MigrationStrategy,
};
use backplane::migration::ports::MigrationRepository;
use backplane::provider::domain::{Capability, FunctionName, ObjectPath, RecordKey};
use backplane::routing::domain::BindingState;
use backplane::unified::{ServiceError, UnifiedServices};
use mockable::DefaultClock;
use rstest::rstest;
use std::time::Duration;
use tokio::task::JoinSet;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn immediate_migration_copies_verifies_and_cuts_over() {
    let mut bp = harness(&[("alpha", 1), ("bravo", 2)]).await;
    seed_users(&bp, "alpha", 10_000);
    bp.drain_events();

    let plan = bp
        .migrate(Capability::Database, "bravo", MigrationStrategy::Immediate)
        .await;
    assert_eq!(plan.status(), MigrationStatus::Pending);
    let finished = bp.manager.wait_for_migration(plan.id()).await.expect("wait");

    assert_eq!(finished.status(), MigrationStatus::Completed);
    assert_eq!(finished.progress().copied, 10_000);
    assert_eq!(finished.match_rate(), Some(MatchRate::from_ppm(1_000_000)));
    assert_eq!(bp.bound(Capability::Database), Some(name("bravo")));
    assert_eq!(
        bp.provider("bravo").snapshot(&users()).expect("snapshot").len(),
        10_000
    );
    // Other capabilities stay where they were.
    assert_eq!(bp.bound(Capability::Storage), Some(name("alpha")));

    let batches = bp
        .drain_events()
        .into_iter()
        .filter(|event| {
            matches!(event, ControlPlaneEvent::MigrationProgress { plan_id, .. } if *plan_id == plan.id())
        })
        .count();
    assert_eq!(batches, 10);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn gradual_backfill_reports_rising_progress_before_verifying() {
    let mut bp = harness(&[("alpha", 1), ("bravo", 2)]).await;
    seed_users(&bp, "alpha", 10_000);
    bp.drain_events();

    let plan = bp
        .migrate(Capability::Database, "bravo", MigrationStrategy::Gradual)
        .await;
    let finished = bp.manager.wait_for_migration(plan.id()).await.expect("wait");
    assert_eq!(finished.status(), MigrationStatus::Completed);

    let mut copied = Vec::new();
    let mut copied_when_verifying = None;
    for event in bp.drain_events() {
        match event {
            ControlPlaneEvent::MigrationProgress {
                plan_id,
                copied: so_far,
                ..
            } if plan_id == plan.id() => copied.push(so_far),
            ControlPlaneEvent::MigrationStatusChanged {
                plan_id,
                status: MigrationStatus::Verifying,
            } if plan_id == plan.id() => copied_when_verifying = Some(copied.clone()),
            _ => {}
        }
    }
    assert_eq!(copied.len(), 10);
    assert!(
        copied.windows(2).all(|pair| pair[0] < pair[1]),
        "progress must rise: {copied:?}"
    );
    assert_eq!(copied_when_verifying, Some(copied.clone()));
    assert_eq!(copied.last(), Some(&10_000));
}

#[rstest]
#[case::immediate(MigrationStrategy::Immediate)]
#[case::gradual(MigrationStrategy::Gradual)]
#[case::blue_green(MigrationStrategy::BlueGreen)]
#[tokio::test(flavor = "multi_thread")]
async fn records_only_the_target_held_do_not_survive_cutover(#[case] strategy: MigrationStrategy) {
    let bp = harness(&[("alpha", 1), ("bravo", 2)]).await;
    seed_users(&bp, "alpha", 10);
    bp.provider("bravo")
        .seed(&users(), [user(777)])
        .expect("seed stray target record");
    let services = UnifiedServices::new(bp.manager.router(), bp.manager.settings().calls);

    let plan = bp.migrate(Capability::Database, "bravo", strategy).await;
    let finished = bp.manager.wait_for_migration(plan.id()).await.expect("wait");

    assert_eq!(finished.status(), MigrationStatus::Completed);
    assert_eq!(finished.match_rate(), Some(MatchRate::PERFECT));
    assert_eq!(bp.bound(Capability::Database), Some(name("bravo")));
    assert_eq!(
        bp.provider("bravo").snapshot(&users()).expect("snapshot"),
        bp.provider("alpha").snapshot(&users()).expect("snapshot")
    );
    let stray = services
        .database
        .read(&users(), user(777).key())
        .await
        .expect("read");
    assert_eq!(stray, None);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn records_deleted_during_backfill_stay_deleted() {
    let gate = WriteGate::closed();
    let bp = harness_with(&[("alpha", 1), ("bravo", 2)], test_settings(), &[("bravo", gate.clone())]).await;
    seed_users(&bp, "alpha", 10);
    let services = UnifiedServices::new(bp.manager.router(), bp.manager.settings().calls);

    let plan = bp
        .migrate(Capability::Database, "bravo", MigrationStrategy::Gradual)
        .await;
    // Let the backfill read its page and block on the target.
    tokio::time::sleep(Duration::from_millis(100)).await;
    services
        .database
        .delete(&users(), user(9).key())
        .await
        .expect("delete during backfill");
    gate.open();
    let finished = bp.manager.wait_for_migration(plan.id()).await.expect("wait");

    assert_eq!(finished.status(), MigrationStatus::Completed);
    assert_eq!(bp.bound(Capability::Database), Some(name("bravo")));
    let deleted = services
        .database
        .read(&users(), user(9).key())
        .await
        .expect("read after cutover");
    assert_eq!(deleted, None);
    assert_eq!(bp.provider("bravo").snapshot(&users()).expect("snapshot").len(), 9);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_callers_lose_no_writes_across_cutover() {
    const WRITERS: usize = 8;
    const WRITES_EACH: usize = 25;
    let bp = harness(&[("alpha", 1), ("bravo", 2)]).await;
    seed_users(&bp, "alpha", 500);
    let services = UnifiedServices::new(bp.manager.router(), bp.manager.settings().calls);

    let plan = bp
        .migrate(Capability::Database, "bravo", MigrationStrategy::Gradual)
        .await;
    let mut writers = JoinSet::new();
    for writer in 0..WRITERS {
        let caller = services.clone();
        writers.spawn(async move {
            for offset in 0..WRITES_EACH {
                let index = 10_000 + writer * WRITES_EACH + offset;
                caller.database.create(&users(), user(index)).await?;
                tokio::task::yield_now().await;
            }
            Ok::<(), ServiceError>(())
        });
    }
    let finished = bp.manager.wait_for_migration(plan.id()).await.expect("wait");
    while let Some(joined) = writers.join_next().await {
        joined.expect("writer task").expect("every write succeeds");
    }

    assert_eq!(finished.status(), MigrationStatus::Completed);
    assert_eq!(bp.bound(Capability::Database), Some(name("bravo")));
    let target = bp.provider("bravo").snapshot(&users()).expect("snapshot");
    assert_eq!(target.len(), 500 + WRITERS * WRITES_EACH);
    for index in (0..WRITERS * WRITES_EACH).map(|offset| 10_000 + offset) {
        assert!(
            target.iter().any(|record| record.key() == user(index).key()),
            "write {index} was lost"
        );
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_verification_keeps_the_source_bound() {
    let bp = harness(&[("alpha", 1), ("bravo", 2)]).await;
    seed_users(&bp, "alpha", 50);
    bp.provider("bravo")
        .corrupt_reads(RecordKey::new("user-00007").expect("key"))
        .expect("corrupt");

    let plan = bp
        .migrate(Capability::Database, "bravo", MigrationStrategy::Gradual)
        .await;
    let finished = bp.manager.wait_for_migration(plan.id()).await.expect("wait");

    assert_eq!(finished.status(), MigrationStatus::Failed);
    assert!(
        finished
            .failure_reason()
            .is_some_and(|reason| reason.contains("below")),
        "unexpected reason {:?}",
        finished.failure_reason()
    );
    assert_eq!(bp.bound(Capability::Database), Some(name("alpha")));
    let checkpoints = bp.manager.checkpoints(plan.id()).await.expect("checkpoints");
    assert_eq!(checkpoints.len(), 50);
    assert_eq!(checkpoints.iter().filter(|c| !c.matched).count(), 1);

    let rolled_back = bp
        .manager
        .rollback_migration(plan.id())
        .await
        .expect("rollback");
    assert_eq!(rolled_back.status(), MigrationStatus::RolledBack);
    assert_eq!(bp.bound(Capability::Database), Some(name("alpha")));
}

async fn failed_plan(bp: &Harness) -> MigrationPlan {
    seed_users(bp, "alpha", 20);
    bp.provider("bravo")
        .corrupt_reads(RecordKey::new("user-00003").expect("key"))
        .expect("corrupt");
    let plan = bp
        .migrate(Capability::Database, "bravo", MigrationStrategy::Gradual)
        .await;
    let finished = bp.manager.wait_for_migration(plan.id()).await.expect("wait");
    assert_eq!(finished.status(), MigrationStatus::Failed);
    finished
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn rollback_requires_a_healthy_source() {
    let mut settings = test_settings();
    settings.health = HealthPolicy {
        unhealthy_after: 3,
        ..settings.health
    };
    let bp = harness_with(&[("alpha", 1), ("bravo", 2)], settings, &[]).await;
    let plan = failed_plan(&bp).await;

    bp.break_provider("alpha");
    bp.manager.run_health_cycle().await.expect("health cycle");
    assert_eq!(bp.manager.health_of(&name("alpha")), HealthStatus::Degraded);
    assert_eq!(bp.bound(Capability::Database), Some(name("alpha")));
    let err = bp
        .manager
        .rollback_migration(plan.id())
        .await
        .expect_err("degraded source");
    assert!(matches!(err, ManagerError::RollbackUnavailable { .. }));

    bp.heal_provider("alpha");
    bp.manager.run_health_cycle().await.expect("health cycle");
    let rolled_back = bp
        .manager
        .rollback_migration(plan.id())
        .await
        .expect("rollback");
    assert_eq!(rolled_back.status(), MigrationStatus::RolledBack);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn rollback_does_not_move_a_capability_back_after_failover() {
    let bp = harness(&[("alpha", 1), ("bravo", 2)]).await;
    let plan = failed_plan(&bp).await;

    bp.break_provider("alpha");
    bp.manager.run_health_cycle().await.expect("health cycle");
    assert_eq!(bp.bound(Capability::Database), Some(name("bravo")));
    bp.heal_provider("alpha");
    bp.manager.run_health_cycle().await.expect("health cycle");
    assert_eq!(bp.manager.health_of(&name("alpha")), HealthStatus::Healthy);

    let err = bp
        .manager
        .rollback_migration(plan.id())
        .await
        .expect_err("source no longer bound");
    assert!(matches!(err, ManagerError::RollbackUnavailable { .. }));
    assert_eq!(bp.bound(Capability::Database), Some(name("bravo")));
    let stored = bp.manager.get_migration(plan.id()).await.expect("stored");
    assert_eq!(stored.status(), MigrationStatus::Failed);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn completed_plans_cannot_be_rolled_back() {
    let bp = harness(&[("alpha", 1), ("bravo", 2)]).await;
    seed_users(&bp, "alpha", 3);
    let plan = bp
        .migrate(Capability::Database, "bravo", MigrationStrategy::Immediate)
        .await;
    bp.manager.wait_for_migration(plan.id()).await.expect("wait");

    let err = bp
        .manager
        .rollback_migration(plan.id())
        .await
        .expect_err("completed");
    assert!(matches!(err, ManagerError::RollbackUnavailable { .. }));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn only_one_migration_per_capability() {
    let gate = WriteGate::closed();
    let bp = harness_with(
        &[("alpha", 1), ("bravo", 2), ("charlie", 3)],
        test_settings(),
        &[("bravo", gate.clone())],
    )
    .await;
    seed_users(&bp, "alpha", 10);

    let plan = bp
        .migrate(Capability::Database, "bravo", MigrationStrategy::Gradual)
        .await;
    let err = bp
        .manager
        .switch_provider(SwitchProviderRequest {
            capability: Capability::Database,
            target: name("charlie"),
            strategy: MigrationStrategy::Immediate,
        })
        .await
        .expect_err("conflict");
    assert!(matches!(
        err,
        ManagerError::MigrationConflict { active, .. } if active == plan.id()
    ));

    // A different capability may move concurrently.
    let storage = bp
        .migrate(Capability::Storage, "charlie", MigrationStrategy::BlueGreen)
        .await;

    gate.open();
    let finished = bp.manager.wait_for_migration(plan.id()).await.expect("wait");
    assert_eq!(finished.status(), MigrationStatus::Completed);
    let moved = bp.manager.wait_for_migration(storage.id()).await.expect("wait");
    assert_eq!(moved.status(), MigrationStatus::Completed);
    assert_eq!(bp.bound(Capability::Database), Some(name("bravo")));
    assert_eq!(bp.bound(Capability::Storage), Some(name("charlie")));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancelling_stops_before_the_next_batch() {
    let gate = WriteGate::closed();
    let mut settings = test_settings();
    settings.migration = MigrationSettings {
        batch_size: 2,
        ..settings.migration
    };
    let bp = harness_with(&[("alpha", 1), ("bravo", 2)], settings, &[("bravo", gate.clone())]).await;
    seed_users(&bp, "alpha", 10);

    let plan = bp
        .migrate(Capability::Database, "bravo", MigrationStrategy::BlueGreen)
        .await;
    bp.manager.cancel_migration(plan.id()).await.expect("cancel");
    gate.open();
    let finished = bp.manager.wait_for_migration(plan.id()).await.expect("wait");

    assert_eq!(finished.status(), MigrationStatus::Failed);
    assert!(
        finished
            .failure_reason()
            .is_some_and(|reason| reason.contains("cancelled")),
        "unexpected reason {:?}",
        finished.failure_reason()
    );
    assert!(finished.progress().copied < 10);
    assert_eq!(bp.bound(Capability::Database), Some(name("alpha")));

    let err = bp
        .manager
        .cancel_migration(plan.id())
        .await
        .expect_err("already stopped");
    assert!(matches!(err, ManagerError::MigrationNotActive { .. }));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn gradual_migration_mirrors_live_writes() {
    let gate = WriteGate::closed();
    let bp = harness_with(&[("alpha", 1), ("bravo", 2)], test_settings(), &[("bravo", gate.clone())]).await;
    seed_users(&bp, "alpha", 5);
    let services = UnifiedServices::new(bp.manager.router(), bp.manager.settings().calls);

    let plan = bp
        .migrate(Capability::Database, "bravo", MigrationStrategy::Gradual)
        .await;
    services
        .database
        .create(&users(), user(100))
        .await
        .expect("write during migration");
    gate.open();
    let finished = bp.manager.wait_for_migration(plan.id()).await.expect("wait");

    assert_eq!(finished.status(), MigrationStatus::Completed);
    let copied = bp.provider("bravo").snapshot(&users()).expect("snapshot");
    assert_eq!(copied.len(), 6);
    assert!(copied.iter().any(|record| record.key().as_str() == "user-00100"));
    assert_eq!(bp.bound(Capability::Database), Some(name("bravo")));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn immediate_migration_holds_writes_until_cutover() {
    let gate = WriteGate::closed();
    let bp = harness_with(&[("alpha", 1), ("bravo", 2)], test_settings(), &[("bravo", gate.clone())]).await;
    seed_users(&bp, "alpha", 4);
    let services = UnifiedServices::new(bp.manager.router(), bp.manager.settings().calls);

    let plan = bp
        .migrate(Capability::Database, "bravo", MigrationStrategy::Immediate)
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let held = tokio::time::timeout(
        Duration::from_millis(100),
        services.database.create(&users(), user(200)),
    )
    .await;
    assert!(held.is_err(), "write should wait for the pause to end");

    gate.open();
    bp.manager.wait_for_migration(plan.id()).await.expect("wait");
    services
        .database
        .create(&users(), user(200))
        .await
        .expect("write after cutover");
    let target = bp.provider("bravo").snapshot(&users()).expect("snapshot");
    assert_eq!(target.len(), 5);
    assert_eq!(bp.provider("alpha").snapshot(&users()).expect("snapshot").len(), 4);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn blue_green_moves_storage_objects() {
    let bp = harness(&[("alpha", 1), ("bravo", 2)]).await;
    let services = UnifiedServices::new(bp.manager.router(), bp.manager.settings().calls);
    for index in 0..12 {
        services
            .storage
            .put(
                &ObjectPath::new(format!("avatars/{index}.png")).expect("path"),
                vec![u8::try_from(index).expect("small index"); 16],
            )
            .await
            .expect("put");
    }

    let plan = bp
        .migrate(Capability::Storage, "bravo", MigrationStrategy::BlueGreen)
        .await;
    let finished = bp.manager.wait_for_migration(plan.id()).await.expect("wait");

    assert_eq!(finished.status(), MigrationStatus::Completed);
    let fetched = services
        .storage
        .get(&ObjectPath::new("avatars/7.png").expect("path"))
        .await
        .expect("get");
    assert_eq!(fetched, Some(vec![7; 16]));
    assert_eq!(bp.bound(Capability::Storage), Some(name("bravo")));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn capabilities_without_data_switch_after_an_empty_copy() {
    let bp = harness(&[("alpha", 1), ("bravo", 2)]).await;
    let plan = bp
        .migrate(Capability::Auth, "bravo", MigrationStrategy::Immediate)
        .await;
    let finished = bp.manager.wait_for_migration(plan.id()).await.expect("wait");

    assert_eq!(finished.status(), MigrationStatus::Completed);
    assert_eq!(finished.progress().copied, 0);
    assert_eq!(bp.bound(Capability::Auth), Some(name("bravo")));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn switch_targets_are_validated() {
    let bp = harness(&[("alpha", 1), ("bravo", 2)]).await;
    let request = |target: &str| SwitchProviderRequest {
        capability: Capability::Realtime,
        target: name(target),
        strategy: MigrationStrategy::Immediate,
    };

    let unknown = bp.manager.switch_provider(request("zulu")).await;
    assert!(matches!(unknown, Err(ManagerError::UnknownProvider(_))));

    let same = bp.manager.switch_provider(request("alpha")).await;
    assert!(matches!(same, Err(ManagerError::AlreadyBound { .. })));

    bp.break_provider("bravo");
    bp.manager.run_health_cycle().await.expect("health cycle");
    let unhealthy = bp.manager.switch_provider(request("bravo")).await;
    assert!(matches!(unhealthy, Err(ManagerError::ProviderUnhealthy { .. })));

    bp.heal_provider("bravo");
    bp.manager.run_health_cycle().await.expect("health cycle");
    bp.manager
        .set_provider_enabled(&name("bravo"), false)
        .await
        .expect("disable");
    let disabled = bp.manager.switch_provider(request("bravo")).await;
    assert!(matches!(disabled, Err(ManagerError::ProviderDisabled(_))));

    // Capabilities are fixed per descriptor; narrowing means re-adding.
    bp.manager
        .configure(vec![descriptor("alpha", 1)])
        .await
        .expect("drop bravo");
    bp.manager
        .configure(vec![
            descriptor("alpha", 1),
            descriptor_serving("bravo", 2, &[Capability::Storage]),
        ])
        .await
        .expect("re-add bravo");
    let unsupported = bp.manager.switch_provider(request("bravo")).await;
    assert!(matches!(
        unsupported,
        Err(ManagerError::CapabilityNotSupported { .. })
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn capabilities_nobody_serves_are_unbound() {
    let bp = harness(&[("alpha", 1)]).await;
    bp.manager.configure(Vec::new()).await.expect("remove alpha");
    bp.manager
        .configure(vec![descriptor_serving("alpha", 1, &[Capability::Database])])
        .await
        .expect("re-add narrowed alpha");

    assert_eq!(bp.bound(Capability::Database), Some(name("alpha")));
    let status = bp.manager.get_status().await.expect("status");
    assert_eq!(
        status.binding(Capability::Functions),
        Some(&BindingState::Unbound)
    );

    let services = UnifiedServices::new(bp.manager.router(), bp.manager.settings().calls);
    let err = services
        .functions
        .invoke(&FunctionName::new("noop").expect("name"), serde_json::json!({}))
        .await
        .expect_err("unbound");
    assert!(!err.is_no_healthy_provider());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn restart_resumes_gradual_plans_and_fails_the_rest() {
    let bp = harness(&[("alpha", 1), ("bravo", 2)]).await;
    seed_users(&bp, "alpha", 25);
    let clock = DefaultClock;

    let mut resumable = MigrationPlan::new(
        Capability::Database,
        name("alpha"),
        name("bravo"),
        MigrationStrategy::Gradual,
        &clock,
    )
    .expect("plan");
    resumable.start(&clock).expect("start");
    bp.migrations.insert(&resumable).await.expect("insert");

    let mut interrupted = MigrationPlan::new(
        Capability::Storage,
        name("alpha"),
        name("bravo"),
        MigrationStrategy::Immediate,
        &clock,
    )
    .expect("plan");
    interrupted.start(&clock).expect("start");
    bp.migrations.insert(&interrupted).await.expect("insert");

    bp.manager.start().await.expect("start");
    let resumed = bp
        .manager
        .wait_for_migration(resumable.id())
        .await
        .expect("wait");
    let failed = bp
        .manager
        .get_migration(interrupted.id())
        .await
        .expect("get");
    bp.manager.shutdown().expect("shutdown");

    assert_eq!(resumed.status(), MigrationStatus::Completed);
    assert_eq!(bp.bound(Capability::Database), Some(name("bravo")));
    assert_eq!(failed.status(), MigrationStatus::Failed);
    assert_eq!(failed.failure_reason(), Some("interrupted by restart"));
    assert_eq!(bp.bound(Capability::Storage), Some(name("alpha")));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn switch_outcome_reports_the_plan() {
    let bp = harness(&[("alpha", 1), ("bravo", 2)]).await;
    let outcome = bp
        .manager
        .switch_provider(SwitchProviderRequest {
            capability: Capability::Functions,
            target: name("bravo"),
            strategy: MigrationStrategy::BlueGreen,
        })
        .await
        .expect("switch");
    let plan = outcome.plan().cloned().expect("migrating outcome");
    assert!(matches!(outcome, SwitchOutcome::Migrating { .. }));
    let stored = bp.manager.get_migration(plan.id()).await.expect("stored");
    assert_eq!(stored.id(), plan.id());
    bp.manager.wait_for_migration(plan.id()).await.expect("wait");
}
