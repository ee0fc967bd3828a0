//! Provider configuration changes and catalog persistence.

use crate::in_memory::helpers::{
    WriteGate, descriptor, harness, harness_with, name, seed_users, test_settings,
};
use backplane::config::ConfigurationError;
use backplane::manager::{
    ports::ProviderCatalogRepository, services::BackendManager, services::ManagerError,
};
use backplane::migration::{adapters::memory::InMemoryMigrationRepository, domain::MigrationStrategy};
use backplane::provider::{
    adapters::{StaticAdapterFactory, memory::InMemoryProvider},
    domain::Capability,
};
use mockable::DefaultClock;
use rstest::rstest;
use std::sync::Arc;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn duplicate_names_are_rejected_before_anything_changes() {
    let bp = harness(&[("alpha", 1)]).await;
    let err = bp
        .manager
        .configure(vec![descriptor("alpha", 1), descriptor("alpha", 2)])
        .await
        .expect_err("duplicate");
    assert!(matches!(
        err,
        ManagerError::Configuration(ConfigurationError::DuplicateProvider(_))
    ));
    assert_eq!(bp.bound(Capability::Database), Some(name("alpha")));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn disabling_the_bound_provider_fails_over() {
    let bp = harness(&[("alpha", 1), ("bravo", 2)]).await;
    bp.manager
        .set_provider_enabled(&name("alpha"), false)
        .await
        .expect("disable");
    assert_eq!(bp.bound(Capability::Realtime), Some(name("bravo")));

    let saved = bp.catalog.load_descriptors().await.expect("descriptors");
    let alpha = saved
        .iter()
        .find(|descriptor| descriptor.name() == &name("alpha"))
        .expect("alpha saved");
    assert!(!alpha.is_enabled());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn priority_changes_apply_to_the_next_failover() {
    let bp = harness(&[("alpha", 1), ("bravo", 2), ("charlie", 3)]).await;
    bp.manager
        .set_provider_priority(&name("charlie"), 0)
        .await
        .expect("reprioritise");
    // Existing bindings stay put.
    assert_eq!(bp.bound(Capability::Database), Some(name("alpha")));

    bp.break_provider("alpha");
    bp.manager.run_health_cycle().await.expect("health cycle");
    assert_eq!(bp.bound(Capability::Database), Some(name("charlie")));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unknown_provider_updates_are_rejected() {
    let bp = harness(&[("alpha", 1)]).await;
    let err = bp
        .manager
        .set_provider_priority(&name("ghost"), 4)
        .await
        .expect_err("unknown");
    assert!(matches!(err, ManagerError::UnknownProvider(_)));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn providers_in_a_migration_cannot_be_removed() {
    let gate = WriteGate::closed();
    let bp = harness_with(
        &[("alpha", 1), ("bravo", 2)],
        test_settings(),
        &[("bravo", gate.clone())],
    )
    .await;
    seed_users(&bp, "alpha", 3);
    let plan = bp
        .migrate(Capability::Database, "bravo", MigrationStrategy::Gradual)
        .await;

    let err = bp
        .manager
        .configure(vec![descriptor("alpha", 1)])
        .await
        .expect_err("bravo in use");
    assert!(matches!(
        err,
        ManagerError::Configuration(ConfigurationError::ProviderInUse { .. })
    ));

    gate.open();
    bp.manager.wait_for_migration(plan.id()).await.expect("wait");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn disabling_a_migration_target_cancels_the_plan() {
    let gate = WriteGate::closed();
    let bp = harness_with(
        &[("alpha", 1), ("bravo", 2)],
        test_settings(),
        &[("bravo", gate.clone())],
    )
    .await;
    seed_users(&bp, "alpha", 3);
    let plan = bp
        .migrate(Capability::Database, "bravo", MigrationStrategy::Gradual)
        .await;

    bp.manager
        .set_provider_enabled(&name("bravo"), false)
        .await
        .expect("disable target");
    gate.open();
    let finished = bp.manager.wait_for_migration(plan.id()).await.expect("wait");

    assert!(finished.status().is_terminal());
    assert_eq!(bp.bound(Capability::Database), Some(name("alpha")));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn restart_prefers_saved_bindings() {
    let bp = harness(&[("alpha", 1), ("bravo", 2)]).await;
    bp.break_provider("alpha");
    bp.manager.run_health_cycle().await.expect("health cycle");
    assert_eq!(bp.bound(Capability::Storage), Some(name("bravo")));

    let factory = StaticAdapterFactory::new()
        .with(Arc::new(InMemoryProvider::new(name("alpha"))))
        .and_then(|factory| factory.with(Arc::new(InMemoryProvider::new(name("bravo")))))
        .expect("factory");
    let restarted = BackendManager::new(
        test_settings(),
        Arc::new(InMemoryMigrationRepository::new()),
        Arc::clone(&bp.catalog),
        Arc::new(factory),
        Arc::new(DefaultClock),
    );
    restarted
        .configure_from_catalog()
        .await
        .expect("configure from catalog");

    let storage = restarted
        .router()
        .current(Capability::Storage)
        .expect("route")
        .state()
        .provider()
        .cloned();
    assert_eq!(storage, Some(name("bravo")));
}
