//! `PostgreSQL` provider catalog persistence tests.

use backplane::manager::adapters::postgres::PostgresProviderCatalog;
use backplane::manager::ports::ProviderCatalogRepository;
use backplane::provider::domain::{
    Capability, CapabilitySet, ConnectionParams, PostgresConnection, ProviderDescriptor,
    ProviderName,
};
use backplane::routing::domain::{BindingReason, BindingState, CapabilityBinding};
use chrono::Utc;
use rstest::{fixture, rstest};

use crate::postgres::helpers::{BoxError, TestDatabase, test_database};

struct CatalogContext {
    catalog: PostgresProviderCatalog,
    _db: TestDatabase,
}

#[fixture]
fn context(test_database: Result<TestDatabase, BoxError>) -> Result<CatalogContext, BoxError> {
    let db = test_database?;
    Ok(CatalogContext {
        catalog: PostgresProviderCatalog::new(db.pool.clone()),
        _db: db,
    })
}

fn name(value: &str) -> ProviderName {
    ProviderName::new(value).expect("valid name")
}

fn memory_descriptor(provider: &str, priority: u32) -> ProviderDescriptor {
    ProviderDescriptor::new(
        name(provider),
        priority,
        CapabilitySet::new()
            .with(Capability::Database)
            .with(Capability::Realtime),
        ConnectionParams::Memory,
    )
    .expect("valid descriptor")
}

fn postgres_descriptor(provider: &str) -> ProviderDescriptor {
    ProviderDescriptor::new(
        name(provider),
        5,
        CapabilitySet::new()
            .with(Capability::Database)
            .with(Capability::Storage),
        ConnectionParams::Postgres(
            PostgresConnection::new("postgres://app@db.internal:5432/app", 8)
                .expect("valid connection"),
        ),
    )
    .expect("valid descriptor")
    .with_enabled(false)
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn descriptors_keep_their_saved_order(
    context: Result<CatalogContext, BoxError>,
) -> Result<(), BoxError> {
    let ctx = context?;
    let saved = vec![
        memory_descriptor("zulu", 1),
        postgres_descriptor("alpha"),
        memory_descriptor("mike", 0),
    ];
    ctx.catalog.save_descriptors(&saved).await?;

    assert_eq!(ctx.catalog.load_descriptors().await?, saved);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn saving_descriptors_replaces_the_previous_list(
    context: Result<CatalogContext, BoxError>,
) -> Result<(), BoxError> {
    let ctx = context?;
    ctx.catalog
        .save_descriptors(&[memory_descriptor("alpha", 0), memory_descriptor("bravo", 1)])
        .await?;
    let replacement = vec![memory_descriptor("bravo", 0)];
    ctx.catalog.save_descriptors(&replacement).await?;

    assert_eq!(ctx.catalog.load_descriptors().await?, replacement);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn each_binding_state_shape_survives_a_reload(
    context: Result<CatalogContext, BoxError>,
) -> Result<(), BoxError> {
    let ctx = context?;
    let bound = BindingState::Bound(CapabilityBinding {
        capability: Capability::Database,
        provider: name("alpha"),
        reason: BindingReason::Failover,
        bound_at: Utc::now(),
    });
    let outage = BindingState::NoHealthyProvider {
        previous: Some(name("bravo")),
        since: Utc::now(),
    };

    ctx.catalog
        .save_binding(Capability::Database, &BindingState::Unbound)
        .await?;
    ctx.catalog.save_binding(Capability::Database, &bound).await?;
    ctx.catalog.save_binding(Capability::Storage, &outage).await?;
    ctx.catalog
        .save_binding(Capability::Auth, &BindingState::Unbound)
        .await?;

    let mut loaded = ctx.catalog.load_bindings().await?;
    loaded.sort_by_key(|(capability, _)| capability.as_str());
    assert_eq!(
        loaded,
        vec![
            (Capability::Auth, BindingState::Unbound),
            (Capability::Database, bound),
            (Capability::Storage, outage),
        ]
    );
    Ok(())
}
