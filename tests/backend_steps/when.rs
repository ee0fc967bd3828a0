//! When steps for backend manager BDD scenarios.

use super::world::{BackendWorld, run_async};
use backplane::manager::domain::SwitchProviderRequest;
use backplane::migration::domain::MigrationStrategy;
use backplane::provider::{
    domain::{Capability, CollectionName, ProviderName, RecordKey},
    ports::ProviderError,
};
use rstest_bdd_macros::when;

#[when(r#"provider "{name}" stops answering probes"#)]
fn provider_stops(world: &mut BackendWorld, name: String) -> Result<(), eyre::Report> {
    world
        .provider(&name)?
        .fail_probes(ProviderError::connection("connection refused"))?;
    Ok(())
}

#[when(r#"provider "{name}" answers probes again"#)]
fn provider_recovers(world: &mut BackendWorld, name: String) -> Result<(), eyre::Report> {
    world.provider(&name)?.heal_probes()?;
    Ok(())
}

#[when("a health cycle runs")]
fn health_cycle_runs(world: &mut BackendWorld) -> Result<(), eyre::Report> {
    run_async(world.manager.run_health_cycle())
        .map_err(|err| eyre::eyre!("health cycle failed: {err}"))?;
    Ok(())
}

#[when(r#"a record is read from "{collection}""#)]
fn record_is_read(world: &mut BackendWorld, collection: String) -> Result<(), eyre::Report> {
    let collection_name = CollectionName::new(collection)?;
    let key = RecordKey::new("user-00000")?;
    world.last_call_error = run_async(world.services.database.read(&collection_name, &key)).err();
    Ok(())
}

#[when(
    r#"capability "{capability}" is switched to "{target}" using the "{strategy}" strategy"#
)]
fn capability_switched(
    world: &mut BackendWorld,
    capability: String,
    target: String,
    strategy: String,
) -> Result<(), eyre::Report> {
    let request = SwitchProviderRequest {
        capability: Capability::try_from(capability.as_str())?,
        target: ProviderName::new(target)?,
        strategy: MigrationStrategy::try_from(strategy.as_str())?,
    };
    match run_async(world.manager.switch_provider(request)) {
        Ok(outcome) => world.last_plan = outcome.plan().cloned(),
        Err(err) => world.last_switch_error = Some(err),
    }
    Ok(())
}

#[when("the migration finishes")]
fn migration_finishes(world: &mut BackendWorld) -> Result<(), eyre::Report> {
    let plan = world
        .last_plan
        .as_ref()
        .ok_or_else(|| eyre::eyre!("no migration started in scenario world"))?;
    let finished = run_async(world.manager.wait_for_migration(plan.id()))
        .map_err(|err| eyre::eyre!("waiting for migration failed: {err}"))?;
    world.last_plan = Some(finished);
    Ok(())
}

#[when("the migration is rolled back")]
fn migration_rolled_back(world: &mut BackendWorld) -> Result<(), eyre::Report> {
    let plan = world
        .last_plan
        .as_ref()
        .ok_or_else(|| eyre::eyre!("no migration started in scenario world"))?;
    let rolled_back = run_async(world.manager.rollback_migration(plan.id()))
        .map_err(|err| eyre::eyre!("rollback failed: {err}"))?;
    world.last_plan = Some(rolled_back);
    Ok(())
}
