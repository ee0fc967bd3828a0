//! Then steps for backend manager BDD scenarios.

use super::world::BackendWorld;
use backplane::manager::services::ManagerError;
use backplane::provider::domain::{Capability, CollectionName};
use rstest_bdd_macros::then;

#[then(r#"capability "{capability}" is bound to "{provider}""#)]
fn capability_bound_to(
    world: &BackendWorld,
    capability: String,
    provider: String,
) -> Result<(), eyre::Report> {
    let parsed = Capability::try_from(capability.as_str())?;
    let route = world
        .manager
        .router()
        .current(parsed)
        .map_err(|err| eyre::eyre!("route read failed: {err}"))?;
    let bound = route.state().provider().map(|name| name.as_str().to_owned());
    if bound.as_deref() != Some(provider.as_str()) {
        return Err(eyre::eyre!(
            "expected {capability} on '{provider}', found {bound:?}"
        ));
    }
    Ok(())
}

#[then("the call fails because no provider is healthy")]
fn call_fails_without_healthy_provider(world: &BackendWorld) -> Result<(), eyre::Report> {
    match &world.last_call_error {
        Some(err) if err.is_no_healthy_provider() => Ok(()),
        other => Err(eyre::eyre!("expected a no-healthy-provider error, got {other:?}")),
    }
}

#[then(r#"the migration status is "{status}""#)]
fn migration_status_is(world: &BackendWorld, status: String) -> Result<(), eyre::Report> {
    let plan = world
        .last_plan
        .as_ref()
        .ok_or_else(|| eyre::eyre!("no migration in scenario world"))?;
    if plan.status().as_str() != status {
        return Err(eyre::eyre!(
            "expected status '{status}', found '{}' ({:?})",
            plan.status(),
            plan.failure_reason()
        ));
    }
    Ok(())
}

#[then(r#"provider "{name}" holds {count:usize} user records"#)]
fn provider_holds(world: &BackendWorld, name: String, count: usize) -> Result<(), eyre::Report> {
    let records = world
        .provider(&name)?
        .snapshot(&CollectionName::new("users")?)?;
    if records.len() != count {
        return Err(eyre::eyre!(
            "expected {count} records on '{name}', found {}",
            records.len()
        ));
    }
    Ok(())
}

#[then("the switch is rejected because the capability is already bound")]
fn switch_rejected_already_bound(world: &BackendWorld) -> Result<(), eyre::Report> {
    match &world.last_switch_error {
        Some(ManagerError::AlreadyBound { .. }) => Ok(()),
        other => Err(eyre::eyre!("expected an already-bound error, got {other:?}")),
    }
}
