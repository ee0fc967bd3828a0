//! Given steps for backend manager BDD scenarios.

use super::world::{BackendWorld, memory_descriptor, run_async};
use backplane::provider::{
    adapters::memory::InMemoryProvider,
    domain::{CollectionName, ProviderName, Record, RecordKey},
};
use eyre::WrapErr;
use rstest_bdd_macros::given;
use serde_json::json;
use std::sync::Arc;

#[given(r#"a memory provider "{name}" with priority {priority:u32}"#)]
fn a_memory_provider(
    world: &mut BackendWorld,
    name: String,
    priority: u32,
) -> Result<(), eyre::Report> {
    let handle = InMemoryProvider::new(ProviderName::new(name.as_str())?);
    world
        .factory
        .insert(Arc::new(handle.clone()))
        .wrap_err("register adapter")?;
    world.descriptors.push(memory_descriptor(&name, priority)?);
    world.providers.insert(name, handle);
    Ok(())
}

#[given("the manager is configured")]
fn manager_configured(world: &mut BackendWorld) -> Result<(), eyre::Report> {
    run_async(world.manager.configure(world.descriptors.clone()))
        .wrap_err("configure manager for scenario")
}

#[given(r#"provider "{name}" holds {count:usize} user records"#)]
fn provider_holds_records(
    world: &mut BackendWorld,
    name: String,
    count: usize,
) -> Result<(), eyre::Report> {
    let collection = CollectionName::new("users")?;
    let records = (0..count)
        .map(|index| {
            Record::new(
                RecordKey::new(format!("user-{index:05}"))?,
                json!({ "index": index }),
            )
        })
        .collect::<Result<Vec<_>, _>>()?;
    world.provider(&name)?.seed(&collection, records)?;
    Ok(())
}

#[given(r#"provider "{name}" returns corrupted reads for "{key}""#)]
fn provider_corrupts_reads(
    world: &mut BackendWorld,
    name: String,
    key: String,
) -> Result<(), eyre::Report> {
    world
        .provider(&name)?
        .corrupt_reads(RecordKey::new(key)?)?;
    Ok(())
}
