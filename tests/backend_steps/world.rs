//! Shared world state for backend manager BDD scenarios.

use std::collections::BTreeMap;
use std::sync::Arc;

use backplane::manager::{
    adapters::memory::InMemoryProviderCatalog,
    domain::ManagerSettings,
    services::{BackendManager, ManagerError},
};
use backplane::migration::{adapters::memory::InMemoryMigrationRepository, domain::MigrationPlan};
use backplane::provider::{
    adapters::{StaticAdapterFactory, memory::InMemoryProvider},
    domain::{CapabilitySet, ConnectionParams, ProviderDescriptor, ProviderName},
};
use backplane::unified::{ServiceError, UnifiedServices};
use backplane::health::domain::HealthPolicy;
use mockable::DefaultClock;
use rstest::fixture;

/// Manager type used by the BDD world.
pub type TestManager =
    BackendManager<InMemoryMigrationRepository, InMemoryProviderCatalog, DefaultClock>;

/// Scenario world for backend manager behaviour tests.
pub struct BackendWorld {
    /// The manager under test.
    pub manager: TestManager,
    /// Unified services over the manager's router.
    pub services: UnifiedServices,
    /// Adapters handed to the manager on configuration.
    pub factory: StaticAdapterFactory,
    /// Provider handles by name.
    pub providers: BTreeMap<String, InMemoryProvider>,
    /// Descriptors queued for configuration.
    pub descriptors: Vec<ProviderDescriptor>,
    /// Plan started by the last switch.
    pub last_plan: Option<MigrationPlan>,
    /// Error of the last switch request.
    pub last_switch_error: Option<ManagerError>,
    /// Error of the last unified service call.
    pub last_call_error: Option<ServiceError>,
}

impl BackendWorld {
    /// Creates a world with a manager that has no providers yet.
    #[must_use]
    pub fn new() -> Self {
        let settings = ManagerSettings {
            health: HealthPolicy {
                unhealthy_after: 1,
                recover_after: 1,
                ..HealthPolicy::default()
            },
            ..ManagerSettings::default()
        };
        let factory = StaticAdapterFactory::new();
        let manager = BackendManager::new(
            settings,
            Arc::new(InMemoryMigrationRepository::new()),
            Arc::new(InMemoryProviderCatalog::new()),
            Arc::new(factory.clone()),
            Arc::new(DefaultClock),
        );
        let services = UnifiedServices::new(manager.router(), settings.calls);
        Self {
            manager,
            services,
            factory,
            providers: BTreeMap::new(),
            descriptors: Vec::new(),
            last_plan: None,
            last_switch_error: None,
            last_call_error: None,
        }
    }

    /// Returns the handle of a provider added by a given step.
    ///
    /// # Errors
    ///
    /// Returns an error when no provider of that name was added.
    pub fn provider(&self, name: &str) -> Result<&InMemoryProvider, eyre::Report> {
        self.providers
            .get(name)
            .ok_or_else(|| eyre::eyre!("no provider named '{name}' in scenario world"))
    }
}

impl Default for BackendWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> BackendWorld {
    BackendWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}

/// Builds a memory descriptor serving every capability.
///
/// # Errors
///
/// Returns an error when the name is invalid.
pub fn memory_descriptor(name: &str, priority: u32) -> Result<ProviderDescriptor, eyre::Report> {
    let provider = ProviderName::new(name)?;
    Ok(ProviderDescriptor::new(
        provider,
        priority,
        CapabilitySet::all(),
        ConnectionParams::Memory,
    )?)
}
