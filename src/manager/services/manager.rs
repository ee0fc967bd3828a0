//! The backend manager: configuration, bindings and migration control.
//!
//! The manager is the only component that changes bindings or plan status.
//! Binding changes go through the router's per-capability transition guard;
//! plan status changes are made by the single driver task each active plan
//! owns.

use super::error::{ManagerError, ManagerResult};
use crate::config::ConfigurationError;
use crate::events::{ControlPlaneEvent, EventBus};
use crate::health::{
    domain::{HealthStatus, HealthTransition},
    services::HealthMonitor,
};
use crate::manager::{
    domain::{BackendStatus, CapabilityStatus, ManagerSettings, SwitchOutcome, SwitchProviderRequest},
    ports::ProviderCatalogRepository,
};
use crate::migration::{
    domain::{ConsistencyCheckpoint, MigrationId, MigrationPlan, MigrationStatus},
    ports::MigrationRepository,
    services::{MigrationControl, MigrationEngine},
};
use crate::provider::{
    domain::{Capability, ProviderDescriptor, ProviderName},
    ports::{AdapterFactory, ProviderAdapter},
};
use crate::routing::{
    domain::{BindingReason, BindingState, CapabilityBinding},
    services::{CapabilityRouter, TransitionGuard},
};
use mockable::Clock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

pub(super) fn poisoned(err: impl fmt::Display) -> ManagerError {
    ManagerError::LockPoisoned(err.to_string())
}

/// A configured provider and its live adapter.
#[derive(Clone)]
pub(super) struct LiveProvider {
    pub(super) descriptor: ProviderDescriptor,
    pub(super) adapter: Arc<dyn ProviderAdapter>,
}

/// Bookkeeping for the one non-terminal plan a capability may have.
pub(super) struct ActiveMigration {
    pub(super) id: MigrationId,
    pub(super) source: ProviderName,
    pub(super) target: ProviderName,
    pub(super) control: MigrationControl,
    pub(super) status: watch::Sender<MigrationStatus>,
    pub(super) task: Option<JoinHandle<()>>,
}

/// A published binding change awaiting its event and persistence.
pub(super) struct BindingChange {
    pub(super) capability: Capability,
    pub(super) old: Option<ProviderName>,
    pub(super) new: Option<ProviderName>,
    pub(super) reason: BindingReason,
}

pub(super) struct ManagerInner<R, P, C>
where
    R: MigrationRepository + 'static,
    P: ProviderCatalogRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    pub(super) settings: ManagerSettings,
    pub(super) clock: Arc<C>,
    pub(super) events: EventBus,
    pub(super) router: Arc<CapabilityRouter>,
    pub(super) health: HealthMonitor<C>,
    pub(super) engine: MigrationEngine<R, C>,
    pub(super) migrations: Arc<R>,
    pub(super) catalog: Arc<P>,
    pub(super) factory: Arc<dyn AdapterFactory>,
    pub(super) providers: RwLock<BTreeMap<ProviderName, LiveProvider>>,
    pub(super) active: Mutex<HashMap<Capability, ActiveMigration>>,
    pub(super) config_gate: tokio::sync::Mutex<()>,
    pub(super) background: Mutex<Vec<JoinHandle<()>>>,
    pub(super) configured: AtomicBool,
}

/// Coordinates providers, bindings, health and migrations.
///
/// Cloning is cheap; clones share state.
pub struct BackendManager<R, P, C>
where
    R: MigrationRepository + 'static,
    P: ProviderCatalogRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    pub(super) inner: Arc<ManagerInner<R, P, C>>,
}

impl<R, P, C> Clone for BackendManager<R, P, C>
where
    R: MigrationRepository + 'static,
    P: ProviderCatalogRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R, P, C> BackendManager<R, P, C>
where
    R: MigrationRepository + 'static,
    P: ProviderCatalogRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a manager with no providers. Every capability starts
    /// unbound until [`Self::configure`] runs.
    #[must_use]
    pub fn new(
        settings: ManagerSettings,
        migrations: Arc<R>,
        catalog: Arc<P>,
        factory: Arc<dyn AdapterFactory>,
        clock: Arc<C>,
    ) -> Self {
        let events = EventBus::new(settings.event_capacity);
        let health = HealthMonitor::new(settings.health, Arc::clone(&clock), events.clone());
        let engine = MigrationEngine::new(
            Arc::clone(&migrations),
            Arc::clone(&clock),
            events.clone(),
            settings.migration,
        );
        Self {
            inner: Arc::new(ManagerInner {
                settings,
                clock,
                events,
                router: Arc::new(CapabilityRouter::new()),
                health,
                engine,
                migrations,
                catalog,
                factory,
                providers: RwLock::new(BTreeMap::new()),
                active: Mutex::new(HashMap::new()),
                config_gate: tokio::sync::Mutex::new(()),
                background: Mutex::new(Vec::new()),
                configured: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the manager settings.
    #[must_use]
    pub fn settings(&self) -> &ManagerSettings {
        &self.inner.settings
    }

    /// Returns the event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Returns the routing table unified services resolve through.
    #[must_use]
    pub fn router(&self) -> Arc<CapabilityRouter> {
        Arc::clone(&self.inner.router)
    }

    /// Returns the current health status of `provider`.
    #[must_use]
    pub fn health_of(&self, provider: &ProviderName) -> HealthStatus {
        self.inner.health.status(provider)
    }

    /// Applies a provider configuration.
    ///
    /// The whole list is validated before anything changes. New providers
    /// are built, registered with the health monitor and probed once;
    /// removed providers are deregistered. Afterwards every capability is
    /// reconciled: unbound capabilities are bound to the best healthy
    /// provider, and capabilities whose provider was removed or disabled
    /// fail over. On the first call, bindings saved in the catalog are
    /// preferred when their provider is still eligible and healthy.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Configuration`] when validation fails, or
    /// the error of a catalog, health or routing call.
    pub async fn configure(&self, descriptors: Vec<ProviderDescriptor>) -> ManagerResult<()> {
        let _gate = self.inner.config_gate.lock().await;
        let current = self.provider_table()?;
        self.validate_configuration(&current, &descriptors)?;

        let mut table = BTreeMap::new();
        let mut added = Vec::new();
        for descriptor in &descriptors {
            let adapter = match current.get(descriptor.name()) {
                Some(existing) => Arc::clone(&existing.adapter),
                None => {
                    let built = self.inner.factory.build(descriptor).map_err(|source| {
                        ConfigurationError::AdapterConstruction {
                            provider: descriptor.name().clone(),
                            source,
                        }
                    })?;
                    added.push(Arc::clone(&built));
                    built
                }
            };
            table.insert(
                descriptor.name().clone(),
                LiveProvider {
                    descriptor: descriptor.clone(),
                    adapter,
                },
            );
        }
        let removed: Vec<ProviderName> = current
            .keys()
            .filter(|name| !table.contains_key(*name))
            .cloned()
            .collect();

        *self.inner.providers.write().map_err(poisoned)? = table;
        for name in &removed {
            self.inner.health.deregister(name)?;
            tracing::info!(provider = %name, "provider removed");
        }
        for adapter in &added {
            self.inner.health.register(Arc::clone(adapter))?;
            tracing::info!(provider = %adapter.name(), "provider added");
        }
        let new_names: Vec<ProviderName> =
            added.iter().map(|adapter| adapter.name().clone()).collect();
        self.inner.health.probe_providers(&new_names).await?;
        self.inner.catalog.save_descriptors(&descriptors).await?;

        let first = !self.inner.configured.swap(true, Ordering::SeqCst);
        let preferred: HashMap<Capability, ProviderName> = if first {
            self.inner
                .catalog
                .load_bindings()
                .await?
                .into_iter()
                .filter_map(|(capability, state)| state.provider().cloned().map(|p| (capability, p)))
                .collect()
        } else {
            HashMap::new()
        };
        for capability in Capability::ALL {
            self.reconcile(capability, preferred.get(&capability)).await?;
        }
        self.cancel_migrations_on_ineligible_providers()?;
        tracing::info!(
            providers = descriptors.len(),
            added = added.len(),
            removed = removed.len(),
            "configuration applied"
        );
        Ok(())
    }

    /// Re-applies the descriptors saved in the catalog.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Self::configure`] or of the catalog read.
    pub async fn configure_from_catalog(&self) -> ManagerResult<()> {
        let descriptors = self.inner.catalog.load_descriptors().await?;
        self.configure(descriptors).await
    }

    fn validate_configuration(
        &self,
        current: &BTreeMap<ProviderName, LiveProvider>,
        descriptors: &[ProviderDescriptor],
    ) -> ManagerResult<()> {
        let mut seen = HashSet::new();
        for descriptor in descriptors {
            if !seen.insert(descriptor.name()) {
                return Err(ConfigurationError::DuplicateProvider(descriptor.name().clone()).into());
            }
            if let Some(existing) = current.get(descriptor.name())
                && !existing.descriptor.same_identity(descriptor)
            {
                return Err(ConfigurationError::ImmutableDescriptor(descriptor.name().clone()).into());
            }
        }
        let active = self.inner.active.lock().map_err(poisoned)?;
        for migration in active.values() {
            for provider in [&migration.source, &migration.target] {
                if !seen.contains(provider) {
                    return Err(ConfigurationError::ProviderInUse {
                        provider: provider.clone(),
                        migration: migration.id,
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Enables or disables a provider and reconciles every capability.
    ///
    /// Disabling the bound provider fails its capabilities over; enabling
    /// one may bind capabilities that had no provider.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::UnknownProvider`], or the error of a catalog
    /// or routing call.
    pub async fn set_provider_enabled(
        &self,
        provider: &ProviderName,
        enabled: bool,
    ) -> ManagerResult<()> {
        let _gate = self.inner.config_gate.lock().await;
        let descriptors = self.update_descriptor(provider, |descriptor| {
            descriptor.set_enabled(enabled);
        })?;
        self.inner.catalog.save_descriptors(&descriptors).await?;
        tracing::info!(%provider, enabled, "provider enablement changed");
        for capability in Capability::ALL {
            self.reconcile(capability, None).await?;
        }
        self.cancel_migrations_on_ineligible_providers()
    }

    /// Changes a provider's routing priority.
    ///
    /// Existing bindings are left alone; the new priority applies to the
    /// next failover or initial binding.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::UnknownProvider`], or the error of the
    /// catalog write.
    pub async fn set_provider_priority(
        &self,
        provider: &ProviderName,
        priority: u32,
    ) -> ManagerResult<()> {
        let _gate = self.inner.config_gate.lock().await;
        let descriptors = self.update_descriptor(provider, |descriptor| {
            descriptor.set_priority(priority);
        })?;
        self.inner.catalog.save_descriptors(&descriptors).await?;
        tracing::info!(%provider, priority, "provider priority changed");
        Ok(())
    }

    fn update_descriptor(
        &self,
        provider: &ProviderName,
        change: impl FnOnce(&mut ProviderDescriptor),
    ) -> ManagerResult<Vec<ProviderDescriptor>> {
        let mut providers = self.inner.providers.write().map_err(poisoned)?;
        let entry = providers
            .get_mut(provider)
            .ok_or_else(|| ManagerError::UnknownProvider(provider.clone()))?;
        change(&mut entry.descriptor);
        Ok(providers
            .values()
            .map(|live| live.descriptor.clone())
            .collect())
    }

    /// Starts moving a capability to another provider.
    ///
    /// The target must be configured, enabled, declare the capability and
    /// be healthy. A capability with no bound provider is bound to the
    /// target directly. Otherwise a `pending` plan is persisted, its driver
    /// task is started and the plan is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::MigrationConflict`] while another plan for
    /// the capability is not terminal, the target validation errors, or
    /// [`ManagerError::AlreadyBound`] when the target already serves it.
    pub async fn switch_provider(
        &self,
        request: SwitchProviderRequest,
    ) -> ManagerResult<SwitchOutcome> {
        let SwitchProviderRequest {
            capability,
            target,
            strategy,
        } = request;
        let target_adapter = self.eligible_target(capability, &target)?;

        let guard = self.inner.router.begin_transition(capability).await;
        if let Some(active) = self.active_id(capability)? {
            return Err(ManagerError::MigrationConflict { capability, active });
        }
        let route = guard.current()?;
        let Some(source) = route.state().provider().cloned() else {
            let binding = CapabilityBinding {
                capability,
                provider: target.clone(),
                reason: BindingReason::Manual,
                bound_at: self.inner.clock.utc(),
            };
            let previous = guard.bind(binding.clone(), target_adapter)?;
            drop(guard);
            self.announce_binding(BindingChange {
                capability,
                old: previous.state().provider().cloned(),
                new: Some(target),
                reason: BindingReason::Manual,
            })
            .await;
            return Ok(SwitchOutcome::Bound { binding });
        };
        if source == target {
            return Err(ManagerError::AlreadyBound {
                capability,
                provider: target,
            });
        }

        let plan = MigrationPlan::new(capability, source, target, strategy, &*self.inner.clock)?;
        let control = MigrationControl::new();
        self.register_active(&plan, control.clone())?;
        drop(guard);

        if let Err(err) = self.inner.migrations.insert(&plan).await {
            self.release_active(capability, plan.id())?;
            return Err(err.into());
        }
        tracing::info!(
            plan_id = %plan.id(),
            %capability,
            source = %plan.source(),
            target = %plan.target(),
            strategy = %plan.strategy(),
            "migration accepted"
        );
        self.spawn_driver(plan.clone(), control)?;
        Ok(SwitchOutcome::Migrating { plan })
    }

    fn eligible_target(
        &self,
        capability: Capability,
        target: &ProviderName,
    ) -> ManagerResult<Arc<dyn ProviderAdapter>> {
        let live = self
            .live_provider(target)?
            .ok_or_else(|| ManagerError::UnknownProvider(target.clone()))?;
        if !live.descriptor.is_enabled() {
            return Err(ManagerError::ProviderDisabled(target.clone()));
        }
        if !live.descriptor.serves(capability) {
            return Err(ManagerError::CapabilityNotSupported {
                provider: target.clone(),
                capability,
            });
        }
        let status = self.inner.health.status(target);
        if !status.is_healthy() {
            return Err(ManagerError::ProviderUnhealthy {
                provider: target.clone(),
                status,
            });
        }
        Ok(live.adapter)
    }

    /// Requests cancellation of a running plan.
    ///
    /// The driver stops before its next batch, marks the plan `failed` and
    /// leaves the source bound.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::MigrationNotActive`] for a stopped plan or
    /// [`ManagerError::UnknownMigration`].
    pub async fn cancel_migration(&self, id: MigrationId) -> ManagerResult<()> {
        let cancelled = {
            let active = self.inner.active.lock().map_err(poisoned)?;
            let found = active.values().find(|migration| migration.id == id);
            if let Some(migration) = found {
                migration.control.cancel();
            }
            found.is_some()
        };
        if cancelled {
            tracing::info!(plan_id = %id, "migration cancellation requested");
            return Ok(());
        }
        let plan = self.get_migration(id).await?;
        Err(ManagerError::MigrationNotActive {
            id,
            status: plan.status(),
        })
    }

    /// Marks a failed plan `rolled_back`.
    ///
    /// The source must still be bound to the capability and healthy. A
    /// capability that failover moved elsewhere stays where it is; moving it
    /// back is a new switch. Data already copied to the target is left in
    /// place.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::RollbackUnavailable`] unless the plan failed
    /// and its source is still bound and healthy, or
    /// [`ManagerError::UnknownMigration`].
    pub async fn rollback_migration(&self, id: MigrationId) -> ManagerResult<MigrationPlan> {
        let mut plan = self.get_migration(id).await?;
        if plan.status() != MigrationStatus::Failed {
            return Err(ManagerError::RollbackUnavailable {
                id,
                reason: format!("plan is {}, only failed plans can be rolled back", plan.status()),
            });
        }
        let capability = plan.capability();
        let source = plan.source().clone();
        let unavailable = |reason: String| ManagerError::RollbackUnavailable { id, reason };

        let guard = self.inner.router.begin_transition(capability).await;
        if self.active_id(capability)?.is_some() {
            return Err(unavailable(format!("another migration is running for {capability}")));
        }
        let route = guard.current()?;
        if route.state().provider() != Some(&source) {
            return Err(unavailable(format!(
                "{capability} is no longer bound to source {source}"
            )));
        }
        let status = self.inner.health.status(&source);
        if !status.is_healthy() {
            return Err(unavailable(format!("source {source} is {status}")));
        }
        if let Some(mirror) = route.mirror()
            && mirror.target() == plan.target()
        {
            guard.remove_mirror()?;
        }
        plan.roll_back(&*self.inner.clock)?;
        self.inner.migrations.update(&plan).await?;
        drop(guard);

        tracing::info!(plan_id = %id, %capability, %source, "migration rolled back");
        self.inner.events.publish(ControlPlaneEvent::MigrationStatusChanged {
            plan_id: id,
            status: plan.status(),
        });
        Ok(plan)
    }

    /// Waits until a plan reaches a terminal status and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::UnknownMigration`] or a repository error.
    pub async fn wait_for_migration(&self, id: MigrationId) -> ManagerResult<MigrationPlan> {
        let receiver = {
            let active = self.inner.active.lock().map_err(poisoned)?;
            active
                .values()
                .find(|migration| migration.id == id)
                .map(|migration| migration.status.subscribe())
        };
        if let Some(mut status) = receiver {
            // A closed channel means the driver is gone; the repository has
            // the last persisted state either way.
            if status.wait_for(|current| current.is_terminal()).await.is_err() {
                tracing::debug!(plan_id = %id, "migration driver exited before reporting");
            }
        }
        self.get_migration(id).await
    }

    /// Returns a plan by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::UnknownMigration`] or a repository error.
    pub async fn get_migration(&self, id: MigrationId) -> ManagerResult<MigrationPlan> {
        self.inner
            .migrations
            .find_by_id(id)
            .await?
            .ok_or(ManagerError::UnknownMigration(id))
    }

    /// Returns every plan, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a repository error.
    pub async fn list_migrations(&self) -> ManagerResult<Vec<MigrationPlan>> {
        Ok(self.inner.migrations.list_all().await?)
    }

    /// Returns the verification checkpoints of a plan.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::UnknownMigration`] or a repository error.
    pub async fn checkpoints(&self, id: MigrationId) -> ManagerResult<Vec<ConsistencyCheckpoint>> {
        self.get_migration(id).await?;
        Ok(self.inner.migrations.list_checkpoints(id).await?)
    }

    /// Returns bindings, health records, active plans and providers.
    ///
    /// # Errors
    ///
    /// Returns a routing, health or repository error.
    pub async fn get_status(&self) -> ManagerResult<BackendStatus> {
        let mut bindings = Vec::with_capacity(Capability::ALL.len());
        for capability in Capability::ALL {
            let route = self.inner.router.current(capability)?;
            bindings.push(CapabilityStatus {
                capability,
                state: route.state().clone(),
                mirror: route.mirror().map(|mirror| mirror.stats()),
            });
        }
        Ok(BackendStatus {
            bindings,
            health: self.inner.health.records()?,
            active_migrations: self.inner.migrations.list_unfinished().await?,
            providers: self
                .provider_table()?
                .into_values()
                .map(|live| live.descriptor)
                .collect(),
        })
    }

    /// Probes every provider once and applies the resulting transitions.
    ///
    /// # Errors
    ///
    /// Returns a health or routing error.
    pub async fn run_health_cycle(&self) -> ManagerResult<Vec<HealthTransition>> {
        let transitions = self.inner.health.probe_all().await?;
        for transition in &transitions {
            self.handle_transition(transition).await?;
        }
        Ok(transitions)
    }

    /// Starts background probe loops and the failover consumer, then
    /// resumes or fails the plans a previous run left unfinished.
    ///
    /// Call after [`Self::configure`].
    ///
    /// # Errors
    ///
    /// Returns a health, repository or lock error.
    pub async fn start(&self) -> ManagerResult<()> {
        let (sink, mut transitions) = mpsc::unbounded_channel();
        self.inner.health.spawn_loops(sink)?;
        let manager = self.clone();
        let consumer = tokio::spawn(async move {
            while let Some(transition) = transitions.recv().await {
                if let Err(err) = manager.handle_transition(&transition).await {
                    tracing::error!(
                        provider = %transition.provider,
                        error = %err,
                        "failed to apply health transition"
                    );
                }
            }
        });
        self.inner
            .background
            .lock()
            .map_err(poisoned)?
            .push(consumer);
        self.resume_unfinished().await
    }

    /// Stops probe loops, the failover consumer and migration drivers.
    ///
    /// Plans keep their persisted state and are picked up by the next
    /// [`Self::start`].
    ///
    /// # Errors
    ///
    /// Returns a health or lock error.
    pub fn shutdown(&self) -> ManagerResult<()> {
        self.inner.health.stop()?;
        for handle in self.inner.background.lock().map_err(poisoned)?.drain(..) {
            handle.abort();
        }
        let mut active = self.inner.active.lock().map_err(poisoned)?;
        for (capability, migration) in active.drain() {
            if let Some(task) = migration.task {
                task.abort();
            }
            tracing::info!(%capability, plan_id = %migration.id, "migration driver stopped");
        }
        Ok(())
    }

    pub(super) fn provider_table(&self) -> ManagerResult<BTreeMap<ProviderName, LiveProvider>> {
        Ok(self.inner.providers.read().map_err(poisoned)?.clone())
    }

    pub(super) fn live_provider(&self, name: &ProviderName) -> ManagerResult<Option<LiveProvider>> {
        Ok(self.inner.providers.read().map_err(poisoned)?.get(name).cloned())
    }

    pub(super) fn active_id(&self, capability: Capability) -> ManagerResult<Option<MigrationId>> {
        let active = self.inner.active.lock().map_err(poisoned)?;
        Ok(active.get(&capability).map(|migration| migration.id))
    }

    pub(super) fn register_active(
        &self,
        plan: &MigrationPlan,
        control: MigrationControl,
    ) -> ManagerResult<()> {
        let (status, _) = watch::channel(plan.status());
        let mut active = self.inner.active.lock().map_err(poisoned)?;
        active.insert(
            plan.capability(),
            ActiveMigration {
                id: plan.id(),
                source: plan.source().clone(),
                target: plan.target().clone(),
                control,
                status,
                task: None,
            },
        );
        Ok(())
    }

    pub(super) fn release_active(&self, capability: Capability, id: MigrationId) -> ManagerResult<()> {
        let mut active = self.inner.active.lock().map_err(poisoned)?;
        if active.get(&capability).is_some_and(|migration| migration.id == id) {
            active.remove(&capability);
        }
        Ok(())
    }

    /// Cancels active plans for `provider` as source or target.
    pub(super) fn cancel_migrations_using(
        &self,
        provider: &ProviderName,
        reason: &str,
    ) -> ManagerResult<()> {
        let active = self.inner.active.lock().map_err(poisoned)?;
        for migration in active.values() {
            if &migration.source == provider || &migration.target == provider {
                tracing::warn!(plan_id = %migration.id, %provider, reason, "aborting migration");
                migration.control.cancel_with(reason);
            }
        }
        Ok(())
    }

    fn cancel_migrations_on_ineligible_providers(&self) -> ManagerResult<()> {
        let providers = self.provider_table()?;
        let disabled: Vec<ProviderName> = providers
            .values()
            .filter(|live| !live.descriptor.is_enabled())
            .map(|live| live.descriptor.name().clone())
            .collect();
        for provider in disabled {
            self.cancel_migrations_using(&provider, &format!("provider {provider} was disabled"))?;
        }
        Ok(())
    }

    /// Brings one capability in line with the configured providers.
    pub(super) async fn reconcile(
        &self,
        capability: Capability,
        preferred: Option<&ProviderName>,
    ) -> ManagerResult<()> {
        let providers = self.provider_table()?;
        let guard = self.inner.router.begin_transition(capability).await;
        let route = guard.current()?;
        let change = match route.state() {
            BindingState::Bound(binding) => {
                if eligible(&providers, &binding.provider, capability).is_some() {
                    None
                } else {
                    self.rebind_best(
                        &guard,
                        &providers,
                        Some(binding.provider.clone()),
                        BindingReason::Configuration,
                    )?
                }
            }
            BindingState::NoHealthyProvider { previous, .. } => self.rebind_best(
                &guard,
                &providers,
                previous.clone(),
                BindingReason::Recovery,
            )?,
            BindingState::Unbound => {
                let restored = preferred
                    .and_then(|name| eligible(&providers, name, capability))
                    .filter(|live| self.inner.health.status(live.descriptor.name()).is_healthy());
                match restored {
                    Some(live) => {
                        guard.bind(
                            CapabilityBinding {
                                capability,
                                provider: live.descriptor.name().clone(),
                                reason: BindingReason::Initial,
                                bound_at: self.inner.clock.utc(),
                            },
                            Arc::clone(&live.adapter),
                        )?;
                        Some(BindingChange {
                            capability,
                            old: None,
                            new: Some(live.descriptor.name().clone()),
                            reason: BindingReason::Initial,
                        })
                    }
                    None => self.rebind_best(&guard, &providers, None, BindingReason::Initial)?,
                }
            }
        };
        drop(guard);
        if let Some(binding_change) = change {
            self.announce_binding(binding_change).await;
        }
        Ok(())
    }

    /// Binds the guarded capability to its best healthy provider.
    ///
    /// Candidates are enabled providers declaring the capability, ordered by
    /// priority then name. With candidates but none healthy the capability
    /// enters `NoHealthyProvider`; with no candidates it becomes unbound.
    /// Returns `None` when the published state does not change.
    pub(super) fn rebind_best(
        &self,
        guard: &TransitionGuard<'_>,
        providers: &BTreeMap<ProviderName, LiveProvider>,
        previous: Option<ProviderName>,
        reason: BindingReason,
    ) -> ManagerResult<Option<BindingChange>> {
        let capability = guard.capability();
        let mut candidates: Vec<&LiveProvider> = providers
            .values()
            .filter(|live| live.descriptor.is_enabled() && live.descriptor.serves(capability))
            .collect();
        candidates.sort_by(|left, right| {
            left.descriptor
                .priority()
                .cmp(&right.descriptor.priority())
                .then_with(|| left.descriptor.name().cmp(right.descriptor.name()))
        });
        let current = guard.current()?;
        let old = current.state().provider().cloned();
        let best = candidates
            .iter()
            .find(|live| self.inner.health.status(live.descriptor.name()).is_healthy());

        if let Some(live) = best {
            let name = live.descriptor.name().clone();
            if old.as_ref() == Some(&name) {
                return Ok(None);
            }
            guard.bind(
                CapabilityBinding {
                    capability,
                    provider: name.clone(),
                    reason,
                    bound_at: self.inner.clock.utc(),
                },
                Arc::clone(&live.adapter),
            )?;
            return Ok(Some(BindingChange {
                capability,
                old,
                new: Some(name),
                reason,
            }));
        }

        if candidates.is_empty() {
            if matches!(current.state(), BindingState::Unbound) {
                return Ok(None);
            }
            guard.unbind()?;
        } else {
            if current.state().is_degraded() {
                return Ok(None);
            }
            guard.mark_no_healthy(previous, self.inner.clock.utc())?;
            tracing::error!(%capability, "no healthy provider available");
        }
        Ok(Some(BindingChange {
            capability,
            old,
            new: None,
            reason,
        }))
    }

    /// Publishes and persists a binding change made under a guard.
    pub(super) async fn announce_binding(&self, change: BindingChange) {
        let BindingChange {
            capability,
            old,
            new,
            reason,
        } = change;
        self.inner.events.publish(ControlPlaneEvent::BindingChanged {
            capability,
            old_provider: old,
            new_provider: new,
            reason,
        });
        let state = match self.inner.router.current(capability) {
            Ok(route) => route.state().clone(),
            Err(err) => {
                tracing::error!(%capability, error = %err, "cannot read binding to persist it");
                return;
            }
        };
        if let Err(err) = self.inner.catalog.save_binding(capability, &state).await {
            tracing::error!(%capability, error = %err, "failed to persist binding");
        }
    }
}

fn eligible<'a>(
    providers: &'a BTreeMap<ProviderName, LiveProvider>,
    name: &ProviderName,
    capability: Capability,
) -> Option<&'a LiveProvider> {
    providers
        .get(name)
        .filter(|live| live.descriptor.is_enabled() && live.descriptor.serves(capability))
}
