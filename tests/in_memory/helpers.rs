//! Shared fixtures for in-memory backend manager tests.

use async_trait::async_trait;
use backplane::events::ControlPlaneEvent;
use backplane::health::domain::HealthPolicy;
use backplane::manager::{
    adapters::memory::InMemoryProviderCatalog,
    domain::{ManagerSettings, SwitchOutcome, SwitchProviderRequest},
    services::BackendManager,
};
use backplane::migration::{
    adapters::memory::InMemoryMigrationRepository,
    domain::{MigrationPlan, MigrationSettings, MigrationStrategy},
};
use backplane::provider::{
    adapters::{StaticAdapterFactory, memory::InMemoryProvider},
    domain::{
        Capability, CapabilitySet, CollectionName, ConnectionParams, Credentials, Filter,
        FunctionName, HealthSignal, ObjectPath, ProviderDescriptor, ProviderName, Record,
        RecordKey, Session, Subscription, SubscriptionHandler, Topic,
    },
    ports::{ProviderAdapter, ProviderError, ProviderResult},
    services::{CallPolicy, RetryPolicy},
};
use mockable::DefaultClock;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

/// Manager type exercised by the in-memory suites.
pub type TestManager =
    BackendManager<InMemoryMigrationRepository, InMemoryProviderCatalog, DefaultClock>;

/// Parses a provider name.
pub fn name(value: &str) -> ProviderName {
    ProviderName::new(value).expect("valid provider name")
}

/// The `users` collection most scenarios write to.
pub fn users() -> CollectionName {
    CollectionName::new("users").expect("valid collection")
}

/// Builds a `users` record.
pub fn user(index: usize) -> Record {
    Record::new(
        RecordKey::new(format!("user-{index:05}")).expect("valid key"),
        json!({ "index": index, "email": format!("user{index}@example.com") }),
    )
    .expect("valid record")
}

/// Builds an enabled in-memory descriptor serving every capability.
pub fn descriptor(provider: &str, priority: u32) -> ProviderDescriptor {
    ProviderDescriptor::new(
        name(provider),
        priority,
        CapabilitySet::all(),
        ConnectionParams::Memory,
    )
    .expect("valid descriptor")
}

/// Builds an in-memory descriptor serving only `capabilities`.
pub fn descriptor_serving(
    provider: &str,
    priority: u32,
    capabilities: &[Capability],
) -> ProviderDescriptor {
    ProviderDescriptor::new(
        name(provider),
        priority,
        capabilities.iter().copied().collect(),
        ConnectionParams::Memory,
    )
    .expect("valid descriptor")
}

/// Settings tuned for fast tests: one failed probe turns a provider
/// unhealthy and provider calls retry with millisecond backoff.
pub fn test_settings() -> ManagerSettings {
    ManagerSettings {
        health: HealthPolicy {
            probe_interval: Duration::from_millis(20),
            probe_timeout: Duration::from_millis(200),
            unhealthy_after: 1,
            recover_after: 1,
        },
        migration: MigrationSettings {
            max_pause: Duration::from_secs(5),
            ..MigrationSettings::default()
        },
        calls: CallPolicy::new(
            Duration::from_secs(2),
            RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(5)),
        ),
        ..ManagerSettings::default()
    }
}

/// Holds target writes until released, so tests can act while a
/// migration is mid-copy.
#[derive(Clone)]
pub struct WriteGate {
    open: watch::Sender<bool>,
}

impl WriteGate {
    /// Creates a closed gate.
    pub fn closed() -> Self {
        let (open, _) = watch::channel(false);
        Self { open }
    }

    /// Releases every held write and lets later ones through.
    pub fn open(&self) {
        self.open.send_replace(true);
    }

    async fn pass(&self) {
        let mut receiver = self.open.subscribe();
        if receiver.wait_for(|open| *open).await.is_err() {
            tracing::debug!("write gate dropped");
        }
    }
}

/// In-memory provider whose record and object writes wait on a gate.
#[derive(Clone)]
pub struct GatedProvider {
    inner: InMemoryProvider,
    gate: WriteGate,
}

impl GatedProvider {
    /// Wraps `inner` behind `gate`.
    pub const fn new(inner: InMemoryProvider, gate: WriteGate) -> Self {
        Self { inner, gate }
    }
}

#[async_trait]
impl ProviderAdapter for GatedProvider {
    fn name(&self) -> &ProviderName {
        self.inner.name()
    }

    async fn create(&self, collection: &CollectionName, record: Record) -> ProviderResult<Record> {
        self.gate.pass().await;
        self.inner.create(collection, record).await
    }

    async fn read(
        &self,
        collection: &CollectionName,
        key: &RecordKey,
    ) -> ProviderResult<Option<Record>> {
        self.inner.read(collection, key).await
    }

    async fn query(&self, collection: &CollectionName, filter: &Filter) -> ProviderResult<Vec<Record>> {
        self.inner.query(collection, filter).await
    }

    async fn update(&self, collection: &CollectionName, record: Record) -> ProviderResult<Record> {
        self.gate.pass().await;
        self.inner.update(collection, record).await
    }

    async fn upsert(&self, collection: &CollectionName, record: Record) -> ProviderResult<Record> {
        self.gate.pass().await;
        self.inner.upsert(collection, record).await
    }

    async fn delete(&self, collection: &CollectionName, key: &RecordKey) -> ProviderResult<()> {
        self.gate.pass().await;
        self.inner.delete(collection, key).await
    }

    async fn list_collections(&self) -> ProviderResult<Vec<CollectionName>> {
        self.inner.list_collections().await
    }

    async fn scan(
        &self,
        collection: &CollectionName,
        after: Option<RecordKey>,
        limit: usize,
    ) -> ProviderResult<Vec<Record>> {
        self.inner.scan(collection, after, limit).await
    }

    async fn count(&self, collection: &CollectionName) -> ProviderResult<u64> {
        self.inner.count(collection).await
    }

    async fn authenticate(&self, credentials: &Credentials) -> ProviderResult<Session> {
        self.inner.authenticate(credentials).await
    }

    async fn put_object(&self, path: &ObjectPath, content: Vec<u8>) -> ProviderResult<()> {
        self.gate.pass().await;
        self.inner.put_object(path, content).await
    }

    async fn get_object(&self, path: &ObjectPath) -> ProviderResult<Option<Vec<u8>>> {
        self.inner.get_object(path).await
    }

    async fn delete_object(&self, path: &ObjectPath) -> ProviderResult<()> {
        self.gate.pass().await;
        self.inner.delete_object(path).await
    }

    async fn list_objects(
        &self,
        after: Option<ObjectPath>,
        limit: usize,
    ) -> ProviderResult<Vec<ObjectPath>> {
        self.inner.list_objects(after, limit).await
    }

    async fn subscribe(
        &self,
        topic: &Topic,
        handler: SubscriptionHandler,
    ) -> ProviderResult<Subscription> {
        self.inner.subscribe(topic, handler).await
    }

    async fn unsubscribe(&self, subscription: &Subscription) -> ProviderResult<()> {
        self.inner.unsubscribe(subscription).await
    }

    async fn publish(&self, topic: &Topic, payload: Value) -> ProviderResult<()> {
        self.inner.publish(topic, payload).await
    }

    async fn invoke(&self, function: &FunctionName, payload: Value) -> ProviderResult<Value> {
        self.inner.invoke(function, payload).await
    }

    async fn probe(&self) -> ProviderResult<HealthSignal> {
        self.inner.probe().await
    }
}

/// A manager wired to in-memory providers the test keeps handles to.
pub struct Harness {
    /// Manager under test.
    pub manager: TestManager,
    /// Provider handles by name, for seeding and fault injection.
    pub providers: BTreeMap<String, InMemoryProvider>,
    /// Plan store shared with the manager.
    pub migrations: Arc<InMemoryMigrationRepository>,
    /// Catalog shared with the manager.
    pub catalog: Arc<InMemoryProviderCatalog>,
    /// Event subscription opened before configuration.
    pub events: broadcast::Receiver<ControlPlaneEvent>,
}

impl Harness {
    /// Returns the handle of provider `provider`.
    pub fn provider(&self, provider: &str) -> &InMemoryProvider {
        self.providers
            .get(provider)
            .unwrap_or_else(|| panic!("unknown test provider {provider}"))
    }

    /// Returns the provider currently serving `capability`.
    pub fn bound(&self, capability: Capability) -> Option<ProviderName> {
        self.manager
            .router()
            .current(capability)
            .expect("route readable")
            .state()
            .provider()
            .cloned()
    }

    /// Drains the events published so far.
    pub fn drain_events(&mut self) -> Vec<ControlPlaneEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }

    /// Makes every probe of `provider` fail from now on.
    pub fn break_provider(&self, provider: &str) {
        self.provider(provider)
            .fail_probes(ProviderError::connection("connection refused"))
            .expect("inject probe failure");
    }

    /// Lets probes of `provider` succeed again.
    pub fn heal_provider(&self, provider: &str) {
        self.provider(provider).heal_probes().expect("heal probes");
    }

    /// Requests a switch and returns the plan it started.
    pub async fn migrate(
        &self,
        capability: Capability,
        target: &str,
        strategy: MigrationStrategy,
    ) -> MigrationPlan {
        let outcome = self
            .manager
            .switch_provider(SwitchProviderRequest {
                capability,
                target: name(target),
                strategy,
            })
            .await
            .expect("switch accepted");
        match outcome {
            SwitchOutcome::Migrating { plan } => plan,
            SwitchOutcome::Bound { binding } => {
                panic!("expected a migration, capability was bound directly: {binding:?}")
            }
        }
    }
}

/// Builds and configures a manager over `(name, priority)` in-memory
/// providers, each serving every capability.
pub async fn harness(specs: &[(&str, u32)]) -> Harness {
    harness_with(specs, test_settings(), &[]).await
}

/// Builds and configures a manager; providers named in `gated` have their
/// writes held behind the returned gate until it opens.
pub async fn harness_with(
    specs: &[(&str, u32)],
    settings: ManagerSettings,
    gated: &[(&str, WriteGate)],
) -> Harness {
    let descriptors = specs
        .iter()
        .map(|(provider, priority)| descriptor(provider, *priority))
        .collect();
    harness_from(descriptors, settings, gated).await
}

/// Builds a manager over in-memory adapters for `descriptors` and
/// configures it with them as given.
pub async fn harness_from(
    descriptors: Vec<ProviderDescriptor>,
    settings: ManagerSettings,
    gated: &[(&str, WriteGate)],
) -> Harness {
    let factory = StaticAdapterFactory::new();
    let mut providers = BTreeMap::new();
    for provider in descriptors.iter().map(|descriptor| descriptor.name().as_str()) {
        let handle = InMemoryProvider::new(name(provider));
        let adapter: Arc<dyn ProviderAdapter> =
            match gated.iter().find(|(gated_name, _)| *gated_name == provider) {
                Some((_, gate)) => Arc::new(GatedProvider::new(handle.clone(), gate.clone())),
                None => Arc::new(handle.clone()),
            };
        factory.insert(adapter).expect("register adapter");
        providers.insert(provider.to_owned(), handle);
    }
    let migrations = Arc::new(InMemoryMigrationRepository::new());
    let catalog = Arc::new(InMemoryProviderCatalog::new());
    let manager = BackendManager::new(
        settings,
        Arc::clone(&migrations),
        Arc::clone(&catalog),
        Arc::new(factory),
        Arc::new(DefaultClock),
    );
    let events = manager.events().subscribe();
    manager
        .configure(descriptors)
        .await
        .expect("initial configuration");
    Harness {
        manager,
        providers,
        migrations,
        catalog,
        events,
    }
}

/// Seeds `count` user records into provider `provider`.
pub fn seed_users(harness: &Harness, provider: &str, count: usize) {
    harness
        .provider(provider)
        .seed(&users(), (0..count).map(user))
        .expect("seed users");
}
