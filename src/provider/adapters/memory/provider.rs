//! In-process document store implementing every capability.

use crate::provider::{
    domain::{
        CollectionName, Credentials, Filter, FunctionName, HealthSignal, ObjectPath,
        ProviderName, RealtimeMessage, Record, RecordKey, Session, Subscription,
        SubscriptionHandler, SubscriptionId, Topic,
    },
    ports::{PermanentKind, ProviderAdapter, ProviderError, ProviderResult},
};
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use mockable::{Clock, DefaultClock};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

/// Function body registered with [`InMemoryProvider::register_function`].
pub type MemoryFunction = Arc<dyn Fn(Value) -> ProviderResult<Value> + Send + Sync>;

const SESSION_LIFETIME_MINUTES: i64 = 60;

/// Thread-safe in-memory provider.
///
/// Records live in per-collection ordered maps, objects in an ordered map by
/// path. Realtime delivery is synchronous: `publish` calls every matching
/// handler before returning.
///
/// Fault-injection hooks (`fail_probes`, `set_probe_delay`, `fail_next`,
/// `corrupt_reads`, `reject_writes`) let tests drive health transitions,
/// retries and verification mismatches. Clones share state.
#[derive(Clone)]
pub struct InMemoryProvider {
    name: ProviderName,
    state: Arc<RwLock<MemoryState>>,
    faults: Arc<Mutex<FaultPlan>>,
    upserts: Arc<AtomicU64>,
}

#[derive(Default)]
struct MemoryState {
    collections: BTreeMap<CollectionName, BTreeMap<RecordKey, Record>>,
    objects: BTreeMap<ObjectPath, Vec<u8>>,
    users: HashMap<String, String>,
    subscriptions: HashMap<SubscriptionId, (Topic, SubscriptionHandler)>,
    functions: HashMap<FunctionName, MemoryFunction>,
}

#[derive(Default)]
struct FaultPlan {
    probe_failure: Option<ProviderError>,
    probe_delay: Option<Duration>,
    scripted: VecDeque<ProviderError>,
    corrupt_keys: BTreeSet<RecordKey>,
    rejected_keys: HashMap<RecordKey, ProviderError>,
}

fn poisoned(err: impl fmt::Display) -> ProviderError {
    ProviderError::connection(format!("in-memory state lock poisoned: {err}"))
}

fn sha256_hex(input: &[u8]) -> String {
    Sha256::digest(input)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

impl InMemoryProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new(name: ProviderName) -> Self {
        Self {
            name,
            state: Arc::new(RwLock::new(MemoryState::default())),
            faults: Arc::new(Mutex::new(FaultPlan::default())),
            upserts: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Registers a user whose secret is stored as a SHA-256 digest.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the state lock is poisoned.
    pub fn register_user(&self, subject: &str, secret: &str) -> ProviderResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        state
            .users
            .insert(subject.to_owned(), sha256_hex(secret.as_bytes()));
        Ok(())
    }

    /// Registers a callable function.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the state lock is poisoned.
    pub fn register_function(&self, name: FunctionName, body: MemoryFunction) -> ProviderResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.functions.insert(name, body);
        Ok(())
    }

    /// Inserts records directly, bypassing write accounting and faults.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the state lock is poisoned.
    pub fn seed(
        &self,
        collection: &CollectionName,
        records: impl IntoIterator<Item = Record>,
    ) -> ProviderResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        let rows = state.collections.entry(collection.clone()).or_default();
        for record in records {
            rows.insert(record.key().clone(), record);
        }
        Ok(())
    }

    /// Returns every record of a collection in key order.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the state lock is poisoned.
    pub fn snapshot(&self, collection: &CollectionName) -> ProviderResult<Vec<Record>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .collections
            .get(collection)
            .map(|rows| to_records(rows.values()))
            .unwrap_or_default())
    }

    /// Returns how many upserts this provider has applied.
    #[must_use]
    pub fn upsert_count(&self) -> u64 {
        self.upserts.load(Ordering::SeqCst)
    }

    /// Makes every probe fail with `error` until [`Self::heal_probes`].
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the fault lock is poisoned.
    pub fn fail_probes(&self, error: ProviderError) -> ProviderResult<()> {
        self.faults.lock().map_err(poisoned)?.probe_failure = Some(error);
        Ok(())
    }

    /// Clears a probe failure installed by [`Self::fail_probes`].
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the fault lock is poisoned.
    pub fn heal_probes(&self) -> ProviderResult<()> {
        self.faults.lock().map_err(poisoned)?.probe_failure = None;
        Ok(())
    }

    /// Delays every probe by `delay`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the fault lock is poisoned.
    pub fn set_probe_delay(&self, delay: Option<Duration>) -> ProviderResult<()> {
        self.faults.lock().map_err(poisoned)?.probe_delay = delay;
        Ok(())
    }

    /// Queues `error` as the outcome of the next non-probe operation.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the fault lock is poisoned.
    pub fn fail_next(&self, error: ProviderError) -> ProviderResult<()> {
        self.faults.lock().map_err(poisoned)?.scripted.push_back(error);
        Ok(())
    }

    /// Makes reads of `key` return a payload that differs from the stored one.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the fault lock is poisoned.
    pub fn corrupt_reads(&self, key: RecordKey) -> ProviderResult<()> {
        self.faults.lock().map_err(poisoned)?.corrupt_keys.insert(key);
        Ok(())
    }

    /// Makes every write of `key` fail with `error`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the fault lock is poisoned.
    pub fn reject_writes(&self, key: RecordKey, error: ProviderError) -> ProviderResult<()> {
        self.faults
            .lock()
            .map_err(poisoned)?
            .rejected_keys
            .insert(key, error);
        Ok(())
    }

    fn take_scripted(&self) -> ProviderResult<()> {
        let mut faults = self.faults.lock().map_err(poisoned)?;
        faults.scripted.pop_front().map_or(Ok(()), Err)
    }

    fn check_write(&self, key: &RecordKey) -> ProviderResult<()> {
        self.take_scripted()?;
        let faults = self.faults.lock().map_err(poisoned)?;
        faults.rejected_keys.get(key).cloned().map_or(Ok(()), Err)
    }

    fn is_corrupt(&self, key: &RecordKey) -> ProviderResult<bool> {
        let faults = self.faults.lock().map_err(poisoned)?;
        Ok(faults.corrupt_keys.contains(key))
    }
}

impl fmt::Debug for InMemoryProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryProvider")
            .field("name", &self.name)
            .field("upserts", &self.upsert_count())
            .finish_non_exhaustive()
    }
}

fn to_records<'a>(rows: impl Iterator<Item = &'a Record>) -> Vec<Record> {
    rows.cloned().collect()
}

#[async_trait]
impl ProviderAdapter for InMemoryProvider {
    fn name(&self) -> &ProviderName {
        &self.name
    }

    async fn create(&self, collection: &CollectionName, record: Record) -> ProviderResult<Record> {
        self.check_write(record.key())?;
        let mut state = self.state.write().map_err(poisoned)?;
        let rows = state.collections.entry(collection.clone()).or_default();
        if rows.contains_key(record.key()) {
            return Err(ProviderError::conflict(format!(
                "record '{}' already exists in '{collection}'",
                record.key()
            )));
        }
        rows.insert(record.key().clone(), record.clone());
        Ok(record)
    }

    async fn read(
        &self,
        collection: &CollectionName,
        key: &RecordKey,
    ) -> ProviderResult<Option<Record>> {
        self.take_scripted()?;
        let found = {
            let state = self.state.read().map_err(poisoned)?;
            state
                .collections
                .get(collection)
                .and_then(|rows| rows.get(key))
                .cloned()
        };
        match found {
            Some(record) if self.is_corrupt(key)? => {
                Ok(Some(record.with_field("__corrupted", Value::Bool(true))))
            }
            other => Ok(other),
        }
    }

    async fn query(
        &self,
        collection: &CollectionName,
        filter: &Filter,
    ) -> ProviderResult<Vec<Record>> {
        self.take_scripted()?;
        let state = self.state.read().map_err(poisoned)?;
        let Some(rows) = state.collections.get(collection) else {
            return Ok(Vec::new());
        };
        let matching = rows
            .values()
            .filter(|record| filter.matches(record.payload()))
            .take(filter.limit().unwrap_or(usize::MAX));
        Ok(to_records(matching))
    }

    async fn update(&self, collection: &CollectionName, record: Record) -> ProviderResult<Record> {
        self.check_write(record.key())?;
        let mut state = self.state.write().map_err(poisoned)?;
        let slot = state
            .collections
            .get_mut(collection)
            .and_then(|rows| rows.get_mut(record.key()))
            .ok_or_else(|| {
                ProviderError::not_found(format!(
                    "record '{}' not found in '{collection}'",
                    record.key()
                ))
            })?;
        slot.clone_from(&record);
        Ok(record)
    }

    async fn upsert(&self, collection: &CollectionName, record: Record) -> ProviderResult<Record> {
        self.check_write(record.key())?;
        let mut state = self.state.write().map_err(poisoned)?;
        state
            .collections
            .entry(collection.clone())
            .or_default()
            .insert(record.key().clone(), record.clone());
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }

    async fn delete(&self, collection: &CollectionName, key: &RecordKey) -> ProviderResult<()> {
        self.check_write(key)?;
        let mut state = self.state.write().map_err(poisoned)?;
        let removed = state
            .collections
            .get_mut(collection)
            .and_then(|rows| rows.remove(key));
        if removed.is_none() {
            return Err(ProviderError::not_found(format!(
                "record '{key}' not found in '{collection}'"
            )));
        }
        if state
            .collections
            .get(collection)
            .is_some_and(BTreeMap::is_empty)
        {
            state.collections.remove(collection);
        }
        Ok(())
    }

    async fn list_collections(&self) -> ProviderResult<Vec<CollectionName>> {
        self.take_scripted()?;
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .collections
            .iter()
            .filter(|(_, rows)| !rows.is_empty())
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn scan(
        &self,
        collection: &CollectionName,
        after: Option<RecordKey>,
        limit: usize,
    ) -> ProviderResult<Vec<Record>> {
        self.take_scripted()?;
        let state = self.state.read().map_err(poisoned)?;
        let Some(rows) = state.collections.get(collection) else {
            return Ok(Vec::new());
        };
        let page = rows
            .values()
            .filter(|record| after.as_ref().is_none_or(|cursor| record.key() > cursor))
            .take(limit);
        Ok(to_records(page))
    }

    async fn count(&self, collection: &CollectionName) -> ProviderResult<u64> {
        self.take_scripted()?;
        let state = self.state.read().map_err(poisoned)?;
        let count = state.collections.get(collection).map_or(0, BTreeMap::len);
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }

    async fn authenticate(&self, credentials: &Credentials) -> ProviderResult<Session> {
        self.take_scripted()?;
        let state = self.state.read().map_err(poisoned)?;
        let expected = state.users.get(credentials.subject());
        if expected != Some(&sha256_hex(credentials.secret().as_bytes())) {
            return Err(ProviderError::permanent(
                PermanentKind::AuthDenied,
                format!("credentials rejected for '{}'", credentials.subject()),
            ));
        }
        let issued_at = DefaultClock.utc();
        Ok(Session {
            token: uuid::Uuid::new_v4().to_string(),
            subject: credentials.subject().to_owned(),
            issued_at,
            expires_at: issued_at + ChronoDuration::minutes(SESSION_LIFETIME_MINUTES),
        })
    }

    async fn put_object(&self, path: &ObjectPath, content: Vec<u8>) -> ProviderResult<()> {
        self.take_scripted()?;
        let mut state = self.state.write().map_err(poisoned)?;
        state.objects.insert(path.clone(), content);
        Ok(())
    }

    async fn get_object(&self, path: &ObjectPath) -> ProviderResult<Option<Vec<u8>>> {
        self.take_scripted()?;
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.objects.get(path).cloned())
    }

    async fn delete_object(&self, path: &ObjectPath) -> ProviderResult<()> {
        self.take_scripted()?;
        let mut state = self.state.write().map_err(poisoned)?;
        state
            .objects
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| ProviderError::not_found(format!("object '{path}' not found")))
    }

    async fn list_objects(
        &self,
        after: Option<ObjectPath>,
        limit: usize,
    ) -> ProviderResult<Vec<ObjectPath>> {
        self.take_scripted()?;
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .objects
            .keys()
            .filter(|path| after.as_ref().is_none_or(|cursor| *path > cursor))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn subscribe(
        &self,
        topic: &Topic,
        handler: SubscriptionHandler,
    ) -> ProviderResult<Subscription> {
        self.take_scripted()?;
        let id = SubscriptionId::new();
        let mut state = self.state.write().map_err(poisoned)?;
        state.subscriptions.insert(id, (topic.clone(), handler));
        Ok(Subscription::new(id, topic.clone()))
    }

    async fn unsubscribe(&self, subscription: &Subscription) -> ProviderResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        state
            .subscriptions
            .remove(&subscription.id())
            .map(|_| ())
            .ok_or_else(|| {
                ProviderError::not_found(format!("subscription {} not found", subscription.id()))
            })
    }

    async fn publish(&self, topic: &Topic, payload: Value) -> ProviderResult<()> {
        self.take_scripted()?;
        let handlers: Vec<SubscriptionHandler> = {
            let state = self.state.read().map_err(poisoned)?;
            state
                .subscriptions
                .values()
                .filter(|(subscribed, _)| subscribed == topic)
                .map(|(_, handler)| Arc::clone(handler))
                .collect()
        };
        let message = RealtimeMessage {
            topic: topic.clone(),
            payload,
            published_at: DefaultClock.utc(),
        };
        for handler in handlers {
            handler(&message);
        }
        Ok(())
    }

    async fn invoke(&self, function: &FunctionName, payload: Value) -> ProviderResult<Value> {
        self.take_scripted()?;
        let registered = {
            let state = self.state.read().map_err(poisoned)?;
            state.functions.get(function).cloned()
        };
        let body = registered
            .ok_or_else(|| ProviderError::not_found(format!("function '{function}' not found")))?;
        body(payload)
    }

    async fn probe(&self) -> ProviderResult<HealthSignal> {
        let started = Instant::now();
        let delay = self.faults.lock().map_err(poisoned)?.probe_delay;
        if let Some(pause) = delay {
            tokio::time::sleep(pause).await;
        }
        let failure = self.faults.lock().map_err(poisoned)?.probe_failure.clone();
        match failure {
            Some(err) => Err(err),
            None => Ok(HealthSignal::new(started.elapsed())),
        }
    }
}
