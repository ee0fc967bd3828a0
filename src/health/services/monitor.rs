//! Periodic liveness probing of registered providers.

use crate::events::{ControlPlaneEvent, EventBus};
use crate::health::domain::{
    HealthPolicy, HealthRecord, HealthStatus, HealthTransition, ProbeOutcome,
};
use crate::provider::{domain::ProviderName, ports::ProviderAdapter};
use mockable::Clock;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

/// Errors returned by health monitor operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HealthMonitorError {
    /// No provider with this name is registered.
    #[error("provider is not monitored: {0}")]
    UnknownProvider(ProviderName),
    /// An internal lock was poisoned by a panicking thread.
    #[error("health monitor state lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Result type for health monitor operations.
pub type HealthMonitorResult<T> = Result<T, HealthMonitorError>;

/// Sink receiving every transition observed by the background probe loops.
pub type TransitionSink = mpsc::UnboundedSender<HealthTransition>;

struct MonitoredProvider {
    adapter: Arc<dyn ProviderAdapter>,
    record: RwLock<HealthRecord>,
    probe_gate: tokio::sync::Mutex<()>,
}

/// Tracks the health of every registered provider.
///
/// Each provider gets its own probe task once [`HealthMonitor::spawn_loops`]
/// has been called, so a slow probe delays only its own provider.
/// [`HealthMonitor::probe_all`] runs one concurrent round on demand.
pub struct HealthMonitor<C>
where
    C: Clock + Send + Sync + 'static,
{
    policy: HealthPolicy,
    clock: Arc<C>,
    events: EventBus,
    providers: RwLock<HashMap<ProviderName, Arc<MonitoredProvider>>>,
    loops: Mutex<LoopState>,
}

#[derive(Default)]
struct LoopState {
    sink: Option<TransitionSink>,
    handles: HashMap<ProviderName, JoinHandle<()>>,
}

fn poisoned(err: impl fmt::Display) -> HealthMonitorError {
    HealthMonitorError::LockPoisoned(err.to_string())
}

fn snapshot(entry: &MonitoredProvider) -> HealthMonitorResult<HealthRecord> {
    let record = entry.record.read().map_err(poisoned)?;
    Ok(record.clone())
}

impl<C> HealthMonitor<C>
where
    C: Clock + Send + Sync + 'static,
{
    /// Creates a monitor with no registered providers.
    #[must_use]
    pub fn new(policy: HealthPolicy, clock: Arc<C>, events: EventBus) -> Self {
        Self {
            policy,
            clock,
            events,
            providers: RwLock::new(HashMap::new()),
            loops: Mutex::new(LoopState::default()),
        }
    }

    /// Returns the probe policy.
    #[must_use]
    pub const fn policy(&self) -> &HealthPolicy {
        &self.policy
    }

    /// Starts monitoring `adapter` from the `unknown` state.
    ///
    /// Re-registering a name replaces its adapter and resets its record.
    /// When background loops are running, a loop is started for it.
    ///
    /// # Errors
    ///
    /// Returns [`HealthMonitorError::LockPoisoned`] when internal state is
    /// unavailable.
    pub fn register(&self, adapter: Arc<dyn ProviderAdapter>) -> HealthMonitorResult<()> {
        let name = adapter.name().clone();
        let entry = Arc::new(MonitoredProvider {
            record: RwLock::new(HealthRecord::new(name.clone())),
            adapter,
            probe_gate: tokio::sync::Mutex::new(()),
        });
        self.providers
            .write()
            .map_err(poisoned)?
            .insert(name.clone(), Arc::clone(&entry));

        let mut loops = self.loops.lock().map_err(poisoned)?;
        if let Some(sink) = loops.sink.clone() {
            let handle = self.spawn_loop(entry, sink);
            if let Some(previous) = loops.handles.insert(name, handle) {
                previous.abort();
            }
        }
        Ok(())
    }

    /// Stops monitoring a provider. Unknown names are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`HealthMonitorError::LockPoisoned`] when internal state is
    /// unavailable.
    pub fn deregister(&self, name: &ProviderName) -> HealthMonitorResult<()> {
        self.providers.write().map_err(poisoned)?.remove(name);
        if let Some(handle) = self.loops.lock().map_err(poisoned)?.handles.remove(name) {
            handle.abort();
        }
        Ok(())
    }

    /// Returns whether a provider is registered.
    ///
    /// # Errors
    ///
    /// Returns [`HealthMonitorError::LockPoisoned`] when internal state is
    /// unavailable.
    pub fn is_monitored(&self, name: &ProviderName) -> HealthMonitorResult<bool> {
        Ok(self.providers.read().map_err(poisoned)?.contains_key(name))
    }

    /// Returns a provider's current status, `Unknown` when unregistered.
    #[must_use]
    pub fn status(&self, name: &ProviderName) -> HealthStatus {
        self.record(name)
            .ok()
            .flatten()
            .map_or(HealthStatus::Unknown, |record| record.status())
    }

    /// Returns a clone of a provider's record.
    ///
    /// # Errors
    ///
    /// Returns [`HealthMonitorError::LockPoisoned`] when internal state is
    /// unavailable.
    pub fn record(&self, name: &ProviderName) -> HealthMonitorResult<Option<HealthRecord>> {
        let entry = self.providers.read().map_err(poisoned)?.get(name).cloned();
        entry.as_deref().map(snapshot).transpose()
    }

    /// Returns clones of every record, ordered by provider name.
    ///
    /// # Errors
    ///
    /// Returns [`HealthMonitorError::LockPoisoned`] when internal state is
    /// unavailable.
    pub fn records(&self) -> HealthMonitorResult<Vec<HealthRecord>> {
        let entries = self.entries()?;
        let mut records = entries
            .iter()
            .map(|entry| snapshot(entry))
            .collect::<HealthMonitorResult<Vec<_>>>()?;
        records.sort_by(|a, b| a.provider().cmp(b.provider()));
        Ok(records)
    }

    /// Probes the named providers concurrently and returns the transitions
    /// observed, ordered by provider name.
    ///
    /// # Errors
    ///
    /// Returns [`HealthMonitorError::UnknownProvider`] when a name is not
    /// registered; nothing is probed in that case.
    pub async fn probe_providers(
        &self,
        names: &[ProviderName],
    ) -> HealthMonitorResult<Vec<HealthTransition>> {
        let entries = {
            let providers = self.providers.read().map_err(poisoned)?;
            names
                .iter()
                .map(|name| {
                    providers
                        .get(name)
                        .cloned()
                        .ok_or_else(|| HealthMonitorError::UnknownProvider(name.clone()))
                })
                .collect::<HealthMonitorResult<Vec<_>>>()?
        };
        Ok(self.probe_round(entries).await)
    }

    /// Probes every registered provider concurrently and returns the
    /// transitions observed, ordered by provider name.
    ///
    /// # Errors
    ///
    /// Returns [`HealthMonitorError::LockPoisoned`] when internal state is
    /// unavailable.
    pub async fn probe_all(&self) -> HealthMonitorResult<Vec<HealthTransition>> {
        Ok(self.probe_round(self.entries()?).await)
    }

    async fn probe_round(&self, entries: Vec<Arc<MonitoredProvider>>) -> Vec<HealthTransition> {
        let mut round = JoinSet::new();
        for entry in entries {
            round.spawn(probe_once(
                entry,
                self.policy,
                Arc::clone(&self.clock),
                self.events.clone(),
            ));
        }

        let mut transitions = Vec::new();
        while let Some(joined) = round.join_next().await {
            match joined {
                Ok(Some(transition)) => transitions.push(transition),
                Ok(None) => {}
                Err(err) => tracing::error!(error = %err, "health probe task failed"),
            }
        }
        transitions.sort_by(|a, b| a.provider.cmp(&b.provider));
        transitions
    }

    /// Starts one probe loop per registered provider, forwarding every
    /// transition to `sink`. Providers registered later get loops too.
    ///
    /// # Errors
    ///
    /// Returns [`HealthMonitorError::LockPoisoned`] when internal state is
    /// unavailable.
    pub fn spawn_loops(&self, sink: TransitionSink) -> HealthMonitorResult<()> {
        let entries = self.entries()?;
        let mut loops = self.loops.lock().map_err(poisoned)?;
        for (_, handle) in loops.handles.drain() {
            handle.abort();
        }
        for entry in entries {
            let name = entry.adapter.name().clone();
            let handle = self.spawn_loop(entry, sink.clone());
            loops.handles.insert(name, handle);
        }
        loops.sink = Some(sink);
        Ok(())
    }

    /// Stops every probe loop.
    ///
    /// # Errors
    ///
    /// Returns [`HealthMonitorError::LockPoisoned`] when internal state is
    /// unavailable.
    pub fn stop(&self) -> HealthMonitorResult<()> {
        let mut loops = self.loops.lock().map_err(poisoned)?;
        loops.sink = None;
        for (provider, handle) in loops.handles.drain() {
            tracing::debug!(%provider, "stopping health probe loop");
            handle.abort();
        }
        Ok(())
    }

    fn entries(&self) -> HealthMonitorResult<Vec<Arc<MonitoredProvider>>> {
        Ok(self
            .providers
            .read()
            .map_err(poisoned)?
            .values()
            .cloned()
            .collect())
    }

    fn spawn_loop(&self, entry: Arc<MonitoredProvider>, sink: TransitionSink) -> JoinHandle<()> {
        let policy = self.policy;
        let clock = Arc::clone(&self.clock);
        let events = self.events.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(
                Instant::now() + policy.probe_interval,
                policy.probe_interval,
            );
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let observed =
                    probe_once(Arc::clone(&entry), policy, Arc::clone(&clock), events.clone())
                        .await;
                if let Some(transition) = observed
                    && sink.send(transition).is_err()
                {
                    break;
                }
            }
        })
    }
}

impl<C> Drop for HealthMonitor<C>
where
    C: Clock + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if let Ok(mut loops) = self.loops.lock() {
            for (_, handle) in loops.handles.drain() {
                handle.abort();
            }
        }
    }
}

async fn probe_once<C>(
    entry: Arc<MonitoredProvider>,
    policy: HealthPolicy,
    clock: Arc<C>,
    events: EventBus,
) -> Option<HealthTransition>
where
    C: Clock + Send + Sync,
{
    let _serialized = entry.probe_gate.lock().await;
    let outcome = match tokio::time::timeout(policy.probe_timeout, entry.adapter.probe()).await {
        Ok(Ok(signal)) => ProbeOutcome::Success {
            latency: signal.latency,
        },
        Ok(Err(err)) => ProbeOutcome::Failure {
            error: err.to_string(),
        },
        Err(_) => ProbeOutcome::Failure {
            error: format!(
                "probe exceeded its {}ms deadline",
                policy.probe_timeout.as_millis()
            ),
        },
    };

    let transition = match entry.record.write() {
        Ok(mut record) => record.apply(outcome, &policy, clock.utc()),
        Err(err) => {
            tracing::error!(
                provider = %entry.adapter.name(),
                error = %err,
                "health record lock poisoned; dropping probe outcome"
            );
            None
        }
    };

    if let Some(change) = &transition {
        events.publish(ControlPlaneEvent::HealthChanged {
            provider: change.provider.clone(),
            old: change.old,
            new: change.new,
        });
    }
    transition
}
