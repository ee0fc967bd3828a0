//! Per-capability routing table.
//!
//! Each capability owns a slot holding an atomically published
//! [`Route`]. Readers clone the `Arc` and never wait on a transition;
//! writers serialize through the slot's transition mutex and publish a new
//! route with a single swap. Calls already in flight keep the adapter they
//! resolved.

use super::dual_write::{DualWriteAdapter, MirrorHandle};
use crate::provider::{domain::Capability, domain::ProviderName, ports::ProviderAdapter};
use crate::routing::domain::{BindingState, CapabilityBinding};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard};

/// Errors returned by routing operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoutingError {
    /// Providers exist for the capability but none is healthy.
    #[error("no healthy provider for capability {0}")]
    NoHealthyProvider(Capability),
    /// No provider is configured for the capability.
    #[error("capability {0} is not bound to any provider")]
    Unbound(Capability),
    /// A routing slot lock was poisoned by a panicking thread.
    #[error("routing slot lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Result type for routing operations.
pub type RoutingResult<T> = Result<T, RoutingError>;

fn poisoned(err: impl fmt::Display) -> RoutingError {
    RoutingError::LockPoisoned(err.to_string())
}

/// Published routing state of one capability.
#[derive(Clone)]
pub struct Route {
    state: BindingState,
    primary: Option<Arc<dyn ProviderAdapter>>,
    mirror: Option<MirrorHandle>,
    effective: Option<Arc<dyn ProviderAdapter>>,
}

impl Route {
    fn unbound() -> Self {
        Self {
            state: BindingState::Unbound,
            primary: None,
            mirror: None,
            effective: None,
        }
    }

    fn bound(binding: CapabilityBinding, adapter: Arc<dyn ProviderAdapter>) -> Self {
        Self {
            state: BindingState::Bound(binding),
            primary: Some(Arc::clone(&adapter)),
            mirror: None,
            effective: Some(adapter),
        }
    }

    /// Returns the binding state.
    #[must_use]
    pub const fn state(&self) -> &BindingState {
        &self.state
    }

    /// Returns the installed mirror, if any.
    #[must_use]
    pub const fn mirror(&self) -> Option<&MirrorHandle> {
        self.mirror.as_ref()
    }

    /// Returns the adapter of the bound provider, without mirroring.
    #[must_use]
    pub fn primary(&self) -> Option<Arc<dyn ProviderAdapter>> {
        self.primary.clone()
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("state", &self.state)
            .field("mirror", &self.mirror.as_ref().map(MirrorHandle::target))
            .finish_non_exhaustive()
    }
}

/// Outcome of a successful [`CapabilityRouter::resolve`].
#[derive(Clone)]
pub struct Resolved {
    /// The binding in force when the route was read.
    pub binding: CapabilityBinding,
    /// Adapter to call; a dual-write wrapper while a mirror is installed.
    pub adapter: Arc<dyn ProviderAdapter>,
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolved")
            .field("binding", &self.binding)
            .field("adapter", self.adapter.name())
            .finish()
    }
}

struct BindingSlot {
    route: RwLock<Arc<Route>>,
    transition: Mutex<()>,
    write_gate: Arc<tokio::sync::RwLock<()>>,
}

impl BindingSlot {
    fn new() -> Self {
        Self {
            route: RwLock::new(Arc::new(Route::unbound())),
            transition: Mutex::new(()),
            write_gate: Arc::new(tokio::sync::RwLock::new(())),
        }
    }

    fn load(&self) -> RoutingResult<Arc<Route>> {
        let route = self.route.read().map_err(poisoned)?;
        Ok(Arc::clone(&route))
    }

    fn store(&self, next: Route) -> RoutingResult<Arc<Route>> {
        let mut route = self.route.write().map_err(poisoned)?;
        Ok(std::mem::replace(&mut *route, Arc::new(next)))
    }
}

/// Capability → adapter routing table.
pub struct CapabilityRouter {
    database: BindingSlot,
    auth: BindingSlot,
    storage: BindingSlot,
    realtime: BindingSlot,
    functions: BindingSlot,
}

impl Default for CapabilityRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityRouter {
    /// Creates a router with every capability unbound.
    #[must_use]
    pub fn new() -> Self {
        Self {
            database: BindingSlot::new(),
            auth: BindingSlot::new(),
            storage: BindingSlot::new(),
            realtime: BindingSlot::new(),
            functions: BindingSlot::new(),
        }
    }

    const fn slot(&self, capability: Capability) -> &BindingSlot {
        match capability {
            Capability::Database => &self.database,
            Capability::Auth => &self.auth,
            Capability::Storage => &self.storage,
            Capability::Realtime => &self.realtime,
            Capability::Functions => &self.functions,
        }
    }

    /// Returns the adapter currently serving `capability`.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::NoHealthyProvider`] or
    /// [`RoutingError::Unbound`] when no provider serves the capability.
    pub fn resolve(&self, capability: Capability) -> RoutingResult<Resolved> {
        let route = self.slot(capability).load()?;
        match (&route.state, &route.effective) {
            (BindingState::Bound(binding), Some(adapter)) => Ok(Resolved {
                binding: binding.clone(),
                adapter: Arc::clone(adapter),
            }),
            (BindingState::NoHealthyProvider { .. }, _) => {
                Err(RoutingError::NoHealthyProvider(capability))
            }
            _ => Err(RoutingError::Unbound(capability)),
        }
    }

    /// Returns the published route of `capability`.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::LockPoisoned`] when the slot is poisoned.
    pub fn current(&self, capability: Capability) -> RoutingResult<Arc<Route>> {
        self.slot(capability).load()
    }

    /// Returns the binding state of every capability.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::LockPoisoned`] when a slot is poisoned.
    pub fn bindings(&self) -> RoutingResult<Vec<(Capability, BindingState)>> {
        Capability::ALL
            .into_iter()
            .map(|capability| {
                let route = self.slot(capability).load()?;
                Ok((capability, route.state.clone()))
            })
            .collect()
    }

    /// Returns the capabilities currently bound to `provider`.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::LockPoisoned`] when a slot is poisoned.
    pub fn capabilities_bound_to(&self, provider: &ProviderName) -> RoutingResult<Vec<Capability>> {
        Ok(self
            .bindings()?
            .into_iter()
            .filter(|(_, state)| state.provider() == Some(provider))
            .map(|(capability, _)| capability)
            .collect())
    }

    /// Acquires the transition mutex of `capability`.
    ///
    /// The returned guard is the only way to change the capability's route.
    pub async fn begin_transition(&self, capability: Capability) -> TransitionGuard<'_> {
        let slot = self.slot(capability);
        let held = slot.transition.lock().await;
        TransitionGuard {
            capability,
            slot,
            _held: held,
        }
    }

    /// Takes a shared write permit, waiting while writes are paused.
    pub async fn write_permit(&self, capability: Capability) -> OwnedRwLockReadGuard<()> {
        Arc::clone(&self.slot(capability).write_gate).read_owned().await
    }

    /// Pauses writes to `capability` until the guard is dropped.
    ///
    /// Waits for in-flight writes holding a permit to finish.
    pub async fn pause_writes(&self, capability: Capability) -> OwnedRwLockWriteGuard<()> {
        Arc::clone(&self.slot(capability).write_gate).write_owned().await
    }
}

/// Exclusive right to change one capability's route.
pub struct TransitionGuard<'a> {
    capability: Capability,
    slot: &'a BindingSlot,
    _held: MutexGuard<'a, ()>,
}

impl TransitionGuard<'_> {
    /// Returns the guarded capability.
    #[must_use]
    pub const fn capability(&self) -> Capability {
        self.capability
    }

    /// Returns the route currently published.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::LockPoisoned`] when the slot is poisoned.
    pub fn current(&self) -> RoutingResult<Arc<Route>> {
        self.slot.load()
    }

    /// Publishes a binding to `adapter`, dropping any installed mirror.
    ///
    /// Returns the replaced route.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::LockPoisoned`] when the slot is poisoned.
    pub fn bind(
        &self,
        binding: CapabilityBinding,
        adapter: Arc<dyn ProviderAdapter>,
    ) -> RoutingResult<Arc<Route>> {
        self.slot.store(Route::bound(binding, adapter))
    }

    /// Publishes the no-healthy-provider state.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::LockPoisoned`] when the slot is poisoned.
    pub fn mark_no_healthy(
        &self,
        previous: Option<ProviderName>,
        since: DateTime<Utc>,
    ) -> RoutingResult<Arc<Route>> {
        self.slot.store(Route {
            state: BindingState::NoHealthyProvider { previous, since },
            ..Route::unbound()
        })
    }

    /// Publishes the unbound state.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::LockPoisoned`] when the slot is poisoned.
    pub fn unbind(&self) -> RoutingResult<Arc<Route>> {
        self.slot.store(Route::unbound())
    }

    /// Wraps the bound adapter so writes are mirrored through `mirror`.
    ///
    /// Returns `false` and leaves the route unchanged when the capability is
    /// not bound.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::LockPoisoned`] when the slot is poisoned.
    pub fn install_mirror(&self, mirror: MirrorHandle) -> RoutingResult<bool> {
        let route = self.slot.load()?;
        let Some(primary) = route.primary.clone() else {
            return Ok(false);
        };
        let wrapped: Arc<dyn ProviderAdapter> =
            Arc::new(DualWriteAdapter::new(Arc::clone(&primary), mirror.clone()));
        self.slot.store(Route {
            state: route.state.clone(),
            primary: Some(primary),
            mirror: Some(mirror),
            effective: Some(wrapped),
        })?;
        Ok(true)
    }

    /// Removes the installed mirror, returning it.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::LockPoisoned`] when the slot is poisoned.
    pub fn remove_mirror(&self) -> RoutingResult<Option<MirrorHandle>> {
        let route = self.slot.load()?;
        if route.mirror.is_none() {
            return Ok(None);
        }
        let mirror = route.mirror.clone();
        self.slot.store(Route {
            state: route.state.clone(),
            primary: route.primary.clone(),
            mirror: None,
            effective: route.primary.clone(),
        })?;
        Ok(mirror)
    }
}
