//! Adapter factories for the reference providers and for pre-built adapters.

use super::{memory::InMemoryProvider, postgres::PostgresProvider};
use crate::provider::{
    domain::{ConnectionParams, ProviderDescriptor, ProviderName},
    ports::{AdapterFactory, ProviderAdapter, ProviderError, ProviderResult},
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Builds the adapter matching each descriptor's connection kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardAdapterFactory;

impl AdapterFactory for StandardAdapterFactory {
    fn build(&self, descriptor: &ProviderDescriptor) -> ProviderResult<Arc<dyn ProviderAdapter>> {
        let name = descriptor.name().clone();
        let adapter: Arc<dyn ProviderAdapter> = match descriptor.connection() {
            ConnectionParams::Memory => Arc::new(InMemoryProvider::new(name)),
            ConnectionParams::Postgres(connection) => {
                Arc::new(PostgresProvider::connect_lazy(name, connection))
            }
        };
        Ok(adapter)
    }
}

/// Hands out adapters registered ahead of time, keyed by provider name.
///
/// Used when the embedding application constructs its own adapters, and by
/// tests that need handles to in-memory providers for fault injection.
#[derive(Clone, Default)]
pub struct StaticAdapterFactory {
    adapters: Arc<RwLock<HashMap<ProviderName, Arc<dyn ProviderAdapter>>>>,
}

impl StaticAdapterFactory {
    /// Creates an empty factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the adapter returned for descriptors named like it.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the registry lock is poisoned.
    pub fn insert(&self, adapter: Arc<dyn ProviderAdapter>) -> ProviderResult<()> {
        let mut adapters = self
            .adapters
            .write()
            .map_err(|err| ProviderError::connection(err.to_string()))?;
        adapters.insert(adapter.name().clone(), adapter);
        Ok(())
    }

    /// Registers an adapter and returns the factory, for fluent setup.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the registry lock is poisoned.
    pub fn with(self, adapter: Arc<dyn ProviderAdapter>) -> ProviderResult<Self> {
        self.insert(adapter)?;
        Ok(self)
    }
}

impl AdapterFactory for StaticAdapterFactory {
    fn build(&self, descriptor: &ProviderDescriptor) -> ProviderResult<Arc<dyn ProviderAdapter>> {
        let adapters = self
            .adapters
            .read()
            .map_err(|err| ProviderError::connection(err.to_string()))?;
        adapters.get(descriptor.name()).cloned().ok_or_else(|| {
            ProviderError::not_found(format!(
                "no pre-built adapter registered for provider '{}'",
                descriptor.name()
            ))
        })
    }
}
