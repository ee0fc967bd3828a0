//! In-memory provider catalog.

use crate::manager::ports::{CatalogError, CatalogResult, ProviderCatalogRepository};
use crate::provider::domain::{Capability, ProviderDescriptor};
use crate::routing::domain::BindingState;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Thread-safe in-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProviderCatalog {
    state: Arc<RwLock<CatalogState>>,
}

#[derive(Debug, Default)]
struct CatalogState {
    descriptors: Vec<ProviderDescriptor>,
    bindings: BTreeMap<Capability, BindingState>,
}

impl InMemoryProviderCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_error(err: impl ToString) -> CatalogError {
    CatalogError::persistence(std::io::Error::other(err.to_string()))
}

#[async_trait]
impl ProviderCatalogRepository for InMemoryProviderCatalog {
    async fn save_descriptors(&self, descriptors: &[ProviderDescriptor]) -> CatalogResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        state.descriptors = descriptors.to_vec();
        Ok(())
    }

    async fn load_descriptors(&self) -> CatalogResult<Vec<ProviderDescriptor>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state.descriptors.clone())
    }

    async fn save_binding(
        &self,
        capability: Capability,
        binding: &BindingState,
    ) -> CatalogResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        state.bindings.insert(capability, binding.clone());
        Ok(())
    }

    async fn load_bindings(&self) -> CatalogResult<Vec<(Capability, BindingState)>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state
            .bindings
            .iter()
            .map(|(capability, binding)| (*capability, binding.clone()))
            .collect())
    }
}
