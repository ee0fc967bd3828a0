//! Repository port for provider descriptors and capability bindings.

use crate::provider::domain::{Capability, ProviderDescriptor};
use crate::routing::domain::BindingState;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Persistence contract for the provider catalog.
///
/// The manager saves the descriptor list after every successful
/// configuration and each binding change, so a restarted manager can
/// restore its providers and prefer the bindings it had.
#[async_trait]
pub trait ProviderCatalogRepository: Send + Sync {
    /// Replaces the stored descriptor list.
    async fn save_descriptors(&self, descriptors: &[ProviderDescriptor]) -> CatalogResult<()>;

    /// Returns the stored descriptors in the order they were saved.
    async fn load_descriptors(&self) -> CatalogResult<Vec<ProviderDescriptor>>;

    /// Stores the state of one capability.
    async fn save_binding(&self, capability: Capability, state: &BindingState)
    -> CatalogResult<()>;

    /// Returns every stored binding state, in capability order.
    async fn load_bindings(&self) -> CatalogResult<Vec<(Capability, BindingState)>>;
}

/// Errors returned by catalog implementations.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    /// Persistence-layer failure.
    #[error("catalog persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl CatalogError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
