//! Port turning provider descriptors into live adapters.

use super::{ProviderAdapter, ProviderResult};
use crate::provider::domain::ProviderDescriptor;
use std::sync::Arc;

/// Builds adapters from descriptors.
///
/// Construction must not perform network I/O; connectivity is established
/// lazily and observed through probes.
pub trait AdapterFactory: Send + Sync {
    /// Builds an adapter for `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns [`super::ProviderError`] when the descriptor cannot be turned
    /// into an adapter (unknown pre-built adapter, malformed connection
    /// settings).
    fn build(&self, descriptor: &ProviderDescriptor) -> ProviderResult<Arc<dyn ProviderAdapter>>;
}
