//! Shared call path of the unified services.

use super::error::ServiceResult;
use crate::provider::{
    domain::Capability,
    ports::{ProviderAdapter, ProviderResult},
    services::{CallPolicy, call_with_retry},
};
use crate::routing::services::CapabilityRouter;
use std::future::Future;
use std::sync::Arc;

/// Resolves the serving adapter and applies the call policy.
#[derive(Clone)]
pub(super) struct Gateway {
    router: Arc<CapabilityRouter>,
    policy: CallPolicy,
}

impl Gateway {
    pub(super) const fn new(router: Arc<CapabilityRouter>, policy: CallPolicy) -> Self {
        Self { router, policy }
    }

    /// Runs a read against the adapter bound to `capability`.
    ///
    /// The adapter is resolved once; retries reuse it even if the binding
    /// flips meanwhile.
    pub(super) async fn read<T, F, Fut>(
        &self,
        capability: Capability,
        operation: &str,
        call: F,
    ) -> ServiceResult<T>
    where
        F: Fn(Arc<dyn ProviderAdapter>) -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let resolved = self.router.resolve(capability)?;
        tracing::trace!(
            %capability,
            provider = %resolved.binding.provider,
            operation,
            "routing call"
        );
        let adapter = resolved.adapter;
        Ok(call_with_retry(&self.policy, operation, || call(Arc::clone(&adapter))).await?)
    }

    /// Runs a write, holding the capability's write permit for its whole
    /// duration so a cutover can wait for it.
    pub(super) async fn write<T, F, Fut>(
        &self,
        capability: Capability,
        operation: &str,
        call: F,
    ) -> ServiceResult<T>
    where
        F: Fn(Arc<dyn ProviderAdapter>) -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let _permit = self.router.write_permit(capability).await;
        self.read(capability, operation, call).await
    }
}
