//! Function invocation facade.

use super::{error::ServiceResult, gateway::Gateway};
use crate::provider::domain::{Capability, FunctionName};
use serde_json::Value;

/// Invokes functions on the provider bound to `functions`.
#[derive(Clone)]
pub struct FunctionService {
    gateway: Gateway,
}

impl FunctionService {
    pub(super) const fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Invokes `function` with `payload`.
    ///
    /// Invocations are retried on transient failures, so functions should
    /// be idempotent.
    ///
    /// # Errors
    ///
    /// Returns a routing or provider error.
    pub async fn invoke(&self, function: &FunctionName, payload: Value) -> ServiceResult<Value> {
        self.gateway
            .read(Capability::Functions, "invoke", |adapter| {
                let input = payload.clone();
                async move { adapter.invoke(function, input).await }
            })
            .await
    }
}
