//! Errors returned by unified services.

use crate::provider::ports::ProviderError;
use crate::routing::services::RoutingError;
use thiserror::Error;

/// Error of a unified service call.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// No provider could take the call.
    #[error(transparent)]
    Routing(#[from] RoutingError),
    /// The provider failed the call after retries.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl ServiceError {
    /// Returns whether the call failed because no healthy provider exists.
    #[must_use]
    pub const fn is_no_healthy_provider(&self) -> bool {
        matches!(self, Self::Routing(RoutingError::NoHealthyProvider(_)))
    }
}

/// Result type for unified service calls.
pub type ServiceResult<T> = Result<T, ServiceError>;
