//! Errors returned by the backend manager.

use crate::config::ConfigurationError;
use crate::health::{domain::HealthStatus, services::HealthMonitorError};
use crate::manager::ports::CatalogError;
use crate::migration::{
    domain::{MigrationDomainError, MigrationId, MigrationStatus},
    ports::MigrationRepositoryError,
    services::MigrationError,
};
use crate::provider::domain::{Capability, ProviderName};
use crate::routing::services::RoutingError;
use thiserror::Error;

/// Errors returned by [`super::BackendManager`] operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Configuration was rejected; the previous configuration stays active.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// No provider with this name is configured.
    #[error("unknown provider: {0}")]
    UnknownProvider(ProviderName),
    /// The provider is disabled.
    #[error("provider {0} is disabled")]
    ProviderDisabled(ProviderName),
    /// The provider is not healthy enough to receive a binding.
    #[error("provider {provider} is {status}")]
    ProviderUnhealthy {
        /// Provider that was requested.
        provider: ProviderName,
        /// Its current status.
        status: HealthStatus,
    },
    /// The provider does not declare the capability.
    #[error("provider {provider} does not serve {capability}")]
    CapabilityNotSupported {
        /// Provider that was requested.
        provider: ProviderName,
        /// Capability it lacks.
        capability: Capability,
    },
    /// The capability is already bound to the requested provider.
    #[error("{capability} is already bound to {provider}")]
    AlreadyBound {
        /// Capability of the request.
        capability: Capability,
        /// Provider already serving it.
        provider: ProviderName,
    },
    /// Another plan for the capability has not finished.
    #[error("migration {active} is still running for {capability}")]
    MigrationConflict {
        /// Contended capability.
        capability: Capability,
        /// Plan that holds it.
        active: MigrationId,
    },
    /// No plan with this identifier exists.
    #[error("unknown migration: {0}")]
    UnknownMigration(MigrationId),
    /// The plan has already stopped.
    #[error("migration {id} is not running (status {status})")]
    MigrationNotActive {
        /// The plan.
        id: MigrationId,
        /// Its status.
        status: MigrationStatus,
    },
    /// The plan cannot be rolled back.
    #[error("migration {id} cannot be rolled back: {reason}")]
    RollbackUnavailable {
        /// The plan.
        id: MigrationId,
        /// Why not.
        reason: String,
    },
    /// A migration pass failed.
    #[error(transparent)]
    Migration(#[from] MigrationError),
    /// A plan state change was rejected.
    #[error(transparent)]
    Domain(#[from] MigrationDomainError),
    /// Plan persistence failed.
    #[error(transparent)]
    MigrationRepository(#[from] MigrationRepositoryError),
    /// Catalog persistence failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// The routing table rejected the operation.
    #[error(transparent)]
    Routing(#[from] RoutingError),
    /// The health monitor rejected the operation.
    #[error(transparent)]
    Health(#[from] HealthMonitorError),
    /// Manager state was poisoned by a panicking thread.
    #[error("manager state lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Result type for backend manager operations.
pub type ManagerResult<T> = Result<T, ManagerError>;
