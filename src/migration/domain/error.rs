//! Error types for migration domain validation and parsing.

use super::{MigrationId, MigrationStatus};
use crate::provider::domain::ProviderName;
use thiserror::Error;

/// Errors returned by migration plan state changes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MigrationDomainError {
    /// The requested status change is not allowed from the current status.
    #[error("migration {id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Plan being changed.
        id: MigrationId,
        /// Current status.
        from: MigrationStatus,
        /// Requested status.
        to: MigrationStatus,
    },

    /// Source and target name the same provider.
    #[error("migration source and target are both {0}")]
    SameProvider(ProviderName),

    /// Progress was recorded outside the `running` or `verifying` phases.
    #[error("migration {id} is {status}; progress can only be recorded while active")]
    NotActive {
        /// Plan being changed.
        id: MigrationId,
        /// Current status.
        status: MigrationStatus,
    },
}

/// Error returned while parsing migration statuses from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown migration status: {0}")]
pub struct ParseMigrationStatusError(pub String);

/// Error returned while parsing migration strategies.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown migration strategy: {0}")]
pub struct ParseMigrationStrategyError(pub String);
