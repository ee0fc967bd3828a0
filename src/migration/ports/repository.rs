//! Repository port for migration plans and verification checkpoints.

use crate::migration::domain::{ConsistencyCheckpoint, MigrationId, MigrationPlan};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for migration repository operations.
pub type MigrationRepositoryResult<T> = Result<T, MigrationRepositoryError>;

/// Migration plan persistence contract.
#[async_trait]
pub trait MigrationRepository: Send + Sync {
    /// Stores a new plan.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationRepositoryError::DuplicatePlan`] when the plan ID
    /// already exists.
    async fn insert(&self, plan: &MigrationPlan) -> MigrationRepositoryResult<()>;

    /// Persists status, counters and cursor of an existing plan.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationRepositoryError::NotFound`] when the plan does not
    /// exist.
    async fn update(&self, plan: &MigrationPlan) -> MigrationRepositoryResult<()>;

    /// Finds a plan by identifier.
    async fn find_by_id(&self, id: MigrationId) -> MigrationRepositoryResult<Option<MigrationPlan>>;

    /// Returns every plan, oldest first.
    async fn list_all(&self) -> MigrationRepositoryResult<Vec<MigrationPlan>>;

    /// Returns plans in `pending`, `running` or `verifying`, oldest first.
    async fn list_unfinished(&self) -> MigrationRepositoryResult<Vec<MigrationPlan>>;

    /// Appends verification checkpoints.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationRepositoryError::NotFound`] when a checkpoint
    /// references an unknown plan.
    async fn append_checkpoints(
        &self,
        checkpoints: &[ConsistencyCheckpoint],
    ) -> MigrationRepositoryResult<()>;

    /// Returns a plan's checkpoints in insertion order.
    async fn list_checkpoints(
        &self,
        id: MigrationId,
    ) -> MigrationRepositoryResult<Vec<ConsistencyCheckpoint>>;
}

/// Errors returned by migration repository implementations.
#[derive(Debug, Clone, Error)]
pub enum MigrationRepositoryError {
    /// A plan with the same identifier already exists.
    #[error("duplicate migration identifier: {0}")]
    DuplicatePlan(MigrationId),

    /// The plan was not found.
    #[error("migration not found: {0}")]
    NotFound(MigrationId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl MigrationRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
