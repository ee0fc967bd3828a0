//! In-memory repository for migration plans.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::migration::{
    domain::{ConsistencyCheckpoint, MigrationId, MigrationPlan},
    ports::{MigrationRepository, MigrationRepositoryError, MigrationRepositoryResult},
};

/// Thread-safe in-memory migration repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMigrationRepository {
    state: Arc<RwLock<InMemoryMigrationState>>,
}

#[derive(Debug, Default)]
struct InMemoryMigrationState {
    plans: HashMap<MigrationId, MigrationPlan>,
    checkpoints: HashMap<MigrationId, Vec<ConsistencyCheckpoint>>,
}

impl InMemoryMigrationRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_error(err: impl ToString) -> MigrationRepositoryError {
    MigrationRepositoryError::persistence(std::io::Error::other(err.to_string()))
}

fn sorted(mut plans: Vec<MigrationPlan>) -> Vec<MigrationPlan> {
    plans.sort_by(|left, right| {
        left.created_at()
            .cmp(&right.created_at())
            .then_with(|| left.id().cmp(&right.id()))
    });
    plans
}

#[async_trait]
impl MigrationRepository for InMemoryMigrationRepository {
    async fn insert(&self, plan: &MigrationPlan) -> MigrationRepositoryResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        if state.plans.contains_key(&plan.id()) {
            return Err(MigrationRepositoryError::DuplicatePlan(plan.id()));
        }
        state.plans.insert(plan.id(), plan.clone());
        Ok(())
    }

    async fn update(&self, plan: &MigrationPlan) -> MigrationRepositoryResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        let stored = state
            .plans
            .get_mut(&plan.id())
            .ok_or(MigrationRepositoryError::NotFound(plan.id()))?;
        *stored = plan.clone();
        Ok(())
    }

    async fn find_by_id(&self, id: MigrationId) -> MigrationRepositoryResult<Option<MigrationPlan>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state.plans.get(&id).cloned())
    }

    async fn list_all(&self) -> MigrationRepositoryResult<Vec<MigrationPlan>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(sorted(state.plans.values().cloned().collect()))
    }

    async fn list_unfinished(&self) -> MigrationRepositoryResult<Vec<MigrationPlan>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(sorted(
            state
                .plans
                .values()
                .filter(|plan| plan.status().is_active())
                .cloned()
                .collect(),
        ))
    }

    async fn append_checkpoints(
        &self,
        checkpoints: &[ConsistencyCheckpoint],
    ) -> MigrationRepositoryResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        if let Some(unknown) = checkpoints
            .iter()
            .find(|checkpoint| !state.plans.contains_key(&checkpoint.migration_id))
        {
            return Err(MigrationRepositoryError::NotFound(unknown.migration_id));
        }
        for checkpoint in checkpoints {
            state
                .checkpoints
                .entry(checkpoint.migration_id)
                .or_default()
                .push(checkpoint.clone());
        }
        Ok(())
    }

    async fn list_checkpoints(
        &self,
        id: MigrationId,
    ) -> MigrationRepositoryResult<Vec<ConsistencyCheckpoint>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state.checkpoints.get(&id).cloned().unwrap_or_default())
    }
}
