//! `PostgreSQL` repository implementation for migration plans.

use super::{
    models::{CheckpointRow, NewCheckpointRow, PlanRow},
    schema::{consistency_checkpoints, migration_plans},
};
use crate::migration::{
    domain::{
        BackfillCursor, ConsistencyCheckpoint, ContentHash, MatchRate, MigrationId,
        MigrationPlan, MigrationStatus, MigrationStrategy, PersistedMigrationData,
        ProgressCounters,
    },
    ports::{MigrationRepository, MigrationRepositoryError, MigrationRepositoryResult},
};
use crate::provider::domain::{Capability, ProviderName};
use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};

/// `PostgreSQL` connection pool type used by migration adapters.
pub type MigrationPgPool = Pool<ConnectionManager<PgConnection>>;

const ACTIVE_STATUSES: [&str; 3] = ["pending", "running", "verifying"];

/// `PostgreSQL`-backed migration repository.
#[derive(Debug, Clone)]
pub struct PostgresMigrationRepository {
    pool: MigrationPgPool,
}

impl PostgresMigrationRepository {
    /// Creates a new repository from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: MigrationPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> MigrationRepositoryResult<T>
    where
        F: FnOnce(&mut PgConnection) -> MigrationRepositoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(MigrationRepositoryError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(MigrationRepositoryError::persistence)?
    }
}

#[async_trait]
impl MigrationRepository for PostgresMigrationRepository {
    async fn insert(&self, plan: &MigrationPlan) -> MigrationRepositoryResult<()> {
        let plan_id = plan.id();
        let row = to_row(plan)?;
        self.run_blocking(move |connection| {
            diesel::insert_into(migration_plans::table)
                .values(&row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        MigrationRepositoryError::DuplicatePlan(plan_id)
                    }
                    _ => MigrationRepositoryError::persistence(err),
                })?;
            Ok(())
        })
        .await
    }

    async fn update(&self, plan: &MigrationPlan) -> MigrationRepositoryResult<()> {
        let plan_id = plan.id();
        let row = to_row(plan)?;
        self.run_blocking(move |connection| {
            let updated = diesel::update(migration_plans::table.find(plan_id.into_inner()))
                .set(&row)
                .execute(connection)
                .map_err(MigrationRepositoryError::persistence)?;
            if updated == 0 {
                return Err(MigrationRepositoryError::NotFound(plan_id));
            }
            Ok(())
        })
        .await
    }

    async fn find_by_id(&self, id: MigrationId) -> MigrationRepositoryResult<Option<MigrationPlan>> {
        self.run_blocking(move |connection| {
            let row = migration_plans::table
                .find(id.into_inner())
                .select(PlanRow::as_select())
                .first::<PlanRow>(connection)
                .optional()
                .map_err(MigrationRepositoryError::persistence)?;
            row.map(row_to_plan).transpose()
        })
        .await
    }

    async fn list_all(&self) -> MigrationRepositoryResult<Vec<MigrationPlan>> {
        self.run_blocking(|connection| {
            migration_plans::table
                .order((migration_plans::created_at.asc(), migration_plans::id.asc()))
                .select(PlanRow::as_select())
                .load::<PlanRow>(connection)
                .map_err(MigrationRepositoryError::persistence)?
                .into_iter()
                .map(row_to_plan)
                .collect()
        })
        .await
    }

    async fn list_unfinished(&self) -> MigrationRepositoryResult<Vec<MigrationPlan>> {
        self.run_blocking(|connection| {
            migration_plans::table
                .filter(migration_plans::status.eq_any(ACTIVE_STATUSES))
                .order((migration_plans::created_at.asc(), migration_plans::id.asc()))
                .select(PlanRow::as_select())
                .load::<PlanRow>(connection)
                .map_err(MigrationRepositoryError::persistence)?
                .into_iter()
                .map(row_to_plan)
                .collect()
        })
        .await
    }

    async fn append_checkpoints(
        &self,
        checkpoints: &[ConsistencyCheckpoint],
    ) -> MigrationRepositoryResult<()> {
        let rows: Vec<NewCheckpointRow> = checkpoints.iter().map(to_checkpoint_row).collect();
        let first_id = checkpoints.first().map(|checkpoint| checkpoint.migration_id);
        self.run_blocking(move |connection| {
            diesel::insert_into(consistency_checkpoints::table)
                .values(&rows)
                .execute(connection)
                .map_err(|err| match (err, first_id) {
                    (
                        DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _),
                        Some(id),
                    ) => MigrationRepositoryError::NotFound(id),
                    (other, _) => MigrationRepositoryError::persistence(other),
                })?;
            Ok(())
        })
        .await
    }

    async fn list_checkpoints(
        &self,
        id: MigrationId,
    ) -> MigrationRepositoryResult<Vec<ConsistencyCheckpoint>> {
        self.run_blocking(move |connection| {
            let rows = consistency_checkpoints::table
                .filter(consistency_checkpoints::migration_id.eq(id.into_inner()))
                .order(consistency_checkpoints::id.asc())
                .select(CheckpointRow::as_select())
                .load::<CheckpointRow>(connection)
                .map_err(MigrationRepositoryError::persistence)?;
            Ok(rows.into_iter().map(row_to_checkpoint).collect())
        })
        .await
    }
}

fn to_i64(value: u64) -> MigrationRepositoryResult<i64> {
    i64::try_from(value).map_err(MigrationRepositoryError::persistence)
}

fn to_u64(value: i64) -> MigrationRepositoryResult<u64> {
    u64::try_from(value).map_err(MigrationRepositoryError::persistence)
}

fn to_row(plan: &MigrationPlan) -> MigrationRepositoryResult<PlanRow> {
    let progress = plan.progress();
    let match_rate_ppm = plan
        .match_rate()
        .map(|rate| i32::try_from(rate.ppm()).map_err(MigrationRepositoryError::persistence))
        .transpose()?;
    Ok(PlanRow {
        id: plan.id().into_inner(),
        capability: plan.capability().as_str().to_owned(),
        source_provider: plan.source().as_str().to_owned(),
        target_provider: plan.target().as_str().to_owned(),
        strategy: plan.strategy().as_str().to_owned(),
        status: plan.status().as_str().to_owned(),
        copied: to_i64(progress.copied)?,
        verified: to_i64(progress.verified)?,
        failed: to_i64(progress.failed)?,
        mismatched: to_i64(progress.mismatched)?,
        cursor_partition: plan.cursor().map(|cursor| cursor.partition.clone()),
        cursor_key: plan.cursor().map(|cursor| cursor.last_key.clone()),
        match_rate_ppm,
        failure_reason: plan.failure_reason().map(str::to_owned),
        created_at: plan.created_at(),
        updated_at: plan.updated_at(),
        completed_at: plan.completed_at(),
    })
}

fn row_to_plan(row: PlanRow) -> MigrationRepositoryResult<MigrationPlan> {
    let PlanRow {
        id,
        capability: persisted_capability,
        source_provider,
        target_provider,
        strategy: persisted_strategy,
        status: persisted_status,
        copied,
        verified,
        failed,
        mismatched,
        cursor_partition,
        cursor_key,
        match_rate_ppm,
        failure_reason,
        created_at,
        updated_at,
        completed_at,
    } = row;

    let capability = Capability::try_from(persisted_capability.as_str())
        .map_err(MigrationRepositoryError::persistence)?;
    let strategy = MigrationStrategy::try_from(persisted_strategy.as_str())
        .map_err(MigrationRepositoryError::persistence)?;
    let status = MigrationStatus::try_from(persisted_status.as_str())
        .map_err(MigrationRepositoryError::persistence)?;
    let source = ProviderName::new(source_provider).map_err(MigrationRepositoryError::persistence)?;
    let target = ProviderName::new(target_provider).map_err(MigrationRepositoryError::persistence)?;
    let cursor = cursor_partition
        .zip(cursor_key)
        .map(|(partition, last_key)| BackfillCursor::new(partition, last_key));
    let match_rate = match_rate_ppm
        .map(|ppm| {
            u32::try_from(ppm)
                .map(MatchRate::from_ppm)
                .map_err(MigrationRepositoryError::persistence)
        })
        .transpose()?;

    Ok(MigrationPlan::from_persisted(PersistedMigrationData {
        id: MigrationId::from_uuid(id),
        capability,
        source,
        target,
        strategy,
        status,
        progress: ProgressCounters {
            copied: to_u64(copied)?,
            verified: to_u64(verified)?,
            failed: to_u64(failed)?,
            mismatched: to_u64(mismatched)?,
        },
        cursor,
        match_rate,
        failure_reason,
        created_at,
        updated_at,
        completed_at,
    }))
}

fn to_checkpoint_row(checkpoint: &ConsistencyCheckpoint) -> NewCheckpointRow {
    NewCheckpointRow {
        migration_id: checkpoint.migration_id.into_inner(),
        item_key: checkpoint.item_key.clone(),
        source_hash: checkpoint
            .source_hash
            .as_ref()
            .map(|hash| hash.as_str().to_owned()),
        target_hash: checkpoint
            .target_hash
            .as_ref()
            .map(|hash| hash.as_str().to_owned()),
        matched: checkpoint.matched,
        checked_at: checkpoint.checked_at,
    }
}

fn row_to_checkpoint(row: CheckpointRow) -> ConsistencyCheckpoint {
    ConsistencyCheckpoint {
        migration_id: MigrationId::from_uuid(row.migration_id),
        item_key: row.item_key,
        source_hash: row.source_hash.map(ContentHash::from_hex),
        target_hash: row.target_hash.map(ContentHash::from_hex),
        matched: row.matched,
        checked_at: row.checked_at,
    }
}
