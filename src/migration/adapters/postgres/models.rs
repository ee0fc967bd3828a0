//! Diesel row models for migration persistence.

use super::schema::{consistency_checkpoints, migration_plans};
use chrono::{DateTime, Utc};
use diesel::prelude::*;

/// Query result and upsert row for migration plans.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = migration_plans)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct PlanRow {
    /// Plan identifier.
    pub id: uuid::Uuid,
    /// Migrated capability.
    pub capability: String,
    /// Source provider name.
    pub source_provider: String,
    /// Target provider name.
    pub target_provider: String,
    /// Copy strategy.
    pub strategy: String,
    /// Lifecycle status.
    pub status: String,
    /// Items written to the target.
    pub copied: i64,
    /// Items compared during verification.
    pub verified: i64,
    /// Items that could not be copied.
    pub failed: i64,
    /// Compared items whose content differed.
    pub mismatched: i64,
    /// Backfill cursor partition.
    pub cursor_partition: Option<String>,
    /// Backfill cursor key.
    pub cursor_key: Option<String>,
    /// Verification match rate in parts per million.
    pub match_rate_ppm: Option<i32>,
    /// Failure reason.
    pub failure_reason: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// When the plan stopped.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Query result row for checkpoints.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = consistency_checkpoints)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CheckpointRow {
    /// Owning plan.
    pub migration_id: uuid::Uuid,
    /// Item key.
    pub item_key: String,
    /// Source digest.
    pub source_hash: Option<String>,
    /// Target digest.
    pub target_hash: Option<String>,
    /// Whether both digests matched.
    pub matched: bool,
    /// Comparison timestamp.
    pub checked_at: DateTime<Utc>,
}

/// Insert model for checkpoints.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = consistency_checkpoints)]
pub struct NewCheckpointRow {
    /// Owning plan.
    pub migration_id: uuid::Uuid,
    /// Item key.
    pub item_key: String,
    /// Source digest.
    pub source_hash: Option<String>,
    /// Target digest.
    pub target_hash: Option<String>,
    /// Whether both digests matched.
    pub matched: bool,
    /// Comparison timestamp.
    pub checked_at: DateTime<Utc>,
}
