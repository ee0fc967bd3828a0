//! Diesel schema for migration persistence.

diesel::table! {
    /// Migration plans, retained after completion as an audit trail.
    migration_plans (id) {
        /// Plan identifier.
        id -> Uuid,
        /// Migrated capability.
        #[max_length = 32]
        capability -> Varchar,
        /// Source provider name.
        #[max_length = 100]
        source_provider -> Varchar,
        /// Target provider name.
        #[max_length = 100]
        target_provider -> Varchar,
        /// Copy strategy.
        #[max_length = 32]
        strategy -> Varchar,
        /// Lifecycle status.
        #[max_length = 32]
        status -> Varchar,
        /// Items written to the target.
        copied -> Int8,
        /// Items compared during verification.
        verified -> Int8,
        /// Items that could not be copied.
        failed -> Int8,
        /// Compared items whose content differed.
        mismatched -> Int8,
        /// Backfill cursor partition.
        #[max_length = 255]
        cursor_partition -> Nullable<Varchar>,
        /// Backfill cursor key.
        #[max_length = 1024]
        cursor_key -> Nullable<Varchar>,
        /// Verification match rate in parts per million.
        match_rate_ppm -> Nullable<Int4>,
        /// Failure reason.
        failure_reason -> Nullable<Text>,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
        /// When the plan stopped.
        completed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Append-only verification checkpoints.
    consistency_checkpoints (id) {
        /// Surrogate key preserving insertion order.
        id -> Int8,
        /// Owning plan.
        migration_id -> Uuid,
        /// Item key, `partition/key`.
        item_key -> Text,
        /// Source digest.
        #[max_length = 64]
        source_hash -> Nullable<Varchar>,
        /// Target digest.
        #[max_length = 64]
        target_hash -> Nullable<Varchar>,
        /// Whether both digests matched.
        matched -> Bool,
        /// Comparison timestamp.
        checked_at -> Timestamptz,
    }
}

diesel::joinable!(consistency_checkpoints -> migration_plans (migration_id));
diesel::allow_tables_to_appear_in_same_query!(migration_plans, consistency_checkpoints);
