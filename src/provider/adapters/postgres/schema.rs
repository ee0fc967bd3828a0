//! Diesel schema for the `PostgreSQL` provider's data tables.

diesel::table! {
    /// Database-capability records, one row per (collection, key).
    provider_records (collection, record_key) {
        /// Collection identifier.
        #[max_length = 63]
        collection -> Varchar,
        /// Record key, unique within its collection.
        #[max_length = 255]
        record_key -> Varchar,
        /// Record payload as a JSON object.
        payload -> Jsonb,
        /// Last write timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Storage-capability objects addressed by path.
    provider_objects (path) {
        /// Relative object path.
        #[max_length = 1024]
        path -> Varchar,
        /// Object content.
        content -> Bytea,
        /// Last write timestamp.
        updated_at -> Timestamptz,
    }
}
