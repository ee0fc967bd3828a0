//! Diesel row models for the `PostgreSQL` provider.

use super::schema::{provider_objects, provider_records};
use diesel::prelude::*;
use serde_json::Value;

/// Query result row for stored records.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = provider_records)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RecordRow {
    /// Record key.
    pub record_key: String,
    /// Record payload.
    pub payload: Value,
}

/// Insert model for stored records.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = provider_records)]
pub struct NewRecordRow {
    /// Collection identifier.
    pub collection: String,
    /// Record key.
    pub record_key: String,
    /// Record payload.
    pub payload: Value,
}

/// Insert model for stored objects.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = provider_objects)]
pub struct NewObjectRow {
    /// Relative object path.
    pub path: String,
    /// Object content.
    pub content: Vec<u8>,
}

/// Result row of a stored-function invocation.
#[derive(Debug, Clone, QueryableByName)]
pub struct InvocationRow {
    /// Function return value.
    #[diesel(sql_type = diesel::sql_types::Jsonb)]
    pub result: Value,
}
