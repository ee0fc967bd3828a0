//! Diesel row models for the provider catalog.

use super::schema::{capability_bindings, provider_descriptors};
use chrono::{DateTime, Utc};
use diesel::prelude::*;

/// Row of `provider_descriptors`.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = provider_descriptors)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DescriptorRow {
    /// Provider name.
    pub name: String,
    /// Position in the configuration.
    pub position: i32,
    /// Serialized descriptor.
    pub descriptor: serde_json::Value,
    /// When the row was written.
    pub updated_at: DateTime<Utc>,
}

/// Row of `capability_bindings`.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = capability_bindings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BindingRow {
    /// Capability name.
    pub capability: String,
    /// Serialized binding state.
    pub state: serde_json::Value,
    /// When the row was written.
    pub updated_at: DateTime<Utc>,
}
