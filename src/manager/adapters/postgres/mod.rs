//! `PostgreSQL` manager persistence.

mod catalog;
mod models;
mod schema;

pub use catalog::{CatalogPgPool, PostgresProviderCatalog};
