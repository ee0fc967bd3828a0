//! `PostgreSQL` adapters for migration persistence.

mod models;
mod repository;
mod schema;

pub use repository::{MigrationPgPool, PostgresMigrationRepository};
