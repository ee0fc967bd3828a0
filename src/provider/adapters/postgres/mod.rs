//! `PostgreSQL` provider adapter built on Diesel and r2d2.

mod models;
mod provider;
mod schema;

pub use provider::{PostgresProvider, ProviderPgPool};
