//! Shared fixtures for the `PostgreSQL` adapter suites.

pub use super::cluster::BoxError;
use super::cluster::{PostgresCluster, TemporaryDatabase, boxed, postgres_cluster};
use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use rstest::fixture;
use uuid::Uuid;

/// Schema applied to the template database.
pub const SCHEMA_SQL: &str =
    include_str!("../../migrations/2026-01-10-000001_create_backplane_schema/up.sql");

/// Template holding the migrated schema.
pub const TEMPLATE_DB: &str = "backplane_test_template";

pub type TestPool = Pool<ConnectionManager<PgConnection>>;

/// Fresh database and a pool connected to it.
///
/// Field order matters: the pool closes its connections before the database
/// is dropped.
pub struct TestDatabase {
    pub pool: TestPool,
    pub _database: TemporaryDatabase,
}

fn apply_schema(url: &str) -> Result<(), BoxError> {
    let mut connection = PgConnection::establish(url).map_err(boxed)?;
    connection.batch_execute(SCHEMA_SQL).map_err(boxed)
}

/// Clones the template into a uniquely named database.
///
/// # Errors
///
/// Returns an error when the template cannot be prepared or the pool cannot
/// connect.
pub fn create_test_database(
    cluster: PostgresCluster,
    prefix: &str,
) -> Result<TestDatabase, BoxError> {
    cluster.ensure_template(TEMPLATE_DB, apply_schema)?;
    let database =
        cluster.temporary_database(&format!("{prefix}_{}", Uuid::new_v4().simple()), TEMPLATE_DB)?;
    let pool = Pool::builder()
        .max_size(2)
        .build(ConnectionManager::<PgConnection>::new(database.url()))
        .map_err(boxed)?;
    Ok(TestDatabase {
        pool,
        _database: database,
    })
}

/// Provides a migrated database per test.
#[fixture]
pub fn test_database(
    postgres_cluster: Result<PostgresCluster, BoxError>,
) -> Result<TestDatabase, BoxError> {
    create_test_database(postgres_cluster?, "backplane")
}
