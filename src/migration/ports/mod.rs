//! Port contracts for the migration context.

mod repository;

pub use repository::{MigrationRepository, MigrationRepositoryError, MigrationRepositoryResult};
