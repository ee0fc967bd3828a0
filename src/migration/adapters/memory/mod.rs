//! In-memory adapters for migration persistence.

mod repository;

pub use repository::InMemoryMigrationRepository;
