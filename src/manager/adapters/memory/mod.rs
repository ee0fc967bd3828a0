//! In-memory manager persistence.

mod catalog;

pub use catalog::InMemoryProviderCatalog;
