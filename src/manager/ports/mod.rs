//! Persistence ports of the backend manager.

mod catalog;

pub use catalog::{CatalogError, CatalogResult, ProviderCatalogRepository};
