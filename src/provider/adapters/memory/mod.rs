//! In-memory provider adapter.

mod provider;

pub use provider::{InMemoryProvider, MemoryFunction};
