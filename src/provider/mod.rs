//! Backend providers and the adapter contract they implement.
//!
//! A provider is a configured backend (a `PostgreSQL` cluster, a document
//! store, a vendor SDK) that serves one or more capabilities. The module
//! follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - The adapter contract in [`ports`]
//! - Reference adapters in [`adapters`]
//! - The call policy (deadlines, retries) in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
