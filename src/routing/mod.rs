//! Capability routing.
//!
//! The router maps each capability to exactly one provider adapter. Bindings
//! are changed only by the backend manager, through a per-capability
//! transition guard, and published with a single atomic swap.

pub mod domain;
pub mod services;
