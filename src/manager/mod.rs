//! Backend manager.
//!
//! Owns provider configuration, capability bindings and migration plans.
//! Health transitions arrive from the health monitor and turn into
//! failovers; operator requests arrive through the control API on
//! [`services::BackendManager`].

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
