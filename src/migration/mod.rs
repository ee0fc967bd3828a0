//! Provider migrations.
//!
//! A migration copies a capability's data from its bound provider to a new
//! one, verifies the copy and hands the cutover back to the backend manager.
//! Plans and verification checkpoints are persisted so interrupted plans can
//! be resumed or failed safely after a restart.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
