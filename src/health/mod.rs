//! Provider health tracking.
//!
//! Each provider moves through `unknown → healthy ⇄ degraded ⇄ unhealthy`
//! based on periodic probes. Transitions are published as events and fed to
//! the backend manager, which decides on failover.

pub mod domain;
pub mod services;
