//! Backplane: provider abstraction and live migration for application backends.
//!
//! Applications call five capability-typed services (database, auth,
//! storage, realtime and functions). Each capability is bound to one
//! configured provider at a time. The backend manager keeps those bindings
//! correct: it fails capabilities over when a provider turns unhealthy and
//! moves them between providers through verified migrations without losing
//! writes.
//!
//! # Architecture
//!
//! Backplane follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports (database, memory)
//!
//! # Modules
//!
//! - [`provider`]: Provider descriptors, the adapter port and its adapters
//! - [`health`]: Probe scheduling and health state tracking
//! - [`routing`]: Capability bindings, write gating and dual-write mirrors
//! - [`migration`]: Migration plans, copy and verification
//! - [`manager`]: The backend manager tying the other modules together
//! - [`unified`]: Capability-typed services used by applications
//! - [`config`]: TOML configuration loading
//! - [`events`]: Control-plane event broadcasting

pub mod config;
pub mod events;
pub mod health;
pub mod manager;
pub mod migration;
pub mod provider;
pub mod routing;
pub mod unified;
