//! Adapter implementations for the provider context.

mod factory;
pub mod memory;
pub mod postgres;

pub use factory::{StandardAdapterFactory, StaticAdapterFactory};
