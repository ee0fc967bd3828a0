//! Adapter implementations for the migration context.

pub mod memory;
pub mod postgres;
