//! Step definitions shared by the backend manager behaviour tests.

pub mod given;
pub mod then;
pub mod when;
pub mod world;
