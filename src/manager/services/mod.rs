//! Backend manager service.

mod driver;
mod error;
mod failover;
mod manager;

pub use error::{ManagerError, ManagerResult};
pub use manager::BackendManager;
