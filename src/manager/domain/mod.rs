//! Domain types of the backend manager.

mod settings;
mod status;

pub use settings::ManagerSettings;
pub use status::{BackendStatus, CapabilityStatus, SwitchOutcome, SwitchProviderRequest};
