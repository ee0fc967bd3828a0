//! Domain model for provider health tracking.

mod policy;
mod record;
mod status;

pub use policy::HealthPolicy;
pub use record::{
    HISTORY_CAPACITY, HealthObservation, HealthRecord, HealthTransition, ProbeOutcome,
};
pub use status::{HealthStatus, ParseHealthStatusError};
