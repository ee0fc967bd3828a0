//! Runtime settings of the backend manager.

use crate::events::DEFAULT_EVENT_CAPACITY;
use crate::health::domain::HealthPolicy;
use crate::migration::domain::MigrationSettings;
use crate::provider::services::CallPolicy;
use serde::{Deserialize, Serialize};

/// Everything the backend manager needs besides its providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerSettings {
    /// Probe cadence and transition thresholds.
    pub health: HealthPolicy,
    /// Batch, verification and abort settings.
    pub migration: MigrationSettings,
    /// Deadline and retry policy for adapter calls.
    pub calls: CallPolicy,
    /// Events buffered per event-bus subscriber.
    pub event_capacity: usize,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            health: HealthPolicy::default(),
            migration: MigrationSettings::default(),
            calls: CallPolicy::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}
