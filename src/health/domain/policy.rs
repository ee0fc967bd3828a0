//! Probe scheduling and transition thresholds.

use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_UNHEALTHY_AFTER: u32 = 3;
const DEFAULT_RECOVER_AFTER: u32 = 2;

/// Settings of the health state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthPolicy {
    /// Time between probe starts for one provider.
    pub probe_interval: Duration,
    /// Hard deadline of a single probe; expiry counts as a failure.
    pub probe_timeout: Duration,
    /// Consecutive failures that turn a provider unhealthy.
    pub unhealthy_after: u32,
    /// Consecutive successes that bring an unhealthy provider back.
    pub recover_after: u32,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            probe_interval: DEFAULT_PROBE_INTERVAL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            unhealthy_after: DEFAULT_UNHEALTHY_AFTER,
            recover_after: DEFAULT_RECOVER_AFTER,
        }
    }
}
