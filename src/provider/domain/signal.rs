//! Result of a successful liveness probe.

use std::time::Duration;

/// Observation returned by [`crate::provider::ports::ProviderAdapter::probe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSignal {
    /// Round-trip time of the probe.
    pub latency: Duration,
    /// Optional adapter-specific detail (server version, replica lag).
    pub detail: Option<String>,
}

impl HealthSignal {
    /// Creates a signal with the measured latency and no detail.
    #[must_use]
    pub const fn new(latency: Duration) -> Self {
        Self {
            latency,
            detail: None,
        }
    }

    /// Attaches adapter-specific detail.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
