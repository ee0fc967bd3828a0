//! Per-provider health record and its transition rules.

use super::{HealthPolicy, HealthStatus};
use crate::provider::domain::ProviderName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Number of observations kept in a record's history.
pub const HISTORY_CAPACITY: usize = 16;

/// Outcome of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The probe returned within its deadline.
    Success {
        /// Measured round-trip time.
        latency: Duration,
    },
    /// The probe failed or timed out.
    Failure {
        /// Failure description.
        error: String,
    },
}

/// One entry of a record's bounded history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthObservation {
    /// When the probe completed.
    pub observed_at: DateTime<Utc>,
    /// Whether the probe succeeded.
    pub success: bool,
    /// Probe latency for successful probes.
    pub latency: Option<Duration>,
    /// Failure description for failed probes.
    pub error: Option<String>,
}

/// A status change produced by [`HealthRecord::apply`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthTransition {
    /// Provider whose status changed.
    pub provider: ProviderName,
    /// Status before the observation.
    pub old: HealthStatus,
    /// Status after the observation.
    pub new: HealthStatus,
    /// When the change was observed.
    pub at: DateTime<Utc>,
}

/// Health state of one provider.
///
/// Owned by the health monitor; other components receive clones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthRecord {
    provider: ProviderName,
    status: HealthStatus,
    last_checked: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_error: Option<String>,
    history: VecDeque<HealthObservation>,
}

impl HealthRecord {
    /// Creates a record in the `unknown` state.
    #[must_use]
    pub fn new(provider: ProviderName) -> Self {
        Self {
            provider,
            status: HealthStatus::Unknown,
            last_checked: None,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_error: None,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    /// Returns the provider name.
    #[must_use]
    pub const fn provider(&self) -> &ProviderName {
        &self.provider
    }

    /// Returns the current status.
    #[must_use]
    pub const fn status(&self) -> HealthStatus {
        self.status
    }

    /// Returns when the last probe completed.
    #[must_use]
    pub const fn last_checked(&self) -> Option<DateTime<Utc>> {
        self.last_checked
    }

    /// Returns the current failure streak.
    #[must_use]
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Returns the current success streak.
    #[must_use]
    pub const fn consecutive_successes(&self) -> u32 {
        self.consecutive_successes
    }

    /// Returns the most recent failure description.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Returns up to the last 16 observations, oldest first.
    #[must_use]
    pub const fn history(&self) -> &VecDeque<HealthObservation> {
        &self.history
    }

    /// Folds one probe outcome into the record.
    ///
    /// Returns the transition when the status changed.
    pub fn apply(
        &mut self,
        outcome: ProbeOutcome,
        policy: &HealthPolicy,
        now: DateTime<Utc>,
    ) -> Option<HealthTransition> {
        let old = self.status;
        let observation = match outcome {
            ProbeOutcome::Success { latency } => {
                self.consecutive_successes = self.consecutive_successes.saturating_add(1);
                self.consecutive_failures = 0;
                self.status = self.after_success(policy);
                HealthObservation {
                    observed_at: now,
                    success: true,
                    latency: Some(latency),
                    error: None,
                }
            }
            ProbeOutcome::Failure { error } => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.consecutive_successes = 0;
                self.status = self.after_failure(policy);
                self.last_error = Some(error.clone());
                HealthObservation {
                    observed_at: now,
                    success: false,
                    latency: None,
                    error: Some(error),
                }
            }
        };

        self.last_checked = Some(now);
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(observation);

        (old != self.status).then(|| HealthTransition {
            provider: self.provider.clone(),
            old,
            new: self.status,
            at: now,
        })
    }

    fn after_success(&self, policy: &HealthPolicy) -> HealthStatus {
        match self.status {
            HealthStatus::Unhealthy if self.consecutive_successes < policy.recover_after => {
                HealthStatus::Unhealthy
            }
            _ => HealthStatus::Healthy,
        }
    }

    fn after_failure(&self, policy: &HealthPolicy) -> HealthStatus {
        if self.status == HealthStatus::Unhealthy
            || self.consecutive_failures >= policy.unhealthy_after
        {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Degraded
        }
    }
}
