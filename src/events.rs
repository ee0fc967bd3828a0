//! Control-plane events broadcast to observers.
//!
//! Every event is logged through `tracing` when published, whether or not
//! anyone subscribes.

use crate::health::domain::HealthStatus;
use crate::migration::domain::{MigrationId, MigrationStatus};
use crate::provider::domain::{Capability, ProviderName};
use crate::routing::domain::BindingReason;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default number of events buffered per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Structured event emitted by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControlPlaneEvent {
    /// A provider's health status changed.
    HealthChanged {
        /// Provider whose status changed.
        provider: ProviderName,
        /// Previous status.
        old: HealthStatus,
        /// New status.
        new: HealthStatus,
    },
    /// A capability was re-pointed.
    BindingChanged {
        /// Re-pointed capability.
        capability: Capability,
        /// Previously bound provider, if any.
        old_provider: Option<ProviderName>,
        /// Newly bound provider; `None` when no healthy provider remains.
        new_provider: Option<ProviderName>,
        /// Why the binding changed.
        reason: BindingReason,
    },
    /// A migration finished a backfill batch.
    MigrationProgress {
        /// Migration plan.
        plan_id: MigrationId,
        /// Items copied so far.
        copied: u64,
        /// Items verified so far.
        verified: u64,
        /// Items that failed to copy.
        failed: u64,
    },
    /// A migration plan changed status.
    MigrationStatusChanged {
        /// Migration plan.
        plan_id: MigrationId,
        /// New status.
        status: MigrationStatus,
    },
    /// A migration plan reached a terminal status.
    MigrationCompleted {
        /// Migration plan.
        plan_id: MigrationId,
        /// Terminal status.
        status: MigrationStatus,
    },
}

/// Broadcast channel for [`ControlPlaneEvent`]s.
///
/// Slow subscribers lag and lose the oldest events; publishing never blocks.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ControlPlaneEvent>,
}

impl EventBus {
    /// Creates a bus buffering `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ControlPlaneEvent> {
        self.sender.subscribe()
    }

    /// Logs and broadcasts an event.
    pub fn publish(&self, event: ControlPlaneEvent) {
        log_event(&event);
        // No receivers is not an error for a fire-and-forget bus.
        if self.sender.send(event).is_err() {
            tracing::trace!("control-plane event had no subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

fn log_event(event: &ControlPlaneEvent) {
    match event {
        ControlPlaneEvent::HealthChanged { provider, old, new } => {
            if *new == HealthStatus::Unhealthy {
                tracing::warn!(%provider, %old, %new, "provider health changed");
            } else {
                tracing::info!(%provider, %old, %new, "provider health changed");
            }
        }
        ControlPlaneEvent::BindingChanged {
            capability,
            old_provider,
            new_provider,
            reason,
        } => match new_provider {
            Some(target) => tracing::info!(
                %capability,
                old_provider = ?old_provider,
                new_provider = %target,
                %reason,
                "capability binding changed"
            ),
            None => tracing::error!(
                %capability,
                old_provider = ?old_provider,
                %reason,
                "capability has no healthy provider"
            ),
        },
        ControlPlaneEvent::MigrationProgress {
            plan_id,
            copied,
            verified,
            failed,
        } => tracing::debug!(%plan_id, copied, verified, failed, "migration progress"),
        ControlPlaneEvent::MigrationStatusChanged { plan_id, status } => {
            tracing::info!(%plan_id, %status, "migration status changed");
        }
        ControlPlaneEvent::MigrationCompleted { plan_id, status } => {
            tracing::info!(%plan_id, %status, "migration finished");
        }
    }
}
