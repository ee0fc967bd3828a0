//! Request and response types of the control API.

use crate::health::domain::HealthRecord;
use crate::migration::domain::{MigrationPlan, MigrationStrategy};
use crate::provider::domain::{Capability, ProviderDescriptor, ProviderName};
use crate::routing::domain::{BindingState, CapabilityBinding};
use crate::routing::services::MirrorStatsSnapshot;
use serde::{Deserialize, Serialize};

/// Operator request to move a capability to another provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchProviderRequest {
    /// Capability to move.
    pub capability: Capability,
    /// Provider to move it to.
    pub target: ProviderName,
    /// How to move existing data.
    pub strategy: MigrationStrategy,
}

/// Result of a switch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SwitchOutcome {
    /// A migration plan was accepted and its driver started.
    Migrating {
        /// The plan as accepted, in `pending`.
        plan: MigrationPlan,
    },
    /// The capability had no source provider and was bound directly.
    Bound {
        /// The new binding.
        binding: CapabilityBinding,
    },
}

impl SwitchOutcome {
    /// Returns the plan when a migration was started.
    #[must_use]
    pub const fn plan(&self) -> Option<&MigrationPlan> {
        match self {
            Self::Migrating { plan } => Some(plan),
            Self::Bound { .. } => None,
        }
    }
}

/// Routing state of one capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityStatus {
    /// The capability.
    pub capability: Capability,
    /// Its binding state.
    pub state: BindingState,
    /// Mirror counters while a dual-write mirror is installed.
    pub mirror: Option<MirrorStatsSnapshot>,
}

/// Snapshot returned by `get_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendStatus {
    /// Routing state of every capability.
    pub bindings: Vec<CapabilityStatus>,
    /// Health record of every provider.
    pub health: Vec<HealthRecord>,
    /// Plans still in `pending`, `running` or `verifying`.
    pub active_migrations: Vec<MigrationPlan>,
    /// Configured providers.
    pub providers: Vec<ProviderDescriptor>,
}

impl BackendStatus {
    /// Returns the binding state of `capability`.
    #[must_use]
    pub fn binding(&self, capability: Capability) -> Option<&BindingState> {
        self.bindings
            .iter()
            .find(|status| status.capability == capability)
            .map(|status| &status.state)
    }
}
