//! Capability bindings and the per-capability binding state.

use crate::provider::domain::{Capability, ProviderName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why a capability was bound to its current provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingReason {
    /// First binding after configuration.
    Initial,
    /// Automatic re-point after the bound provider became unhealthy.
    Failover,
    /// Cutover at the end of a verified migration.
    Migration,
    /// Operator switch of a capability that carries no data or had no
    /// provider.
    Manual,
    /// Re-point forced by a configuration change (provider removed or
    /// disabled).
    Configuration,
    /// Re-bind of a capability that had no healthy provider.
    Recovery,
}

impl BindingReason {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Failover => "failover",
            Self::Migration => "migration",
            Self::Manual => "manual",
            Self::Configuration => "configuration",
            Self::Recovery => "recovery",
        }
    }
}

impl fmt::Display for BindingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned while parsing a binding reason from storage.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown binding reason: {0}")]
pub struct ParseBindingReasonError(pub String);

impl TryFrom<&str> for BindingReason {
    type Error = ParseBindingReasonError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "initial" => Ok(Self::Initial),
            "failover" => Ok(Self::Failover),
            "migration" => Ok(Self::Migration),
            "manual" => Ok(Self::Manual),
            "configuration" => Ok(Self::Configuration),
            "recovery" => Ok(Self::Recovery),
            _ => Err(ParseBindingReasonError(value.to_owned())),
        }
    }
}

/// Capability → provider mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityBinding {
    /// Bound capability.
    pub capability: Capability,
    /// Provider serving the capability.
    pub provider: ProviderName,
    /// Why the binding was made.
    pub reason: BindingReason,
    /// When the binding was made.
    pub bound_at: DateTime<Utc>,
}

/// The single state a capability is in at any instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BindingState {
    /// No provider configured for the capability.
    Unbound,
    /// Calls route to the bound provider.
    Bound(CapabilityBinding),
    /// Providers exist but none is healthy; calls fail fast.
    NoHealthyProvider {
        /// Provider that was bound before the outage.
        previous: Option<ProviderName>,
        /// When the capability entered this state.
        since: DateTime<Utc>,
    },
}

impl BindingState {
    /// Returns the binding when bound.
    #[must_use]
    pub const fn binding(&self) -> Option<&CapabilityBinding> {
        match self {
            Self::Bound(binding) => Some(binding),
            Self::Unbound | Self::NoHealthyProvider { .. } => None,
        }
    }

    /// Returns the bound provider's name when bound.
    #[must_use]
    pub fn provider(&self) -> Option<&ProviderName> {
        self.binding().map(|binding| &binding.provider)
    }

    /// Returns whether calls for this capability currently fail fast.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        matches!(self, Self::NoHealthyProvider { .. })
    }
}
