//! Migration strategies and the plan status machine.

use super::{ParseMigrationStatusError, ParseMigrationStrategyError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How data moves from the source to the target provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStrategy {
    /// Pause writes, copy everything, verify and flip.
    Immediate,
    /// Mirror writes while backfilling in batches, then verify and flip.
    Gradual,
    /// Backfill in isolation, catch up under a mirror, verify and flip.
    BlueGreen,
}

impl MigrationStrategy {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Gradual => "gradual",
            Self::BlueGreen => "blue_green",
        }
    }
}

impl fmt::Display for MigrationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for MigrationStrategy {
    type Error = ParseMigrationStrategyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "immediate" => Ok(Self::Immediate),
            "gradual" => Ok(Self::Gradual),
            "blue_green" | "blue-green" => Ok(Self::BlueGreen),
            _ => Err(ParseMigrationStrategyError(value.to_owned())),
        }
    }
}

/// Lifecycle status of a migration plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    /// Accepted, driver not yet started.
    Pending,
    /// Copying data.
    Running,
    /// Comparing source and target.
    Verifying,
    /// Binding flipped to the target.
    Completed,
    /// Stopped; the source stays bound.
    Failed,
    /// Failed plan explicitly closed by an operator.
    RolledBack,
}

impl MigrationStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Verifying => "verifying",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        }
    }

    /// Returns whether the plan still holds its capability.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Running | Self::Verifying)
    }

    /// Returns whether the plan has stopped.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !self.is_active()
    }

    /// Returns whether a plan may move from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running | Self::Failed)
                | (Self::Running, Self::Verifying | Self::Failed)
                | (Self::Verifying, Self::Completed | Self::Failed)
                | (Self::Failed, Self::RolledBack)
        )
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for MigrationStatus {
    type Error = ParseMigrationStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "verifying" => Ok(Self::Verifying),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "rolled_back" => Ok(Self::RolledBack),
            _ => Err(ParseMigrationStatusError(value.to_owned())),
        }
    }
}
