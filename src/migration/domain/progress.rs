//! Progress counters, backfill cursors and match rates.

use serde::{Deserialize, Serialize};
use std::fmt;

const PPM_SCALE: u64 = 1_000_000;

/// Fraction expressed in parts per million.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchRate(u32);

impl MatchRate {
    /// Every compared item matched.
    pub const PERFECT: Self = Self(1_000_000);

    /// Creates a rate from a parts-per-million value, capped at 100%.
    #[must_use]
    pub fn from_ppm(ppm: u32) -> Self {
        Self(ppm.min(1_000_000))
    }

    /// Returns `matched / compared`, rounded down. Comparing nothing is a
    /// perfect match.
    #[must_use]
    pub fn from_counts(matched: u64, compared: u64) -> Self {
        let ppm = u128::from(matched.min(compared))
            .saturating_mul(u128::from(PPM_SCALE))
            .checked_div(u128::from(compared))
            .unwrap_or(u128::from(PPM_SCALE));
        Self(u32::try_from(ppm).unwrap_or(1_000_000))
    }

    /// Returns the rate in parts per million.
    #[must_use]
    pub const fn ppm(self) -> u32 {
        self.0
    }

    /// Returns whether this rate meets `threshold`.
    #[must_use]
    pub const fn meets(self, threshold: Self) -> bool {
        self.0 >= threshold.0
    }
}

impl fmt::Display for MatchRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0.checked_div(10_000).unwrap_or(0);
        let fraction = self.0.checked_rem(10_000).unwrap_or(0);
        write!(f, "{whole}.{fraction:04}%")
    }
}

/// Item counters of a migration plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCounters {
    /// Items written to the target.
    pub copied: u64,
    /// Items compared during verification.
    pub verified: u64,
    /// Items that could not be copied.
    pub failed: u64,
    /// Compared items whose content differed.
    pub mismatched: u64,
}

impl ProgressCounters {
    /// Returns how many items the backfill has attempted.
    #[must_use]
    pub const fn processed(&self) -> u64 {
        self.copied.saturating_add(self.failed)
    }
}

/// Resume position of a backfill.
///
/// Everything up to and including `last_key` of `partition` (and every
/// earlier partition) has been attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillCursor {
    /// Collection name for record data, or the objects partition.
    pub partition: String,
    /// Last attempted key within the partition.
    pub last_key: String,
}

impl BackfillCursor {
    /// Creates a cursor.
    #[must_use]
    pub fn new(partition: impl Into<String>, last_key: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            last_key: last_key.into(),
        }
    }
}
