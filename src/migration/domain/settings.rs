//! Tunables for migration drivers.

use super::{MatchRate, MigrationStrategy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BATCH_SIZE: usize = 1000;
const DEFAULT_MAX_PAUSE: Duration = Duration::from_secs(30);
const DEFAULT_ABORT_FAILURE_PPM: u32 = 50_000;
const DEFAULT_FULL_VERIFICATION_LIMIT: u64 = 10_000;
const DEFAULT_MIN_SAMPLE: u64 = 1000;
const DEFAULT_STRICT_THRESHOLD_PPM: u32 = 1_000_000;
const DEFAULT_RELAXED_THRESHOLD_PPM: u32 = 999_000;
const DEFAULT_MIRROR_CAPACITY: usize = 4096;

/// Batch, verification and abort settings shared by every plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationSettings {
    /// Items copied per backfill batch.
    pub batch_size: usize,
    /// Upper bound on the write pause of the immediate strategy.
    pub max_pause: Duration,
    /// Failed/processed ratio, in parts per million, above which a backfill
    /// aborts.
    pub abort_failure_ppm: u32,
    /// Source item count up to which every item is verified.
    pub full_verification_limit: u64,
    /// Minimum number of sampled items above the full-verification limit.
    pub min_sample: u64,
    /// Pass threshold of the immediate strategy.
    pub immediate_threshold: MatchRate,
    /// Pass threshold of the gradual and blue-green strategies.
    pub relaxed_threshold: MatchRate,
    /// Bounded queue length of the dual-write mirror.
    pub mirror_capacity: usize,
}

impl MigrationSettings {
    /// Returns the verification pass threshold for `strategy`.
    #[must_use]
    pub const fn threshold(&self, strategy: MigrationStrategy) -> MatchRate {
        match strategy {
            MigrationStrategy::Immediate => self.immediate_threshold,
            MigrationStrategy::Gradual | MigrationStrategy::BlueGreen => self.relaxed_threshold,
        }
    }

    /// Returns how many items verification inspects out of `total`.
    ///
    /// Every item up to the full-verification limit; above it,
    /// `max(min_sample, ceil(1% of total))`, never more than `total`.
    #[must_use]
    pub fn sample_size(&self, total: u64) -> u64 {
        if total <= self.full_verification_limit {
            return total;
        }
        total.div_ceil(100).max(self.min_sample).min(total)
    }

    /// Returns whether `failed` out of `processed` items exceeds the abort
    /// ratio.
    #[must_use]
    pub fn exceeds_abort_ratio(&self, failed: u64, processed: u64) -> bool {
        if failed == 0 {
            return false;
        }
        u128::from(failed) * 1_000_000 > u128::from(self.abort_failure_ppm) * u128::from(processed)
    }
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_pause: DEFAULT_MAX_PAUSE,
            abort_failure_ppm: DEFAULT_ABORT_FAILURE_PPM,
            full_verification_limit: DEFAULT_FULL_VERIFICATION_LIMIT,
            min_sample: DEFAULT_MIN_SAMPLE,
            immediate_threshold: MatchRate::from_ppm(DEFAULT_STRICT_THRESHOLD_PPM),
            relaxed_threshold: MatchRate::from_ppm(DEFAULT_RELAXED_THRESHOLD_PPM),
            mirror_capacity: DEFAULT_MIRROR_CAPACITY,
        }
    }
}
