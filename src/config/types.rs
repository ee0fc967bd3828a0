//! TOML schema of the backend configuration file.
//!
//! Every section is optional and falls back to the documented defaults.
//! Unknown keys are rejected so typos surface at load time.

use super::error::{ConfigurationError, ConfigurationResult};
use crate::events::DEFAULT_EVENT_CAPACITY;
use crate::health::domain::HealthPolicy;
use crate::manager::domain::ManagerSettings;
use crate::migration::domain::{MatchRate, MigrationSettings};
use crate::provider::domain::{
    Capability, CapabilitySet, ConnectionParams, PostgresConnection, ProviderDescriptor,
    ProviderDomainError, ProviderKind, ProviderName,
};
use crate::provider::services::{CallPolicy, RetryPolicy};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

const DEFAULT_POOL_SIZE: u32 = 8;
const PPM_PER_PERCENT: u32 = 10_000;
const PERCENT_FRACTION_DIGITS: usize = 4;

/// Root of the configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// `[health]` section.
    pub health: HealthSection,
    /// `[migration]` section.
    pub migration: MigrationSection,
    /// `[calls]` section.
    pub calls: CallsSection,
    /// `[events]` section.
    pub events: EventsSection,
    /// `[[providers]]` entries.
    pub providers: Vec<ProviderEntry>,
}

/// Probe settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthSection {
    /// Seconds between probes of one provider.
    pub probe_interval_secs: u64,
    /// Seconds before a probe counts as failed.
    pub probe_timeout_secs: u64,
    /// Consecutive failures before a provider is unhealthy.
    pub unhealthy_after: u32,
    /// Consecutive successes before an unhealthy provider recovers.
    pub recover_after: u32,
}

impl Default for HealthSection {
    fn default() -> Self {
        let policy = HealthPolicy::default();
        Self {
            probe_interval_secs: policy.probe_interval.as_secs(),
            probe_timeout_secs: policy.probe_timeout.as_secs(),
            unhealthy_after: policy.unhealthy_after,
            recover_after: policy.recover_after,
        }
    }
}

/// Migration tunables. Ratios are written as percentages, e.g. `"99.9%"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigrationSection {
    /// Items per backfill batch.
    pub batch_size: usize,
    /// Longest write pause of the immediate strategy, in seconds.
    pub max_pause_secs: u64,
    /// Failure ratio that aborts a backfill.
    pub abort_failure_ratio: String,
    /// Pass threshold of the immediate strategy.
    pub immediate_threshold: String,
    /// Pass threshold of the gradual and blue-green strategies.
    pub relaxed_threshold: String,
    /// Item count up to which verification compares everything.
    pub full_verification_limit: u64,
    /// Smallest sample above the full-verification limit.
    pub min_sample: u64,
    /// Dual-write mirror queue length.
    pub mirror_capacity: usize,
}

impl Default for MigrationSection {
    fn default() -> Self {
        let settings = MigrationSettings::default();
        Self {
            batch_size: settings.batch_size,
            max_pause_secs: settings.max_pause.as_secs(),
            abort_failure_ratio: MatchRate::from_ppm(settings.abort_failure_ppm).to_string(),
            immediate_threshold: settings.immediate_threshold.to_string(),
            relaxed_threshold: settings.relaxed_threshold.to_string(),
            full_verification_limit: settings.full_verification_limit,
            min_sample: settings.min_sample,
            mirror_capacity: settings.mirror_capacity,
        }
    }
}

/// Deadline and retry settings for adapter calls.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CallsSection {
    /// Per-attempt deadline in milliseconds.
    pub timeout_ms: u64,
    /// Attempts including the first.
    pub max_attempts: u32,
    /// First backoff delay in milliseconds.
    pub base_delay_ms: u64,
    /// Backoff cap in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for CallsSection {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

/// Event bus settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EventsSection {
    /// Events buffered per subscriber.
    pub capacity: usize,
}

impl Default for EventsSection {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// One `[[providers]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderEntry {
    /// Unique provider name.
    pub name: String,
    /// Provider kind: `memory` or `postgres`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Capabilities the provider serves.
    pub capabilities: Vec<String>,
    /// Routing priority; lower wins.
    #[serde(default)]
    pub priority: u32,
    /// Whether the provider may be bound.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Connection URL for `postgres` providers.
    #[serde(default)]
    pub url: Option<String>,
    /// Pool size for `postgres` providers.
    #[serde(default)]
    pub pool_size: Option<u32>,
}

const fn enabled_by_default() -> bool {
    true
}

impl ProviderEntry {
    /// Validates the entry into a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidProvider`] when a field fails
    /// domain validation, or [`ConfigurationError::Invalid`] for unknown
    /// kinds and capabilities or connection fields that do not belong to
    /// the kind.
    pub fn to_descriptor(&self) -> ConfigurationResult<ProviderDescriptor> {
        let invalid = |source: ProviderDomainError| ConfigurationError::InvalidProvider {
            name: self.name.clone(),
            source,
        };
        let field = |suffix: &str| format!("providers.{}.{suffix}", self.name);

        let name = ProviderName::new(self.name.as_str()).map_err(invalid)?;
        let kind = ProviderKind::try_from(self.kind.as_str())
            .map_err(|err| ConfigurationError::invalid(field("type"), err.to_string()))?;
        let capabilities = self
            .capabilities
            .iter()
            .map(|raw| {
                Capability::try_from(raw.as_str())
                    .map_err(|err| ConfigurationError::invalid(field("capabilities"), err.to_string()))
            })
            .collect::<ConfigurationResult<CapabilitySet>>()?;
        let connection = match kind {
            ProviderKind::Memory => {
                if self.url.is_some() || self.pool_size.is_some() {
                    return Err(ConfigurationError::invalid(
                        field("url"),
                        "memory providers take no connection settings",
                    ));
                }
                ConnectionParams::Memory
            }
            ProviderKind::Postgres => {
                let url = self.url.as_deref().ok_or_else(|| {
                    ConfigurationError::invalid(field("url"), "postgres providers need a url")
                })?;
                let pool_size = self.pool_size.unwrap_or(DEFAULT_POOL_SIZE);
                ConnectionParams::Postgres(PostgresConnection::new(url, pool_size).map_err(invalid)?)
            }
        };

        Ok(ProviderDescriptor::new(name, self.priority, capabilities, connection)
            .map_err(invalid)?
            .with_enabled(self.enabled))
    }
}

impl ConfigFile {
    /// Validates the file into manager settings and provider descriptors.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] for out-of-range settings, malformed
    /// ratios, invalid provider entries or duplicate provider names.
    pub fn into_runtime(self) -> ConfigurationResult<(ManagerSettings, Vec<ProviderDescriptor>)> {
        let settings = ManagerSettings {
            health: self.health.to_policy()?,
            migration: self.migration.to_settings()?,
            calls: self.calls.to_policy()?,
            event_capacity: positive_usize("events.capacity", self.events.capacity)?,
        };

        let mut seen = HashSet::new();
        let mut descriptors = Vec::with_capacity(self.providers.len());
        for entry in &self.providers {
            let descriptor = entry.to_descriptor()?;
            if !seen.insert(descriptor.name().clone()) {
                return Err(ConfigurationError::DuplicateProvider(descriptor.name().clone()));
            }
            descriptors.push(descriptor);
        }
        Ok((settings, descriptors))
    }
}

impl HealthSection {
    fn to_policy(&self) -> ConfigurationResult<HealthPolicy> {
        Ok(HealthPolicy {
            probe_interval: Duration::from_secs(positive_u64(
                "health.probe_interval_secs",
                self.probe_interval_secs,
            )?),
            probe_timeout: Duration::from_secs(positive_u64(
                "health.probe_timeout_secs",
                self.probe_timeout_secs,
            )?),
            unhealthy_after: positive_u32("health.unhealthy_after", self.unhealthy_after)?,
            recover_after: positive_u32("health.recover_after", self.recover_after)?,
        })
    }
}

impl MigrationSection {
    fn to_settings(&self) -> ConfigurationResult<MigrationSettings> {
        Ok(MigrationSettings {
            batch_size: positive_usize("migration.batch_size", self.batch_size)?,
            max_pause: Duration::from_secs(positive_u64(
                "migration.max_pause_secs",
                self.max_pause_secs,
            )?),
            abort_failure_ppm: parse_percent(
                "migration.abort_failure_ratio",
                &self.abort_failure_ratio,
            )?,
            full_verification_limit: self.full_verification_limit,
            min_sample: positive_u64("migration.min_sample", self.min_sample)?,
            immediate_threshold: MatchRate::from_ppm(parse_percent(
                "migration.immediate_threshold",
                &self.immediate_threshold,
            )?),
            relaxed_threshold: MatchRate::from_ppm(parse_percent(
                "migration.relaxed_threshold",
                &self.relaxed_threshold,
            )?),
            mirror_capacity: positive_usize("migration.mirror_capacity", self.mirror_capacity)?,
        })
    }
}

impl CallsSection {
    fn to_policy(&self) -> ConfigurationResult<CallPolicy> {
        if self.base_delay_ms > self.max_delay_ms {
            return Err(ConfigurationError::invalid(
                "calls.base_delay_ms",
                "must not exceed calls.max_delay_ms",
            ));
        }
        Ok(CallPolicy::new(
            Duration::from_millis(positive_u64("calls.timeout_ms", self.timeout_ms)?),
            RetryPolicy::new(
                positive_u32("calls.max_attempts", self.max_attempts)?,
                Duration::from_millis(self.base_delay_ms),
                Duration::from_millis(self.max_delay_ms),
            ),
        ))
    }
}

fn positive_u64(field: &str, value: u64) -> ConfigurationResult<u64> {
    if value == 0 {
        return Err(ConfigurationError::invalid(field, "must be greater than zero"));
    }
    Ok(value)
}

fn positive_u32(field: &str, value: u32) -> ConfigurationResult<u32> {
    if value == 0 {
        return Err(ConfigurationError::invalid(field, "must be greater than zero"));
    }
    Ok(value)
}

fn positive_usize(field: &str, value: usize) -> ConfigurationResult<usize> {
    if value == 0 {
        return Err(ConfigurationError::invalid(field, "must be greater than zero"));
    }
    Ok(value)
}

/// Parses `"99.9%"` (the `%` is optional) into parts per million.
///
/// Up to four fractional digits are accepted, which is the resolution of a
/// ppm value expressed as a percentage.
fn parse_percent(field: &str, raw: &str) -> ConfigurationResult<u32> {
    let reject = || ConfigurationError::invalid(field, format!("expected a percentage, got {raw:?}"));
    let trimmed = raw.trim();
    let number = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty()
        || fraction.len() > PERCENT_FRACTION_DIGITS
        || !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit())
    {
        return Err(reject());
    }
    let whole_ppm = whole
        .parse::<u32>()
        .ok()
        .and_then(|percent| percent.checked_mul(PPM_PER_PERCENT))
        .ok_or_else(reject)?;
    let padded = format!("{fraction:0<width$}", width = PERCENT_FRACTION_DIGITS);
    let fraction_ppm = padded.parse::<u32>().map_err(|_| reject())?;
    let ppm = whole_ppm.checked_add(fraction_ppm).ok_or_else(reject)?;
    if ppm > MatchRate::PERFECT.ppm() {
        return Err(ConfigurationError::invalid(field, "must not exceed 100%"));
    }
    Ok(ppm)
}
