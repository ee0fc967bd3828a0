//! Configuration error types.

use crate::migration::domain::MigrationId;
use crate::provider::{
    domain::{ProviderDomainError, ProviderName},
    ports::ProviderError,
};
use thiserror::Error;

/// Errors raised while loading or applying backend configuration.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The configuration file could not be read.
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        /// File that was requested.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The configuration file is not valid TOML for the schema.
    #[error("failed to parse configuration: {0}")]
    Parse(Box<toml::de::Error>),
    /// A setting has an unusable value.
    #[error("invalid setting {field}: {reason}")]
    Invalid {
        /// Dotted path of the setting.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },
    /// A provider entry failed validation.
    #[error("invalid provider {name}: {source}")]
    InvalidProvider {
        /// Name as written in the configuration.
        name: String,
        /// Validation failure.
        source: ProviderDomainError,
    },
    /// Two provider entries share a name.
    #[error("provider {0} is configured more than once")]
    DuplicateProvider(ProviderName),
    /// An active provider's kind, capabilities or connection changed.
    #[error("provider {0} changed kind, capabilities or connection while active")]
    ImmutableDescriptor(ProviderName),
    /// A provider taking part in a running migration was removed.
    #[error("provider {provider} is part of running migration {migration}")]
    ProviderInUse {
        /// Removed provider.
        provider: ProviderName,
        /// Migration that still needs it.
        migration: MigrationId,
    },
    /// The adapter factory rejected a descriptor.
    #[error("failed to build adapter for provider {provider}: {source}")]
    AdapterConstruction {
        /// Provider whose adapter failed.
        provider: ProviderName,
        /// Factory error.
        source: ProviderError,
    },
}

impl From<toml::de::Error> for ConfigurationError {
    fn from(err: toml::de::Error) -> Self {
        Self::Parse(Box::new(err))
    }
}

impl ConfigurationError {
    /// Builds a [`ConfigurationError::Invalid`] error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for configuration loading and validation.
pub type ConfigurationResult<T> = Result<T, ConfigurationError>;
