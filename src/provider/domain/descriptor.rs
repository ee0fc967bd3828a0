//! Provider descriptors and their closed connection schema.

use super::{Capability, CapabilitySet, ParseProviderKindError, ProviderDomainError, ProviderName};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest connection pool a single `PostgreSQL` provider may request.
const MAX_POOL_SIZE: u32 = 64;

/// Provider implementation family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Process-local document store.
    Memory,
    /// Relational store reached over the `PostgreSQL` protocol.
    Postgres,
}

impl ProviderKind {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres => "postgres",
        }
    }

    /// Returns the capabilities the adapter for this kind implements.
    #[must_use]
    pub fn supported_capabilities(self) -> CapabilitySet {
        match self {
            Self::Memory => CapabilitySet::all(),
            Self::Postgres => CapabilitySet::new()
                .with(Capability::Database)
                .with(Capability::Storage)
                .with(Capability::Functions),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderKind {
    type Error = ParseProviderKindError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" => Ok(Self::Postgres),
            _ => Err(ParseProviderKindError(value.to_owned())),
        }
    }
}

/// Connection settings for a `PostgreSQL` provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgresConnection {
    url: String,
    pool_size: u32,
}

impl PostgresConnection {
    /// Creates validated `PostgreSQL` connection settings.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderDomainError::EmptyConnectionUrl`] for a blank URL,
    /// [`ProviderDomainError::InvalidConnectionUrl`] when the scheme is not
    /// `postgres://` or `postgresql://`, or
    /// [`ProviderDomainError::InvalidPoolSize`] when the pool size is zero or
    /// larger than 64.
    pub fn new(url: impl Into<String>, pool_size: u32) -> Result<Self, ProviderDomainError> {
        let normalized = url.into().trim().to_owned();
        if normalized.is_empty() {
            return Err(ProviderDomainError::EmptyConnectionUrl);
        }
        if !(normalized.starts_with("postgres://") || normalized.starts_with("postgresql://")) {
            return Err(ProviderDomainError::InvalidConnectionUrl(redact_url(
                &normalized,
            )));
        }
        if pool_size == 0 || pool_size > MAX_POOL_SIZE {
            return Err(ProviderDomainError::InvalidPoolSize(pool_size));
        }
        Ok(Self {
            url: normalized,
            pool_size,
        })
    }

    /// Returns the connection URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the maximum pool size.
    #[must_use]
    pub const fn pool_size(&self) -> u32 {
        self.pool_size
    }
}

impl fmt::Debug for PostgresConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConnection")
            .field("url", &redact_url(&self.url))
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

/// Strips the credential section from a connection URL.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            let (scheme, _) = url.split_at(scheme_end);
            let (_, host) = url.split_at(at);
            format!("{scheme}://***{host}")
        }
        _ => url.to_owned(),
    }
}

/// Provider-specific connection parameters.
///
/// The schema is closed: each provider kind has exactly one variant with its
/// required fields, validated when the descriptor is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectionParams {
    /// In-process document store; no connection settings.
    Memory,
    /// `PostgreSQL` relational store.
    Postgres(PostgresConnection),
}

impl ConnectionParams {
    /// Returns the provider kind these parameters connect to.
    #[must_use]
    pub const fn kind(&self) -> ProviderKind {
        match self {
            Self::Memory => ProviderKind::Memory,
            Self::Postgres(_) => ProviderKind::Postgres,
        }
    }
}

/// Identity, routing preferences and connection settings for one provider.
///
/// Everything except `enabled` and `priority` is fixed once the provider is
/// active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    name: ProviderName,
    enabled: bool,
    priority: u32,
    capabilities: CapabilitySet,
    connection: ConnectionParams,
}

impl ProviderDescriptor {
    /// Creates a validated, enabled descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderDomainError::EmptyCapabilities`] when no capability
    /// is declared, or [`ProviderDomainError::UnsupportedCapability`] when the
    /// provider kind cannot serve one of the declared capabilities.
    pub fn new(
        name: ProviderName,
        priority: u32,
        capabilities: CapabilitySet,
        connection: ConnectionParams,
    ) -> Result<Self, ProviderDomainError> {
        if capabilities.is_empty() {
            return Err(ProviderDomainError::EmptyCapabilities(name));
        }
        let kind = connection.kind();
        let supported = kind.supported_capabilities();
        if let Some(capability) = capabilities.iter().find(|c| !supported.contains(*c)) {
            return Err(ProviderDomainError::UnsupportedCapability { kind, capability });
        }
        Ok(Self {
            name,
            enabled: true,
            priority,
            capabilities,
            connection,
        })
    }

    /// Sets the enabled flag.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns the provider name.
    #[must_use]
    pub const fn name(&self) -> &ProviderName {
        &self.name
    }

    /// Returns the provider kind.
    #[must_use]
    pub const fn kind(&self) -> ProviderKind {
        self.connection.kind()
    }

    /// Returns whether the provider may receive bindings.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the routing priority (lower is preferred).
    #[must_use]
    pub const fn priority(&self) -> u32 {
        self.priority
    }

    /// Returns the declared capability set.
    #[must_use]
    pub const fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Returns the connection parameters.
    #[must_use]
    pub const fn connection(&self) -> &ConnectionParams {
        &self.connection
    }

    /// Returns whether this provider is enabled and declares `capability`.
    #[must_use]
    pub fn serves(&self, capability: Capability) -> bool {
        self.enabled && self.capabilities.contains(capability)
    }

    /// Returns whether `other` describes the same provider, ignoring the
    /// mutable `enabled` and `priority` fields.
    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        self.name == other.name
            && self.capabilities == other.capabilities
            && self.connection == other.connection
    }

    /// Updates the enabled flag.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Updates the routing priority.
    pub fn set_priority(&mut self, priority: u32) {
        self.priority = priority;
    }
}
