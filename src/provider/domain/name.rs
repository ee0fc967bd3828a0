//! Validated provider name type.

use super::ProviderDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length for a provider name, matching the `VARCHAR(100)` column.
const MAX_NAME_LENGTH: usize = 100;

/// Validated, lowercase alphanumeric-plus-underscores provider identifier.
///
/// Provider names are the stable identity of a configured backend (e.g.
/// `primary_pg`, `edge_docs`). Bindings, health records and migration plans
/// all refer to providers by name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProviderName(String);

impl ProviderName {
    /// Creates a validated provider name.
    ///
    /// The input is trimmed and lowercased. Only characters in `[a-z0-9_]` are
    /// accepted.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderDomainError::EmptyProviderName`] when the value is
    /// empty after trimming, [`ProviderDomainError::InvalidProviderName`] when
    /// it contains characters outside `[a-z0-9_]`, or
    /// [`ProviderDomainError::ProviderNameTooLong`] when it exceeds 100
    /// characters.
    pub fn new(value: impl Into<String>) -> Result<Self, ProviderDomainError> {
        let raw = value.into();
        let normalized = raw.trim().to_ascii_lowercase();

        if normalized.is_empty() {
            return Err(ProviderDomainError::EmptyProviderName);
        }

        if normalized.len() > MAX_NAME_LENGTH {
            return Err(ProviderDomainError::ProviderNameTooLong(raw));
        }

        let is_valid = normalized
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

        if !is_valid {
            return Err(ProviderDomainError::InvalidProviderName(raw));
        }

        Ok(Self(normalized))
    }

    /// Returns the provider name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ProviderName {
    type Error = ProviderDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProviderName> for String {
    fn from(name: ProviderName) -> Self {
        name.0
    }
}

impl AsRef<str> for ProviderName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
