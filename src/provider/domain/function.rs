//! Invocable function identifiers.

use super::ProviderDomainError;
use super::data::is_identifier;
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_FUNCTION_NAME_LENGTH: usize = 63;

/// Plain identifier naming a provider-side function (`[a-z_][a-z0-9_]*`).
///
/// The identifier rules make the name safe to splice into SQL by adapters
/// that call stored functions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FunctionName(String);

impl FunctionName {
    /// Creates a validated function name.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderDomainError::InvalidFunctionName`] when the value is
    /// not a lowercase identifier of at most 63 bytes.
    pub fn new(value: impl Into<String>) -> Result<Self, ProviderDomainError> {
        let raw = value.into();
        if is_identifier(&raw, MAX_FUNCTION_NAME_LENGTH) {
            Ok(Self(raw))
        } else {
            Err(ProviderDomainError::InvalidFunctionName(raw))
        }
    }

    /// Returns the function name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FunctionName {
    type Error = ProviderDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FunctionName> for String {
    fn from(name: FunctionName) -> Self {
        name.0
    }
}

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
