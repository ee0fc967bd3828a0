//! Error types for provider domain validation and parsing.

use super::{Capability, ProviderKind, ProviderName};
use thiserror::Error;

/// Errors returned while constructing provider domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderDomainError {
    /// The provider name is empty after trimming.
    #[error("provider name must not be empty")]
    EmptyProviderName,

    /// The provider name contains characters outside `[a-z0-9_]`.
    #[error(
        "provider name '{0}' contains invalid characters (only lowercase alphanumeric and underscores allowed)"
    )]
    InvalidProviderName(String),

    /// The provider name exceeds the 100-character storage limit.
    #[error("provider name exceeds 100 character limit: {0}")]
    ProviderNameTooLong(String),

    /// A descriptor declared no capabilities.
    #[error("provider '{0}' must declare at least one capability")]
    EmptyCapabilities(ProviderName),

    /// A descriptor declared a capability its kind cannot serve.
    #[error("{kind} providers do not support the {capability} capability")]
    UnsupportedCapability {
        /// Provider kind of the descriptor.
        kind: ProviderKind,
        /// Capability the kind cannot serve.
        capability: Capability,
    },

    /// The connection URL is empty after trimming.
    #[error("connection url must not be empty")]
    EmptyConnectionUrl,

    /// The connection URL uses an unsupported scheme.
    #[error("connection url '{0}' must use the postgres:// or postgresql:// scheme")]
    InvalidConnectionUrl(String),

    /// The pool size is outside `1..=64`.
    #[error("pool size {0} must be between 1 and 64")]
    InvalidPoolSize(u32),

    /// A collection name failed validation.
    #[error("invalid collection name: '{0}'")]
    InvalidCollectionName(String),

    /// A record key is empty or too long.
    #[error("invalid record key: '{0}'")]
    InvalidRecordKey(String),

    /// An object path is empty, absolute or contains empty segments.
    #[error("invalid object path: '{0}'")]
    InvalidObjectPath(String),

    /// A topic name is empty or contains whitespace.
    #[error("invalid topic: '{0}'")]
    InvalidTopic(String),

    /// A function name is not a plain identifier.
    #[error("invalid function name: '{0}'")]
    InvalidFunctionName(String),

    /// A record payload is not a JSON object.
    #[error("record payload must be a JSON object")]
    PayloadNotObject,
}

/// Error returned while parsing a capability from configuration or storage.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown capability: {0}")]
pub struct ParseCapabilityError(pub String);

/// Error returned while parsing a provider kind.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown provider kind: {0}")]
pub struct ParseProviderKindError(pub String);
