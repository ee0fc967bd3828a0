//! The capability contract every backend provider implements.

use crate::provider::domain::{
    CollectionName, Credentials, Filter, FunctionName, HealthSignal, ObjectPath, ProviderName,
    Record, RecordKey, Session, Subscription, SubscriptionHandler, Topic,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Result type for provider adapter operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Fixed capability trait implemented once per provider kind.
///
/// Semantics shared by every implementation:
///
/// - `create` fails with `Permanent(conflict)` when the key exists;
/// - `update` and `delete` fail with `Permanent(not_found)` when it does not;
/// - `scan` and `list_objects` return pages in ascending key/path order,
///   strictly after the given cursor;
/// - capabilities the provider kind does not serve fail with
///   `Permanent(unsupported)`.
///
/// Adapters hold no reference to core state; the core only calls them.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Returns the configured provider name.
    fn name(&self) -> &ProviderName;

    /// Inserts a new record.
    async fn create(&self, collection: &CollectionName, record: Record)
    -> ProviderResult<Record>;

    /// Reads one record by key.
    async fn read(
        &self,
        collection: &CollectionName,
        key: &RecordKey,
    ) -> ProviderResult<Option<Record>>;

    /// Returns records matching every equality in `filter`, in key order.
    async fn query(&self, collection: &CollectionName, filter: &Filter)
    -> ProviderResult<Vec<Record>>;

    /// Replaces the payload of an existing record.
    async fn update(&self, collection: &CollectionName, record: Record)
    -> ProviderResult<Record>;

    /// Inserts or replaces a record. Used by mirroring and backfill.
    async fn upsert(&self, collection: &CollectionName, record: Record)
    -> ProviderResult<Record>;

    /// Removes a record.
    async fn delete(&self, collection: &CollectionName, key: &RecordKey) -> ProviderResult<()>;

    /// Lists collections holding at least one record, in name order.
    async fn list_collections(&self) -> ProviderResult<Vec<CollectionName>>;

    /// Returns up to `limit` records with keys strictly greater than `after`.
    async fn scan(
        &self,
        collection: &CollectionName,
        after: Option<RecordKey>,
        limit: usize,
    ) -> ProviderResult<Vec<Record>>;

    /// Counts the records of a collection.
    async fn count(&self, collection: &CollectionName) -> ProviderResult<u64>;

    /// Verifies credentials and issues a session.
    async fn authenticate(&self, credentials: &Credentials) -> ProviderResult<Session>;

    /// Stores an object, replacing any existing content.
    async fn put_object(&self, path: &ObjectPath, content: Vec<u8>) -> ProviderResult<()>;

    /// Fetches an object.
    async fn get_object(&self, path: &ObjectPath) -> ProviderResult<Option<Vec<u8>>>;

    /// Removes an object.
    async fn delete_object(&self, path: &ObjectPath) -> ProviderResult<()>;

    /// Returns up to `limit` object paths strictly greater than `after`.
    async fn list_objects(
        &self,
        after: Option<ObjectPath>,
        limit: usize,
    ) -> ProviderResult<Vec<ObjectPath>>;

    /// Registers `handler` for messages published on `topic`.
    async fn subscribe(
        &self,
        topic: &Topic,
        handler: SubscriptionHandler,
    ) -> ProviderResult<Subscription>;

    /// Cancels a subscription previously returned by `subscribe`.
    async fn unsubscribe(&self, subscription: &Subscription) -> ProviderResult<()>;

    /// Publishes a message to every subscriber of `topic`.
    async fn publish(&self, topic: &Topic, payload: Value) -> ProviderResult<()>;

    /// Invokes a named function with a JSON payload.
    async fn invoke(&self, function: &FunctionName, payload: Value) -> ProviderResult<Value>;

    /// Performs a cheap liveness check. Used only by the health monitor.
    async fn probe(&self) -> ProviderResult<HealthSignal>;
}

/// Retryable failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransientKind {
    /// The call exceeded its deadline.
    Timeout,
    /// The provider throttled the caller.
    RateLimited,
    /// The provider could not be reached.
    Connection,
}

impl TransientKind {
    /// Returns the canonical representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::Connection => "connection",
        }
    }
}

impl fmt::Display for TransientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-retryable failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermanentKind {
    /// The addressed record, object or function does not exist.
    NotFound,
    /// The provider rejected the input.
    Validation,
    /// Credentials were rejected.
    AuthDenied,
    /// Stored data does not match the expected shape.
    SchemaMismatch,
    /// The write collides with existing data.
    Conflict,
    /// The provider kind does not implement the operation.
    Unsupported,
}

impl PermanentKind {
    /// Returns the canonical representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::AuthDenied => "auth_denied",
            Self::SchemaMismatch => "schema_mismatch",
            Self::Conflict => "conflict",
            Self::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for PermanentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by provider adapters, classified for retry decisions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// A failure that may succeed when retried.
    #[error("transient {kind} failure: {message}")]
    Transient {
        /// Failure category.
        kind: TransientKind,
        /// Human-readable detail.
        message: String,
    },

    /// A failure that will not succeed when retried.
    #[error("permanent {kind} failure: {message}")]
    Permanent {
        /// Failure category.
        kind: PermanentKind,
        /// Human-readable detail.
        message: String,
    },
}

impl ProviderError {
    /// Creates a transient error.
    pub fn transient(kind: TransientKind, message: impl Into<String>) -> Self {
        Self::Transient {
            kind,
            message: message.into(),
        }
    }

    /// Creates a permanent error.
    pub fn permanent(kind: PermanentKind, message: impl Into<String>) -> Self {
        Self::Permanent {
            kind,
            message: message.into(),
        }
    }

    /// Creates a `Transient(timeout)` error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::transient(TransientKind::Timeout, message)
    }

    /// Creates a `Transient(connection)` error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::transient(TransientKind::Connection, message)
    }

    /// Creates a `Permanent(not_found)` error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::permanent(PermanentKind::NotFound, message)
    }

    /// Creates a `Permanent(validation)` error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::permanent(PermanentKind::Validation, message)
    }

    /// Creates a `Permanent(conflict)` error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::permanent(PermanentKind::Conflict, message)
    }

    /// Creates a `Permanent(schema_mismatch)` error.
    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self::permanent(PermanentKind::SchemaMismatch, message)
    }

    /// Creates a `Permanent(unsupported)` error naming the operation.
    pub fn unsupported(operation: &str, provider: &ProviderName) -> Self {
        Self::permanent(
            PermanentKind::Unsupported,
            format!("provider '{provider}' does not support {operation}"),
        )
    }

    /// Returns whether the failure is worth retrying.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Returns the permanent failure category, if any.
    #[must_use]
    pub const fn permanent_kind(&self) -> Option<PermanentKind> {
        match self {
            Self::Permanent { kind, .. } => Some(*kind),
            Self::Transient { .. } => None,
        }
    }
}
