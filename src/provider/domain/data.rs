//! Database and storage value types shared by every adapter.

use super::ProviderDomainError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

const MAX_COLLECTION_LENGTH: usize = 63;
const MAX_KEY_LENGTH: usize = 255;
const MAX_PATH_LENGTH: usize = 1024;

/// Validated collection identifier (`[a-z_][a-z0-9_]*`, at most 63 bytes).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CollectionName(String);

impl CollectionName {
    /// Creates a validated collection name.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderDomainError::InvalidCollectionName`] when the value
    /// is empty, too long, or not a lowercase identifier.
    pub fn new(value: impl Into<String>) -> Result<Self, ProviderDomainError> {
        let raw = value.into();
        if is_identifier(&raw, MAX_COLLECTION_LENGTH) {
            Ok(Self(raw))
        } else {
            Err(ProviderDomainError::InvalidCollectionName(raw))
        }
    }

    /// Returns the collection name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CollectionName {
    type Error = ProviderDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CollectionName> for String {
    fn from(name: CollectionName) -> Self {
        name.0
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns whether `value` is a lowercase identifier no longer than `max`.
pub(crate) fn is_identifier(value: &str, max: usize) -> bool {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    value.len() <= max
        && (first.is_ascii_lowercase() || first == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Primary key of a record within its collection.
///
/// Keys order lexicographically by bytes; backfill and verification walk
/// collections in this order. Adapters must page in the same order (the
/// `PostgreSQL` schema declares key columns with the `C` collation).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordKey(String);

impl RecordKey {
    /// Creates a validated record key.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderDomainError::InvalidRecordKey`] when the key is
    /// empty, longer than 255 bytes, or contains control characters.
    pub fn new(value: impl Into<String>) -> Result<Self, ProviderDomainError> {
        let raw = value.into();
        if raw.is_empty() || raw.len() > MAX_KEY_LENGTH || raw.chars().any(char::is_control) {
            return Err(ProviderDomainError::InvalidRecordKey(raw));
        }
        Ok(Self(raw))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RecordKey {
    type Error = ProviderDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RecordKey> for String {
    fn from(key: RecordKey) -> Self {
        key.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A keyed JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    key: RecordKey,
    payload: Value,
}

impl Record {
    /// Creates a record from a key and a JSON object payload.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderDomainError::PayloadNotObject`] when `payload` is not
    /// a JSON object.
    pub fn new(key: RecordKey, payload: Value) -> Result<Self, ProviderDomainError> {
        if !payload.is_object() {
            return Err(ProviderDomainError::PayloadNotObject);
        }
        Ok(Self { key, payload })
    }

    /// Returns the record key.
    #[must_use]
    pub const fn key(&self) -> &RecordKey {
        &self.key
    }

    /// Returns the record payload.
    #[must_use]
    pub const fn payload(&self) -> &Value {
        &self.payload
    }

    /// Returns the record with top-level `field` set to `value`.
    #[must_use]
    pub fn with_field(mut self, field: &str, value: Value) -> Self {
        if let Some(map) = self.payload.as_object_mut() {
            map.insert(field.to_owned(), value);
        }
        self
    }

    /// Consumes the record, returning its key and payload.
    #[must_use]
    pub fn into_parts(self) -> (RecordKey, Value) {
        (self.key, self.payload)
    }
}

/// Conjunction of top-level field equalities, with an optional row limit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    equals: BTreeMap<String, Value>,
    limit: Option<usize>,
}

impl Filter {
    /// Creates a filter that matches every record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires top-level `field` to equal `value`.
    #[must_use]
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.insert(field.into(), value.into());
        self
    }

    /// Caps the number of returned records.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns the required field equalities.
    #[must_use]
    pub const fn equals(&self) -> &BTreeMap<String, Value> {
        &self.equals
    }

    /// Returns the row limit, if any.
    #[must_use]
    pub const fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Returns the equalities as a JSON object for containment queries.
    #[must_use]
    pub fn as_object(&self) -> Value {
        let map: Map<String, Value> = self
            .equals
            .iter()
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();
        Value::Object(map)
    }

    /// Returns whether `payload` satisfies every equality.
    #[must_use]
    pub fn matches(&self, payload: &Value) -> bool {
        self.equals
            .iter()
            .all(|(field, expected)| payload.get(field) == Some(expected))
    }
}

/// Slash-separated relative path of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectPath(String);

impl ObjectPath {
    /// Creates a validated object path.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderDomainError::InvalidObjectPath`] when the path is
    /// empty, absolute, longer than 1024 bytes, or has empty, `.` or `..`
    /// segments.
    pub fn new(value: impl Into<String>) -> Result<Self, ProviderDomainError> {
        let raw = value.into();
        let has_bad_segment = raw
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..");
        if raw.is_empty() || raw.len() > MAX_PATH_LENGTH || has_bad_segment {
            return Err(ProviderDomainError::InvalidObjectPath(raw));
        }
        Ok(Self(raw))
    }

    /// Returns the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ObjectPath {
    type Error = ProviderDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ObjectPath> for String {
    fn from(path: ObjectPath) -> Self {
        path.0
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
