//! Publish/subscribe value types.

use super::ProviderDomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

const MAX_TOPIC_LENGTH: usize = 255;

/// Name of a publish/subscribe channel.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Topic(String);

impl Topic {
    /// Creates a validated topic.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderDomainError::InvalidTopic`] when the topic is empty,
    /// longer than 255 bytes, or contains whitespace.
    pub fn new(value: impl Into<String>) -> Result<Self, ProviderDomainError> {
        let raw = value.into();
        if raw.is_empty() || raw.len() > MAX_TOPIC_LENGTH || raw.chars().any(char::is_whitespace)
        {
            return Err(ProviderDomainError::InvalidTopic(raw));
        }
        Ok(Self(raw))
    }

    /// Returns the topic as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Topic {
    type Error = ProviderDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message delivered to subscribers of a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeMessage {
    /// Topic the message was published on.
    pub topic: Topic,
    /// Message body.
    pub payload: Value,
    /// Publication timestamp.
    pub published_at: DateTime<Utc>,
}

/// Unique identifier of a live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Creates a new random subscription identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a live subscription owned by one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    id: SubscriptionId,
    topic: Topic,
}

impl Subscription {
    /// Creates a subscription handle.
    #[must_use]
    pub const fn new(id: SubscriptionId, topic: Topic) -> Self {
        Self { id, topic }
    }

    /// Returns the subscription identifier.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns the subscribed topic.
    #[must_use]
    pub const fn topic(&self) -> &Topic {
        &self.topic
    }
}

/// Callback invoked for every message delivered to a subscription.
pub type SubscriptionHandler = Arc<dyn Fn(&RealtimeMessage) + Send + Sync>;
