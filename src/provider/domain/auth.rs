//! Authentication inputs and issued sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Subject and secret presented for verification.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    subject: String,
    secret: String,
}

impl Credentials {
    /// Creates credentials for `subject`.
    #[must_use]
    pub fn new(subject: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            secret: secret.into(),
        }
    }

    /// Returns the subject (user name, email, client id).
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the secret.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("subject", &self.subject)
            .field("secret", &"***")
            .finish()
    }
}

/// Session issued after successful authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque bearer token.
    pub token: String,
    /// Authenticated subject.
    pub subject: String,
    /// Issue timestamp.
    pub issued_at: DateTime<Utc>,
    /// Expiry timestamp.
    pub expires_at: DateTime<Utc>,
}
