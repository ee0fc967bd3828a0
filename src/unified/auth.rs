//! Authentication facade.

use super::{error::ServiceResult, gateway::Gateway};
use crate::provider::domain::{Capability, Credentials, Session};

/// Authenticates against the provider bound to `auth`.
#[derive(Clone)]
pub struct AuthService {
    gateway: Gateway,
}

impl AuthService {
    pub(super) const fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Verifies credentials and returns a session.
    ///
    /// # Errors
    ///
    /// Returns a routing error, or the provider's error (`validation` for
    /// rejected credentials).
    pub async fn authenticate(&self, credentials: &Credentials) -> ServiceResult<Session> {
        self.gateway
            .read(Capability::Auth, "authenticate", |adapter| async move {
                adapter.authenticate(credentials).await
            })
            .await
    }
}
