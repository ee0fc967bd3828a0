//! Capability-typed facades over the routing table.
//!
//! Each call resolves the adapter currently bound to its capability, runs
//! under the configured deadline and transient-retry policy, and reports
//! either the provider's error or why no provider could take the call.
//! Writes hold the capability's write permit so migrations can pause them.

mod auth;
mod database;
mod error;
mod functions;
mod gateway;
mod realtime;
mod storage;

pub use auth::AuthService;
pub use database::DatabaseService;
pub use error::{ServiceError, ServiceResult};
pub use functions::FunctionService;
pub use realtime::RealtimeService;
pub use storage::StorageService;

use crate::provider::services::CallPolicy;
use crate::routing::services::CapabilityRouter;
use gateway::Gateway;
use std::sync::Arc;

/// The five unified services sharing one router.
#[derive(Clone)]
pub struct UnifiedServices {
    /// Record storage.
    pub database: DatabaseService,
    /// Authentication.
    pub auth: AuthService,
    /// Object storage.
    pub storage: StorageService,
    /// Publish/subscribe.
    pub realtime: RealtimeService,
    /// Function invocation.
    pub functions: FunctionService,
}

impl UnifiedServices {
    /// Builds the services over `router`.
    #[must_use]
    pub fn new(router: Arc<CapabilityRouter>, policy: CallPolicy) -> Self {
        let gateway = Gateway::new(router, policy);
        Self {
            database: DatabaseService::new(gateway.clone()),
            auth: AuthService::new(gateway.clone()),
            storage: StorageService::new(gateway.clone()),
            realtime: RealtimeService::new(gateway.clone()),
            functions: FunctionService::new(gateway),
        }
    }
}
