//! Object storage facade.

use super::{error::ServiceResult, gateway::Gateway};
use crate::provider::domain::{Capability, ObjectPath};

/// Object access through the provider bound to `storage`.
#[derive(Clone)]
pub struct StorageService {
    gateway: Gateway,
}

impl StorageService {
    pub(super) const fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Stores an object.
    ///
    /// # Errors
    ///
    /// Returns a routing or provider error.
    pub async fn put(&self, path: &ObjectPath, content: Vec<u8>) -> ServiceResult<()> {
        self.gateway
            .write(Capability::Storage, "put_object", |adapter| {
                let bytes = content.clone();
                async move { adapter.put_object(path, bytes).await }
            })
            .await
    }

    /// Fetches an object.
    ///
    /// # Errors
    ///
    /// Returns a routing or provider error.
    pub async fn get(&self, path: &ObjectPath) -> ServiceResult<Option<Vec<u8>>> {
        self.gateway
            .read(Capability::Storage, "get_object", |adapter| async move {
                adapter.get_object(path).await
            })
            .await
    }

    /// Removes an object.
    ///
    /// # Errors
    ///
    /// Returns a routing or provider error.
    pub async fn delete(&self, path: &ObjectPath) -> ServiceResult<()> {
        self.gateway
            .write(Capability::Storage, "delete_object", |adapter| async move {
                adapter.delete_object(path).await
            })
            .await
    }

    /// Lists up to `limit` object paths after `after`.
    ///
    /// # Errors
    ///
    /// Returns a routing or provider error.
    pub async fn list(&self, after: Option<&ObjectPath>, limit: usize) -> ServiceResult<Vec<ObjectPath>> {
        self.gateway
            .read(Capability::Storage, "list_objects", |adapter| {
                let start = after.cloned();
                async move { adapter.list_objects(start, limit).await }
            })
            .await
    }
}
