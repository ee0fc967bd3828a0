//! Record storage facade.

use super::{error::ServiceResult, gateway::Gateway};
use crate::provider::domain::{Capability, CollectionName, Filter, Record, RecordKey};

/// CRUD and query access to the provider bound to `database`.
#[derive(Clone)]
pub struct DatabaseService {
    gateway: Gateway,
}

impl DatabaseService {
    pub(super) const fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Inserts a new record.
    ///
    /// # Errors
    ///
    /// Returns [`super::ServiceError::Routing`] when no provider serves the
    /// capability, or the provider's error (e.g. `conflict` for an existing
    /// key).
    pub async fn create(&self, collection: &CollectionName, record: Record) -> ServiceResult<Record> {
        self.gateway
            .write(Capability::Database, "create", |adapter| {
                let record = record.clone();
                async move { adapter.create(collection, record).await }
            })
            .await
    }

    /// Reads one record.
    ///
    /// # Errors
    ///
    /// Returns a routing or provider error.
    pub async fn read(
        &self,
        collection: &CollectionName,
        key: &RecordKey,
    ) -> ServiceResult<Option<Record>> {
        self.gateway
            .read(Capability::Database, "read", |adapter| async move {
                adapter.read(collection, key).await
            })
            .await
    }

    /// Returns records matching `filter`, in key order.
    ///
    /// # Errors
    ///
    /// Returns a routing or provider error.
    pub async fn query(&self, collection: &CollectionName, filter: &Filter) -> ServiceResult<Vec<Record>> {
        self.gateway
            .read(Capability::Database, "query", |adapter| async move {
                adapter.query(collection, filter).await
            })
            .await
    }

    /// Replaces an existing record.
    ///
    /// # Errors
    ///
    /// Returns a routing or provider error (`not_found` for a missing key).
    pub async fn update(&self, collection: &CollectionName, record: Record) -> ServiceResult<Record> {
        self.gateway
            .write(Capability::Database, "update", |adapter| {
                let record = record.clone();
                async move { adapter.update(collection, record).await }
            })
            .await
    }

    /// Removes a record.
    ///
    /// # Errors
    ///
    /// Returns a routing or provider error.
    pub async fn delete(&self, collection: &CollectionName, key: &RecordKey) -> ServiceResult<()> {
        self.gateway
            .write(Capability::Database, "delete", |adapter| async move {
                adapter.delete(collection, key).await
            })
            .await
    }
}
