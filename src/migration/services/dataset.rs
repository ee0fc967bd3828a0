//! Uniform view of the data a capability stores on one provider.
//!
//! Database data is every record of every collection, in collection then key
//! order. Storage data is every object, in path order, under a single
//! `objects` partition. Auth, realtime and functions keep no migratable
//! data.

use crate::migration::domain::ContentHash;
use crate::provider::{
    domain::{Capability, CollectionName, ObjectPath, Record, RecordKey},
    ports::{PermanentKind, ProviderAdapter, ProviderError, ProviderResult},
    services::{CallPolicy, call_with_retry},
};
use std::sync::Arc;

/// Partition name holding storage objects.
pub const OBJECTS_PARTITION: &str = "objects";

/// Address of one item within a data set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemRef {
    /// Collection name or [`OBJECTS_PARTITION`].
    pub partition: String,
    /// Record key or object path.
    pub key: String,
}

impl ItemRef {
    /// Returns `partition/key`.
    #[must_use]
    pub fn qualified(&self) -> String {
        format!("{}/{}", self.partition, self.key)
    }
}

/// One migratable item.
#[derive(Debug, Clone, PartialEq)]
pub enum DataItem {
    /// A database record.
    Record {
        /// Owning collection.
        collection: CollectionName,
        /// The record.
        record: Record,
    },
    /// A storage object.
    Object {
        /// Object path.
        path: ObjectPath,
        /// Object content.
        content: Vec<u8>,
    },
}

impl DataItem {
    /// Returns the item's address.
    #[must_use]
    pub fn reference(&self) -> ItemRef {
        match self {
            Self::Record { collection, record } => ItemRef {
                partition: collection.as_str().to_owned(),
                key: record.key().as_str().to_owned(),
            },
            Self::Object { path, .. } => ItemRef {
                partition: OBJECTS_PARTITION.to_owned(),
                key: path.as_str().to_owned(),
            },
        }
    }

    /// Returns the SHA-256 digest of the item's canonical encoding.
    ///
    /// Records hash their JSON payload with object keys in sorted order;
    /// objects hash their raw bytes.
    #[must_use]
    pub fn content_hash(&self) -> ContentHash {
        let reference = self.reference();
        match self {
            Self::Record { record, .. } => {
                let canonical = record.payload().to_string();
                ContentHash::digest(&reference.qualified(), canonical.as_bytes())
            }
            Self::Object { content, .. } => ContentHash::digest(&reference.qualified(), content),
        }
    }
}

/// One capability's data on one provider, accessed under the call policy.
#[derive(Clone)]
pub struct DataSet {
    capability: Capability,
    adapter: Arc<dyn ProviderAdapter>,
    policy: CallPolicy,
}

impl DataSet {
    /// Creates a data set view.
    #[must_use]
    pub fn new(capability: Capability, adapter: Arc<dyn ProviderAdapter>, policy: CallPolicy) -> Self {
        Self {
            capability,
            adapter,
            policy,
        }
    }

    /// Returns the underlying adapter.
    #[must_use]
    pub const fn adapter(&self) -> &Arc<dyn ProviderAdapter> {
        &self.adapter
    }

    /// Returns the partitions holding data, in migration order.
    ///
    /// # Errors
    ///
    /// Returns the adapter's [`ProviderError`] after retries.
    pub async fn partitions(&self) -> ProviderResult<Vec<String>> {
        match self.capability {
            Capability::Database => {
                let mut names: Vec<String> = call_with_retry(&self.policy, "list_collections", || {
                    self.adapter.list_collections()
                })
                .await?
                .into_iter()
                .map(|collection| collection.as_str().to_owned())
                .collect();
                names.sort();
                names.dedup();
                Ok(names)
            }
            Capability::Storage => Ok(vec![OBJECTS_PARTITION.to_owned()]),
            Capability::Auth | Capability::Realtime | Capability::Functions => Ok(Vec::new()),
        }
    }

    /// Returns up to `limit` items of `partition` with keys after `after`.
    ///
    /// # Errors
    ///
    /// Returns the adapter's [`ProviderError`] after retries, or a
    /// validation error when a key cannot be parsed.
    pub async fn page(
        &self,
        partition: &str,
        after: Option<&str>,
        limit: usize,
    ) -> ProviderResult<Vec<DataItem>> {
        match self.capability {
            Capability::Database => {
                let collection = parse_collection(partition)?;
                let after_key = after.map(parse_key).transpose()?;
                let records = call_with_retry(&self.policy, "scan", || {
                    self.adapter.scan(&collection, after_key.clone(), limit)
                })
                .await?;
                Ok(records
                    .into_iter()
                    .map(|record| DataItem::Record {
                        collection: collection.clone(),
                        record,
                    })
                    .collect())
            }
            Capability::Storage => {
                let after_path = after.map(parse_path).transpose()?;
                let paths = call_with_retry(&self.policy, "list_objects", || {
                    self.adapter.list_objects(after_path.clone(), limit)
                })
                .await?;
                let mut items = Vec::with_capacity(paths.len());
                for path in paths {
                    let content =
                        call_with_retry(&self.policy, "get_object", || self.adapter.get_object(&path))
                            .await?;
                    // Deleted between listing and reading.
                    if let Some(bytes) = content {
                        items.push(DataItem::Object {
                            path,
                            content: bytes,
                        });
                    }
                }
                Ok(items)
            }
            Capability::Auth | Capability::Realtime | Capability::Functions => Ok(Vec::new()),
        }
    }

    /// Reads the item at `reference`, if present.
    ///
    /// # Errors
    ///
    /// Returns the adapter's [`ProviderError`] after retries.
    pub async fn fetch(&self, reference: &ItemRef) -> ProviderResult<Option<DataItem>> {
        match self.capability {
            Capability::Database => {
                let collection = parse_collection(&reference.partition)?;
                let key = parse_key(&reference.key)?;
                let record = call_with_retry(&self.policy, "read", || {
                    self.adapter.read(&collection, &key)
                })
                .await?;
                Ok(record.map(|found| DataItem::Record {
                    collection,
                    record: found,
                }))
            }
            Capability::Storage => {
                let path = parse_path(&reference.key)?;
                let content =
                    call_with_retry(&self.policy, "get_object", || self.adapter.get_object(&path))
                        .await?;
                Ok(content.map(|bytes| DataItem::Object {
                    path,
                    content: bytes,
                }))
            }
            Capability::Auth | Capability::Realtime | Capability::Functions => Ok(None),
        }
    }

    /// Writes `item`, replacing any existing item at the same address.
    ///
    /// # Errors
    ///
    /// Returns the adapter's [`ProviderError`] after retries.
    pub async fn write(&self, item: &DataItem) -> ProviderResult<()> {
        match item {
            DataItem::Record { collection, record } => {
                call_with_retry(&self.policy, "upsert", || {
                    self.adapter.upsert(collection, record.clone())
                })
                .await?;
                Ok(())
            }
            DataItem::Object { path, content } => {
                call_with_retry(&self.policy, "put_object", || {
                    self.adapter.put_object(path, content.clone())
                })
                .await
            }
        }
    }

    /// Removes the item at `reference`. Removing a missing item succeeds.
    ///
    /// # Errors
    ///
    /// Returns the adapter's [`ProviderError`] after retries.
    pub async fn remove(&self, reference: &ItemRef) -> ProviderResult<()> {
        let result = match self.capability {
            Capability::Database => {
                let collection = parse_collection(&reference.partition)?;
                let key = parse_key(&reference.key)?;
                call_with_retry(&self.policy, "delete", || {
                    self.adapter.delete(&collection, &key)
                })
                .await
            }
            Capability::Storage => {
                let path = parse_path(&reference.key)?;
                call_with_retry(&self.policy, "delete_object", || {
                    self.adapter.delete_object(&path)
                })
                .await
            }
            Capability::Auth | Capability::Realtime | Capability::Functions => Ok(()),
        };
        match result {
            Err(err) if err.permanent_kind() == Some(PermanentKind::NotFound) => Ok(()),
            other => other,
        }
    }

    /// Returns the number of items in the data set.
    ///
    /// # Errors
    ///
    /// Returns the adapter's [`ProviderError`] after retries.
    pub async fn count(&self, page_size: usize) -> ProviderResult<u64> {
        match self.capability {
            Capability::Database => {
                let mut total = 0_u64;
                for partition in self.partitions().await? {
                    let collection = parse_collection(&partition)?;
                    let count =
                        call_with_retry(&self.policy, "count", || self.adapter.count(&collection))
                            .await?;
                    total = total.saturating_add(count);
                }
                Ok(total)
            }
            Capability::Storage => {
                let mut total = 0_u64;
                let mut after: Option<ObjectPath> = None;
                let limit = page_size.max(1);
                loop {
                    let paths = call_with_retry(&self.policy, "list_objects", || {
                        self.adapter.list_objects(after.clone(), limit)
                    })
                    .await?;
                    let fetched = paths.len();
                    total = total.saturating_add(u64::try_from(fetched).unwrap_or(u64::MAX));
                    if fetched < limit {
                        return Ok(total);
                    }
                    after = paths.into_iter().last();
                }
            }
            Capability::Auth | Capability::Realtime | Capability::Functions => Ok(0),
        }
    }
}

fn parse_collection(value: &str) -> ProviderResult<CollectionName> {
    CollectionName::new(value).map_err(|err| ProviderError::validation(err.to_string()))
}

fn parse_key(value: &str) -> ProviderResult<RecordKey> {
    RecordKey::new(value).map_err(|err| ProviderError::validation(err.to_string()))
}

fn parse_path(value: &str) -> ProviderResult<ObjectPath> {
    ObjectPath::new(value).map_err(|err| ProviderError::validation(err.to_string()))
}
