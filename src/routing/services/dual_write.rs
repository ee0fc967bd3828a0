//! Dual-write mirroring from a bound provider to a migration target.
//!
//! Writes go to the primary synchronously. Once the primary succeeds the
//! write is queued on a bounded channel, and a background task replays it on
//! the target. Replays are ordered per capability but only weakly ordered
//! with respect to the primary: a mirrored write lands some time after the
//! primary write it copies. Replay failures and queue overflow are logged and
//! counted; they never fail the caller.

use crate::provider::{
    domain::{
        CollectionName, Credentials, Filter, FunctionName, HealthSignal, ObjectPath,
        ProviderName, Record, RecordKey, Session, Subscription, SubscriptionHandler, Topic,
    },
    ports::{PermanentKind, ProviderAdapter, ProviderResult},
    services::{CallPolicy, call_with_retry},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};

/// A write replayed on the mirror target.
#[derive(Debug)]
pub enum MirrorOp {
    /// Insert or replace a record.
    Upsert {
        /// Target collection.
        collection: CollectionName,
        /// Record as written to the primary.
        record: Record,
    },
    /// Remove a record.
    Delete {
        /// Target collection.
        collection: CollectionName,
        /// Removed key.
        key: RecordKey,
    },
    /// Store an object.
    PutObject {
        /// Object path.
        path: ObjectPath,
        /// Object content.
        content: Vec<u8>,
    },
    /// Remove an object.
    DeleteObject {
        /// Object path.
        path: ObjectPath,
    },
    /// Acknowledge once every earlier operation has been applied.
    Flush(oneshot::Sender<()>),
}

impl MirrorOp {
    const fn label(&self) -> &'static str {
        match self {
            Self::Upsert { .. } => "upsert",
            Self::Delete { .. } => "delete",
            Self::PutObject { .. } => "put_object",
            Self::DeleteObject { .. } => "delete_object",
            Self::Flush(_) => "flush",
        }
    }
}

/// Counters describing mirror activity.
#[derive(Debug, Default)]
pub struct MirrorStats {
    enqueued: AtomicU64,
    applied: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of [`MirrorStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorStatsSnapshot {
    /// Writes accepted onto the queue.
    pub enqueued: u64,
    /// Writes replayed on the target.
    pub applied: u64,
    /// Writes the target rejected after retries.
    pub failed: u64,
    /// Writes discarded because the queue was full or closed.
    pub dropped: u64,
}

impl MirrorStats {
    /// Returns the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> MirrorStatsSnapshot {
        MirrorStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Producer side of a running mirror.
#[derive(Debug, Clone)]
pub struct MirrorHandle {
    target: ProviderName,
    sender: mpsc::Sender<MirrorOp>,
    stats: Arc<MirrorStats>,
}

impl MirrorHandle {
    /// Starts a mirror task replaying writes on `target`.
    ///
    /// The task ends when every handle clone has been dropped and the queue
    /// is drained.
    #[must_use]
    pub fn spawn(target: Arc<dyn ProviderAdapter>, capacity: usize, policy: CallPolicy) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let stats = Arc::new(MirrorStats::default());
        let handle = Self {
            target: target.name().clone(),
            sender,
            stats: Arc::clone(&stats),
        };
        tokio::spawn(run_mirror(target, receiver, stats, policy));
        handle
    }

    /// Returns the mirror target's name.
    #[must_use]
    pub const fn target(&self) -> &ProviderName {
        &self.target
    }

    /// Returns the mirror counters.
    #[must_use]
    pub fn stats(&self) -> MirrorStatsSnapshot {
        self.stats.snapshot()
    }

    /// Queues a write without waiting. A full or closed queue drops it.
    pub fn enqueue(&self, op: MirrorOp) {
        let label = op.label();
        match self.sender.try_send(op) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                let reason = match err {
                    mpsc::error::TrySendError::Full(_) => "queue full",
                    mpsc::error::TrySendError::Closed(_) => "mirror stopped",
                };
                tracing::warn!(
                    target_provider = %self.target,
                    operation = label,
                    reason,
                    "dropped mirrored write"
                );
            }
        }
    }

    /// Waits until every write queued before this call has been replayed.
    ///
    /// Returns `false` when the mirror task has stopped.
    pub async fn flush(&self) -> bool {
        let (ack, done) = oneshot::channel();
        if self.sender.send(MirrorOp::Flush(ack)).await.is_err() {
            return false;
        }
        done.await.is_ok()
    }
}

async fn run_mirror(
    target: Arc<dyn ProviderAdapter>,
    mut receiver: mpsc::Receiver<MirrorOp>,
    stats: Arc<MirrorStats>,
    policy: CallPolicy,
) {
    while let Some(op) = receiver.recv().await {
        let label = op.label();
        let outcome = match op {
            MirrorOp::Flush(ack) => {
                if ack.send(()).is_err() {
                    tracing::trace!("flush requester stopped waiting");
                }
                continue;
            }
            MirrorOp::Upsert { collection, record } => {
                call_with_retry(&policy, "mirror upsert", || {
                    target.upsert(&collection, record.clone())
                })
                .await
                .map(|_| ())
            }
            MirrorOp::Delete { collection, key } => {
                tolerate_missing(
                    call_with_retry(&policy, "mirror delete", || target.delete(&collection, &key))
                        .await,
                )
            }
            MirrorOp::PutObject { path, content } => {
                call_with_retry(&policy, "mirror put_object", || {
                    target.put_object(&path, content.clone())
                })
                .await
            }
            MirrorOp::DeleteObject { path } => tolerate_missing(
                call_with_retry(&policy, "mirror delete_object", || target.delete_object(&path))
                    .await,
            ),
        };
        match outcome {
            Ok(()) => {
                stats.applied.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    target_provider = %target.name(),
                    operation = label,
                    error = %err,
                    "mirrored write failed"
                );
            }
        }
    }
    tracing::debug!(target_provider = %target.name(), "mirror stopped");
}

/// A delete of an item the target never received is already converged.
fn tolerate_missing(result: ProviderResult<()>) -> ProviderResult<()> {
    match result {
        Err(err) if err.permanent_kind() == Some(PermanentKind::NotFound) => Ok(()),
        other => other,
    }
}

/// Adapter that writes through to a primary and mirrors writes to a target.
pub struct DualWriteAdapter {
    primary: Arc<dyn ProviderAdapter>,
    mirror: MirrorHandle,
}

impl DualWriteAdapter {
    /// Wraps `primary`, mirroring its successful writes through `mirror`.
    #[must_use]
    pub const fn new(primary: Arc<dyn ProviderAdapter>, mirror: MirrorHandle) -> Self {
        Self { primary, mirror }
    }

    /// Returns the mirror handle.
    #[must_use]
    pub const fn mirror(&self) -> &MirrorHandle {
        &self.mirror
    }
}

#[async_trait]
impl ProviderAdapter for DualWriteAdapter {
    fn name(&self) -> &ProviderName {
        self.primary.name()
    }

    async fn create(&self, collection: &CollectionName, record: Record) -> ProviderResult<Record> {
        let written = self.primary.create(collection, record).await?;
        self.mirror.enqueue(MirrorOp::Upsert {
            collection: collection.clone(),
            record: written.clone(),
        });
        Ok(written)
    }

    async fn read(
        &self,
        collection: &CollectionName,
        key: &RecordKey,
    ) -> ProviderResult<Option<Record>> {
        self.primary.read(collection, key).await
    }

    async fn query(
        &self,
        collection: &CollectionName,
        filter: &Filter,
    ) -> ProviderResult<Vec<Record>> {
        self.primary.query(collection, filter).await
    }

    async fn update(&self, collection: &CollectionName, record: Record) -> ProviderResult<Record> {
        let written = self.primary.update(collection, record).await?;
        self.mirror.enqueue(MirrorOp::Upsert {
            collection: collection.clone(),
            record: written.clone(),
        });
        Ok(written)
    }

    async fn upsert(&self, collection: &CollectionName, record: Record) -> ProviderResult<Record> {
        let written = self.primary.upsert(collection, record).await?;
        self.mirror.enqueue(MirrorOp::Upsert {
            collection: collection.clone(),
            record: written.clone(),
        });
        Ok(written)
    }

    async fn delete(&self, collection: &CollectionName, key: &RecordKey) -> ProviderResult<()> {
        self.primary.delete(collection, key).await?;
        self.mirror.enqueue(MirrorOp::Delete {
            collection: collection.clone(),
            key: key.clone(),
        });
        Ok(())
    }

    async fn list_collections(&self) -> ProviderResult<Vec<CollectionName>> {
        self.primary.list_collections().await
    }

    async fn scan(
        &self,
        collection: &CollectionName,
        after: Option<RecordKey>,
        limit: usize,
    ) -> ProviderResult<Vec<Record>> {
        self.primary.scan(collection, after, limit).await
    }

    async fn count(&self, collection: &CollectionName) -> ProviderResult<u64> {
        self.primary.count(collection).await
    }

    async fn authenticate(&self, credentials: &Credentials) -> ProviderResult<Session> {
        self.primary.authenticate(credentials).await
    }

    async fn put_object(&self, path: &ObjectPath, content: Vec<u8>) -> ProviderResult<()> {
        self.primary.put_object(path, content.clone()).await?;
        self.mirror.enqueue(MirrorOp::PutObject {
            path: path.clone(),
            content,
        });
        Ok(())
    }

    async fn get_object(&self, path: &ObjectPath) -> ProviderResult<Option<Vec<u8>>> {
        self.primary.get_object(path).await
    }

    async fn delete_object(&self, path: &ObjectPath) -> ProviderResult<()> {
        self.primary.delete_object(path).await?;
        self.mirror
            .enqueue(MirrorOp::DeleteObject { path: path.clone() });
        Ok(())
    }

    async fn list_objects(
        &self,
        after: Option<ObjectPath>,
        limit: usize,
    ) -> ProviderResult<Vec<ObjectPath>> {
        self.primary.list_objects(after, limit).await
    }

    async fn subscribe(
        &self,
        topic: &Topic,
        handler: SubscriptionHandler,
    ) -> ProviderResult<Subscription> {
        self.primary.subscribe(topic, handler).await
    }

    async fn unsubscribe(&self, subscription: &Subscription) -> ProviderResult<()> {
        self.primary.unsubscribe(subscription).await
    }

    async fn publish(&self, topic: &Topic, payload: Value) -> ProviderResult<()> {
        self.primary.publish(topic, payload).await
    }

    async fn invoke(&self, function: &FunctionName, payload: Value) -> ProviderResult<Value> {
        self.primary.invoke(function, payload).await
    }

    async fn probe(&self) -> ProviderResult<HealthSignal> {
        self.primary.probe().await
    }
}
