//! Backfill, catch-up and verification passes of a migration plan.
//!
//! The engine moves data and keeps the plan's counters, cursor and
//! checkpoints persisted. It never touches bindings: strategy drivers in the
//! backend manager decide when to pause writes, install mirrors and flip.

use super::dataset::{DataItem, DataSet, ItemRef};
use crate::events::{ControlPlaneEvent, EventBus};
use crate::migration::{
    domain::{
        BackfillCursor, ConsistencyCheckpoint, MatchRate, MigrationDomainError, MigrationPlan,
        MigrationSettings,
    },
    ports::{MigrationRepository, MigrationRepositoryError},
};
use crate::provider::{domain::ProviderName, ports::ProviderError};
use mockable::Clock;
use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;

/// Errors that stop a migration.
#[derive(Debug, Clone, Error)]
pub enum MigrationError {
    /// Plan state change was rejected.
    #[error(transparent)]
    Domain(#[from] MigrationDomainError),
    /// Plan persistence failed.
    #[error(transparent)]
    Repository(#[from] MigrationRepositoryError),
    /// A provider call failed after retries.
    #[error("provider call failed: {0}")]
    Provider(#[from] ProviderError),
    /// The plan was cancelled by an operator or by failover.
    #[error("migration cancelled: {0}")]
    Cancelled(String),
    /// Too many items failed to copy.
    #[error("{failed} of {processed} items failed to copy")]
    TooManyFailures {
        /// Items that failed.
        failed: u64,
        /// Items attempted.
        processed: u64,
    },
    /// Verification fell short of the strategy's threshold.
    #[error("verification match rate {rate} is below the {threshold} threshold")]
    VerificationFailed {
        /// Measured rate.
        rate: MatchRate,
        /// Required rate.
        threshold: MatchRate,
    },
    /// The immediate strategy could not finish inside its write pause.
    #[error("write pause exceeded {0:?}")]
    PauseWindowExceeded(Duration),
    /// The target stopped being healthy or was removed.
    #[error("provider {0} is not available for cutover")]
    ProviderUnavailable(ProviderName),
    /// The dual-write mirror stopped before it drained.
    #[error("mirror to {0} stopped before draining")]
    MirrorStopped(ProviderName),
}

/// Result type for migration passes.
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Cooperative cancellation flag shared with a running driver.
///
/// Cancellation takes effect before the next batch is dispatched. The first
/// recorded reason wins.
#[derive(Debug, Clone, Default)]
pub struct MigrationControl {
    reason: Arc<OnceLock<String>>,
}

impl MigrationControl {
    /// Creates a control that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation on behalf of an operator.
    pub fn cancel(&self) {
        self.cancel_with("cancelled by operator");
    }

    /// Requests cancellation, recording why.
    pub fn cancel_with(&self, reason: impl Into<String>) {
        // The first reason wins.
        if self.reason.set(reason.into()).is_err() {
            tracing::trace!("migration already cancelled");
        }
    }

    /// Returns whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.reason.get().is_some()
    }

    /// Returns the recorded cancellation reason.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.get().map(String::as_str)
    }

    /// Fails with [`MigrationError::Cancelled`] once cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Cancelled`] when cancellation was requested.
    pub fn check(&self) -> MigrationResult<()> {
        match self.reason() {
            Some(reason) => Err(MigrationError::Cancelled(reason.to_owned())),
            None => Ok(()),
        }
    }
}

/// Source and target views of one plan.
pub struct MigrationEndpoints {
    /// Provider data is copied from.
    pub source: DataSet,
    /// Provider data is copied to.
    pub target: DataSet,
}

/// Runs data passes for migration plans.
pub struct MigrationEngine<R, C>
where
    R: MigrationRepository,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    clock: Arc<C>,
    events: EventBus,
    settings: MigrationSettings,
}

impl<R, C> MigrationEngine<R, C>
where
    R: MigrationRepository,
    C: Clock + Send + Sync,
{
    /// Creates an engine.
    #[must_use]
    pub const fn new(
        repository: Arc<R>,
        clock: Arc<C>,
        events: EventBus,
        settings: MigrationSettings,
    ) -> Self {
        Self {
            repository,
            clock,
            events,
            settings,
        }
    }

    /// Returns the engine settings.
    #[must_use]
    pub const fn settings(&self) -> &MigrationSettings {
        &self.settings
    }

    /// Copies every source item to the target, resuming after the plan's
    /// cursor.
    ///
    /// After each batch the counters and cursor are persisted and a
    /// `MigrationProgress` event is published. Items the target rejects are
    /// counted as failed; the pass aborts once failures exceed the abort
    /// ratio.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Cancelled`], [`MigrationError::TooManyFailures`],
    /// or the error of a source read or persistence call.
    pub async fn backfill(
        &self,
        plan: &mut MigrationPlan,
        endpoints: &MigrationEndpoints,
        control: &MigrationControl,
    ) -> MigrationResult<()> {
        let resume = plan.cursor().cloned();
        let batch_size = self.settings.batch_size.max(1);
        for partition in endpoints.source.partitions().await? {
            let mut after = match &resume {
                Some(cursor) if partition < cursor.partition => continue,
                Some(cursor) if partition == cursor.partition => Some(cursor.last_key.clone()),
                _ => None,
            };
            loop {
                control.check()?;
                let items = endpoints
                    .source
                    .page(&partition, after.as_deref(), batch_size)
                    .await?;
                let Some(last) = items.last().map(DataItem::reference) else {
                    break;
                };
                let fetched = items.len();
                let (copied, failed) = self.copy_items(plan, &endpoints.target, items).await;
                plan.record_batch(
                    copied,
                    failed,
                    Some(BackfillCursor::new(last.partition, last.key.clone())),
                    &*self.clock,
                )?;
                self.persist_batch(plan).await?;
                if fetched < batch_size {
                    break;
                }
                after = Some(last.key);
            }
        }
        Ok(())
    }

    /// Re-copies items that differ between source and target and deletes
    /// target items the source no longer has.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Cancelled`], [`MigrationError::TooManyFailures`],
    /// or the error of a provider or persistence call.
    pub async fn catch_up(
        &self,
        plan: &mut MigrationPlan,
        endpoints: &MigrationEndpoints,
        control: &MigrationControl,
    ) -> MigrationResult<()> {
        let batch_size = self.settings.batch_size.max(1);
        for partition in endpoints.source.partitions().await? {
            let mut after: Option<String> = None;
            loop {
                control.check()?;
                let items = endpoints
                    .source
                    .page(&partition, after.as_deref(), batch_size)
                    .await?;
                let Some(last) = items.last().map(DataItem::reference) else {
                    break;
                };
                let fetched = items.len();
                let mut stale = Vec::new();
                for item in items {
                    let current = endpoints.target.fetch(&item.reference()).await?;
                    if current.is_none_or(|found| found.content_hash() != item.content_hash()) {
                        stale.push(item);
                    }
                }
                if !stale.is_empty() {
                    let (copied, failed) = self.copy_items(plan, &endpoints.target, stale).await;
                    plan.record_batch(copied, failed, None, &*self.clock)?;
                    self.persist_batch(plan).await?;
                }
                if fetched < batch_size {
                    break;
                }
                after = Some(last.key);
            }
        }

        self.remove_orphans(plan, endpoints, control).await?;
        Ok(())
    }

    /// Deletes every target item the source does not hold and returns how
    /// many were removed.
    ///
    /// [`verify`](Self::verify) walks source items only, so drivers run
    /// this first. It covers items the target held before the plan and
    /// backfill copies of items deleted while the copy was running.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Cancelled`], or the error of a provider
    /// call.
    pub async fn remove_orphans(
        &self,
        plan: &MigrationPlan,
        endpoints: &MigrationEndpoints,
        control: &MigrationControl,
    ) -> MigrationResult<u64> {
        let source_partitions = endpoints.source.partitions().await?;
        let target_partitions = endpoints.target.partitions().await?;
        let all_partitions: BTreeSet<&String> =
            source_partitions.iter().chain(&target_partitions).collect();
        let mut removed = 0_u64;
        for partition in all_partitions {
            let swept = self
                .remove_partition_orphans(plan, endpoints, partition, control)
                .await?;
            removed = removed.saturating_add(swept);
        }
        if removed > 0 {
            tracing::info!(plan_id = %plan.id(), removed, "removed target items absent from source");
        }
        Ok(removed)
    }

    async fn remove_partition_orphans(
        &self,
        plan: &MigrationPlan,
        endpoints: &MigrationEndpoints,
        partition: &str,
        control: &MigrationControl,
    ) -> MigrationResult<u64> {
        let batch_size = self.settings.batch_size.max(1);
        let mut after: Option<String> = None;
        let mut removed = 0_u64;
        loop {
            control.check()?;
            let items = endpoints
                .target
                .page(partition, after.as_deref(), batch_size)
                .await?;
            let fetched = items.len();
            let mut last: Option<ItemRef> = None;
            for item in items {
                let reference = item.reference();
                if endpoints.source.fetch(&reference).await?.is_none() {
                    endpoints.target.remove(&reference).await?;
                    removed = removed.saturating_add(1);
                    tracing::debug!(
                        plan_id = %plan.id(),
                        item = %reference.qualified(),
                        "removed target item absent from source"
                    );
                }
                last = Some(reference);
            }
            match last {
                Some(reference) if fetched >= batch_size => after = Some(reference.key),
                _ => return Ok(removed),
            }
        }
    }

    /// Compares source and target and returns the match rate.
    ///
    /// Every item is compared when the source holds at most
    /// `full_verification_limit` items. Larger data sets are sampled
    /// systematically: every `stride`-th item starting at an offset derived
    /// from the plan id, where `stride = total / sample_size`. Each
    /// comparison is appended as a checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Cancelled`], or the error of a provider or
    /// persistence call.
    pub async fn verify(
        &self,
        plan: &mut MigrationPlan,
        endpoints: &MigrationEndpoints,
        control: &MigrationControl,
    ) -> MigrationResult<MatchRate> {
        let batch_size = self.settings.batch_size.max(1);
        let total = endpoints.source.count(batch_size).await?;
        let sample = self.settings.sample_size(total);
        let stride = total.checked_div(sample).unwrap_or(1).max(1);
        let offset = sample_offset(plan, stride);
        tracing::info!(
            plan_id = %plan.id(),
            total,
            sample,
            stride,
            "verifying migration"
        );

        let mut index = 0_u64;
        let mut taken = 0_u64;
        'partitions: for partition in endpoints.source.partitions().await? {
            let mut after: Option<String> = None;
            loop {
                control.check()?;
                let items = endpoints
                    .source
                    .page(&partition, after.as_deref(), batch_size)
                    .await?;
                let Some(last) = items.last().map(DataItem::reference) else {
                    break;
                };
                let fetched = items.len();
                let mut checkpoints = Vec::new();
                for item in items {
                    let position = index;
                    index = index.saturating_add(1);
                    if taken >= sample || !is_sampled(position, offset, stride) {
                        continue;
                    }
                    taken = taken.saturating_add(1);
                    checkpoints.push(self.compare(plan, endpoints, &item).await?);
                }
                self.persist_checkpoints(plan, &checkpoints).await?;
                if taken >= sample {
                    break 'partitions;
                }
                if fetched < batch_size {
                    break;
                }
                after = Some(last.key);
            }
        }

        let progress = plan.progress();
        let rate = MatchRate::from_counts(
            progress.verified.saturating_sub(progress.mismatched),
            progress.verified,
        );
        plan.set_match_rate(rate, &*self.clock)?;
        self.repository.update(plan).await?;
        Ok(rate)
    }

    async fn compare(
        &self,
        plan: &MigrationPlan,
        endpoints: &MigrationEndpoints,
        item: &DataItem,
    ) -> MigrationResult<ConsistencyCheckpoint> {
        let reference = item.reference();
        let target = endpoints.target.fetch(&reference).await?;
        let checkpoint = ConsistencyCheckpoint::compare(
            plan.id(),
            reference.qualified(),
            Some(item.content_hash()),
            target.map(|found| found.content_hash()),
            self.clock.utc(),
        );
        if !checkpoint.matched {
            tracing::warn!(
                plan_id = %plan.id(),
                item = %checkpoint.item_key,
                source_hash = ?checkpoint.source_hash.as_ref().map(ToString::to_string),
                target_hash = ?checkpoint.target_hash.as_ref().map(ToString::to_string),
                "verification mismatch needs manual reconciliation"
            );
        }
        Ok(checkpoint)
    }

    async fn persist_checkpoints(
        &self,
        plan: &mut MigrationPlan,
        checkpoints: &[ConsistencyCheckpoint],
    ) -> MigrationResult<()> {
        if checkpoints.is_empty() {
            return Ok(());
        }
        let mismatched = checkpoints.iter().filter(|c| !c.matched).count();
        plan.record_verification(
            u64::try_from(checkpoints.len()).unwrap_or(u64::MAX),
            u64::try_from(mismatched).unwrap_or(u64::MAX),
            &*self.clock,
        )?;
        self.repository.append_checkpoints(checkpoints).await?;
        self.repository.update(plan).await?;
        Ok(())
    }

    async fn copy_items(
        &self,
        plan: &MigrationPlan,
        target: &DataSet,
        items: Vec<DataItem>,
    ) -> (u64, u64) {
        let mut copied = 0_u64;
        let mut failed = 0_u64;
        for item in items {
            match target.write(&item).await {
                Ok(()) => copied = copied.saturating_add(1),
                Err(err) => {
                    failed = failed.saturating_add(1);
                    tracing::warn!(
                        plan_id = %plan.id(),
                        item = %item.reference().qualified(),
                        error = %err,
                        "failed to copy item"
                    );
                }
            }
        }
        (copied, failed)
    }

    async fn persist_batch(&self, plan: &MigrationPlan) -> MigrationResult<()> {
        self.repository.update(plan).await?;
        let progress = plan.progress();
        self.events.publish(ControlPlaneEvent::MigrationProgress {
            plan_id: plan.id(),
            copied: progress.copied,
            verified: progress.verified,
            failed: progress.failed,
        });
        if self
            .settings
            .exceeds_abort_ratio(progress.failed, progress.processed())
        {
            return Err(MigrationError::TooManyFailures {
                failed: progress.failed,
                processed: progress.processed(),
            });
        }
        Ok(())
    }
}

/// Offset of the first sampled item, stable for a given plan.
fn sample_offset(plan: &MigrationPlan, stride: u64) -> u64 {
    let seed = plan.id().into_inner().as_u128();
    seed.checked_rem(u128::from(stride))
        .and_then(|offset| u64::try_from(offset).ok())
        .unwrap_or(0)
}

fn is_sampled(position: u64, offset: u64, stride: u64) -> bool {
    position
        .checked_sub(offset)
        .and_then(|distance| distance.checked_rem(stride))
        == Some(0)
}
