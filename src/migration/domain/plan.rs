//! Migration plan aggregate root.

use super::{
    BackfillCursor, MatchRate, MigrationDomainError, MigrationId, MigrationStatus,
    MigrationStrategy, ProgressCounters,
};
use crate::provider::domain::{Capability, ProviderName};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// A request to move one capability from a source to a target provider.
///
/// Retained after it finishes as an audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationPlan {
    id: MigrationId,
    capability: Capability,
    source: ProviderName,
    target: ProviderName,
    strategy: MigrationStrategy,
    status: MigrationStatus,
    progress: ProgressCounters,
    cursor: Option<BackfillCursor>,
    match_rate: Option<MatchRate>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

/// Parameter object for reconstructing a persisted migration plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedMigrationData {
    /// Persisted plan identifier.
    pub id: MigrationId,
    /// Migrated capability.
    pub capability: Capability,
    /// Provider data is copied from.
    pub source: ProviderName,
    /// Provider data is copied to.
    pub target: ProviderName,
    /// Copy strategy.
    pub strategy: MigrationStrategy,
    /// Persisted status.
    pub status: MigrationStatus,
    /// Persisted counters.
    pub progress: ProgressCounters,
    /// Persisted backfill position.
    pub cursor: Option<BackfillCursor>,
    /// Persisted verification result.
    pub match_rate: Option<MatchRate>,
    /// Persisted failure reason.
    pub failure_reason: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// When the plan reached `completed`, `failed` or `rolled_back`.
    pub completed_at: Option<DateTime<Utc>>,
}

impl MigrationPlan {
    /// Creates a `pending` plan.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationDomainError::SameProvider`] when source and target
    /// are the same provider.
    pub fn new(
        capability: Capability,
        source: ProviderName,
        target: ProviderName,
        strategy: MigrationStrategy,
        clock: &impl Clock,
    ) -> Result<Self, MigrationDomainError> {
        if source == target {
            return Err(MigrationDomainError::SameProvider(target));
        }
        let timestamp = clock.utc();
        Ok(Self {
            id: MigrationId::new(),
            capability,
            source,
            target,
            strategy,
            status: MigrationStatus::Pending,
            progress: ProgressCounters::default(),
            cursor: None,
            match_rate: None,
            failure_reason: None,
            created_at: timestamp,
            updated_at: timestamp,
            completed_at: None,
        })
    }

    /// Reconstructs a plan from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedMigrationData) -> Self {
        Self {
            id: data.id,
            capability: data.capability,
            source: data.source,
            target: data.target,
            strategy: data.strategy,
            status: data.status,
            progress: data.progress,
            cursor: data.cursor,
            match_rate: data.match_rate,
            failure_reason: data.failure_reason,
            created_at: data.created_at,
            updated_at: data.updated_at,
            completed_at: data.completed_at,
        }
    }

    /// Returns the plan identifier.
    #[must_use]
    pub const fn id(&self) -> MigrationId {
        self.id
    }

    /// Returns the migrated capability.
    #[must_use]
    pub const fn capability(&self) -> Capability {
        self.capability
    }

    /// Returns the source provider.
    #[must_use]
    pub const fn source(&self) -> &ProviderName {
        &self.source
    }

    /// Returns the target provider.
    #[must_use]
    pub const fn target(&self) -> &ProviderName {
        &self.target
    }

    /// Returns the copy strategy.
    #[must_use]
    pub const fn strategy(&self) -> MigrationStrategy {
        self.strategy
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> MigrationStatus {
        self.status
    }

    /// Returns the item counters.
    #[must_use]
    pub const fn progress(&self) -> &ProgressCounters {
        &self.progress
    }

    /// Returns the persisted backfill position.
    #[must_use]
    pub const fn cursor(&self) -> Option<&BackfillCursor> {
        self.cursor.as_ref()
    }

    /// Returns the verification match rate once measured.
    #[must_use]
    pub const fn match_rate(&self) -> Option<MatchRate> {
        self.match_rate
    }

    /// Returns why the plan failed.
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest change timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns when the plan stopped.
    #[must_use]
    pub const fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Moves `pending → running`.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationDomainError::InvalidTransition`] from any other
    /// status.
    pub fn start(&mut self, clock: &impl Clock) -> Result<(), MigrationDomainError> {
        self.transition(MigrationStatus::Running, clock)
    }

    /// Moves `running → verifying`, resetting verification counters.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationDomainError::InvalidTransition`] from any other
    /// status.
    pub fn begin_verification(&mut self, clock: &impl Clock) -> Result<(), MigrationDomainError> {
        self.transition(MigrationStatus::Verifying, clock)?;
        self.reset_verification();
        Ok(())
    }

    /// Clears verification counters before a verification pass is re-run.
    pub const fn reset_verification(&mut self) {
        self.progress.verified = 0;
        self.progress.mismatched = 0;
        self.match_rate = None;
    }

    /// Moves `verifying → completed` after a passing verification.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationDomainError::InvalidTransition`] from any other
    /// status.
    pub fn complete(&mut self, clock: &impl Clock) -> Result<(), MigrationDomainError> {
        self.transition(MigrationStatus::Completed, clock)?;
        self.completed_at = Some(self.updated_at);
        Ok(())
    }

    /// Moves an active plan to `failed`.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationDomainError::InvalidTransition`] when the plan has
    /// already stopped.
    pub fn fail(
        &mut self,
        reason: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), MigrationDomainError> {
        self.transition(MigrationStatus::Failed, clock)?;
        self.failure_reason = Some(reason.into());
        self.completed_at = Some(self.updated_at);
        Ok(())
    }

    /// Moves `failed → rolled_back`.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationDomainError::InvalidTransition`] from any other
    /// status.
    pub fn roll_back(&mut self, clock: &impl Clock) -> Result<(), MigrationDomainError> {
        self.transition(MigrationStatus::RolledBack, clock)?;
        self.completed_at = Some(self.updated_at);
        Ok(())
    }

    /// Folds one backfill batch into the counters and advances the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationDomainError::NotActive`] unless the plan is
    /// `running` or `verifying`.
    pub fn record_batch(
        &mut self,
        copied: u64,
        failed: u64,
        cursor: Option<BackfillCursor>,
        clock: &impl Clock,
    ) -> Result<(), MigrationDomainError> {
        self.ensure_copying()?;
        self.progress.copied = self.progress.copied.saturating_add(copied);
        self.progress.failed = self.progress.failed.saturating_add(failed);
        if cursor.is_some() {
            self.cursor = cursor;
        }
        self.updated_at = clock.utc();
        Ok(())
    }

    /// Folds one verification batch into the counters.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationDomainError::NotActive`] unless the plan is
    /// `verifying`.
    pub fn record_verification(
        &mut self,
        verified: u64,
        mismatched: u64,
        clock: &impl Clock,
    ) -> Result<(), MigrationDomainError> {
        self.ensure_status(MigrationStatus::Verifying)?;
        self.progress.verified = self.progress.verified.saturating_add(verified);
        self.progress.mismatched = self.progress.mismatched.saturating_add(mismatched);
        self.updated_at = clock.utc();
        Ok(())
    }

    /// Stores the verification outcome.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationDomainError::NotActive`] unless the plan is
    /// `verifying`.
    pub fn set_match_rate(
        &mut self,
        rate: MatchRate,
        clock: &impl Clock,
    ) -> Result<(), MigrationDomainError> {
        self.ensure_status(MigrationStatus::Verifying)?;
        self.match_rate = Some(rate);
        self.updated_at = clock.utc();
        Ok(())
    }

    fn ensure_copying(&self) -> Result<(), MigrationDomainError> {
        if matches!(
            self.status,
            MigrationStatus::Running | MigrationStatus::Verifying
        ) {
            Ok(())
        } else {
            Err(self.not_active())
        }
    }

    fn ensure_status(&self, expected: MigrationStatus) -> Result<(), MigrationDomainError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(self.not_active())
        }
    }

    const fn not_active(&self) -> MigrationDomainError {
        MigrationDomainError::NotActive {
            id: self.id,
            status: self.status,
        }
    }

    fn transition(
        &mut self,
        next: MigrationStatus,
        clock: &impl Clock,
    ) -> Result<(), MigrationDomainError> {
        if !self.status.can_transition_to(next) {
            return Err(MigrationDomainError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = clock.utc();
        Ok(())
    }
}
