//! Strategy drivers: one task per active plan.
//!
//! - `immediate` pauses writes, copies and verifies inside the pause window,
//!   then flips.
//! - `gradual` mirrors writes to the target while it backfills and verifies,
//!   then pauses writes only long enough to drain the mirror and flip.
//! - `blue_green` backfills the target in isolation, starts mirroring, runs
//!   a catch-up pass, verifies and flips like `gradual`.
//!
//! Every failure leaves the source bound and marks the plan `failed`.

use super::error::{ManagerError, ManagerResult};
use super::manager::{BackendManager, BindingChange, poisoned};
use crate::events::ControlPlaneEvent;
use crate::manager::ports::ProviderCatalogRepository;
use crate::migration::{
    domain::{MatchRate, MigrationPlan, MigrationStatus, MigrationStrategy},
    ports::MigrationRepository,
    services::{DataSet, MigrationControl, MigrationEndpoints, MigrationError},
};
use crate::provider::domain::ProviderName;
use crate::routing::{
    domain::{BindingReason, CapabilityBinding},
    services::MirrorHandle,
};
use mockable::Clock;
use std::sync::Arc;

const INTERRUPTED_BY_RESTART: &str = "interrupted by restart";

impl<R, P, C> BackendManager<R, P, C>
where
    R: MigrationRepository + 'static,
    P: ProviderCatalogRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    pub(super) fn spawn_driver(
        &self,
        plan: MigrationPlan,
        control: MigrationControl,
    ) -> ManagerResult<()> {
        let capability = plan.capability();
        let id = plan.id();
        let manager = self.clone();
        let task = tokio::spawn(async move { manager.drive(plan, control).await });
        let mut active = self.inner.active.lock().map_err(poisoned)?;
        // A driver that already finished has released its slot.
        if let Some(migration) = active.get_mut(&capability)
            && migration.id == id
        {
            migration.task = Some(task);
        }
        Ok(())
    }

    async fn drive(self, mut plan: MigrationPlan, control: MigrationControl) {
        let capability = plan.capability();
        let id = plan.id();
        if let Err(err) = self.run_plan(&mut plan, &control).await {
            self.fail_plan(&mut plan, &err).await;
        }
        if let Err(err) = self.release_active(capability, id) {
            tracing::error!(plan_id = %id, error = %err, "failed to release migration slot");
        }
    }

    async fn run_plan(
        &self,
        plan: &mut MigrationPlan,
        control: &MigrationControl,
    ) -> ManagerResult<()> {
        let endpoints = self.endpoints(plan)?;
        if plan.status() == MigrationStatus::Pending {
            plan.start(&*self.inner.clock)?;
            self.persist_status(plan).await?;
        }
        match plan.strategy() {
            MigrationStrategy::Immediate => self.run_immediate(plan, &endpoints, control).await,
            MigrationStrategy::Gradual => self.run_gradual(plan, &endpoints, control).await,
            MigrationStrategy::BlueGreen => self.run_blue_green(plan, &endpoints, control).await,
        }
    }

    fn endpoints(&self, plan: &MigrationPlan) -> ManagerResult<MigrationEndpoints> {
        let view = |name: &ProviderName| -> ManagerResult<DataSet> {
            let live = self
                .live_provider(name)?
                .ok_or_else(|| MigrationError::ProviderUnavailable(name.clone()))?;
            Ok(DataSet::new(
                plan.capability(),
                live.adapter,
                self.inner.settings.calls,
            ))
        };
        Ok(MigrationEndpoints {
            source: view(plan.source())?,
            target: view(plan.target())?,
        })
    }

    async fn run_immediate(
        &self,
        plan: &mut MigrationPlan,
        endpoints: &MigrationEndpoints,
        control: &MigrationControl,
    ) -> ManagerResult<()> {
        let max_pause = self.inner.settings.migration.max_pause;
        let paused = self.inner.router.pause_writes(plan.capability()).await;
        tracing::info!(plan_id = %plan.id(), ?max_pause, "writes paused for immediate migration");
        let passes = async {
            self.inner.engine.backfill(plan, endpoints, control).await?;
            self.inner.engine.remove_orphans(plan, endpoints, control).await?;
            self.enter_verification(plan).await?;
            let rate = self.inner.engine.verify(plan, endpoints, control).await?;
            self.check_threshold(plan, rate)
        };
        match tokio::time::timeout(max_pause, passes).await {
            Ok(outcome) => outcome?,
            Err(_) => return Err(MigrationError::PauseWindowExceeded(max_pause).into()),
        }
        self.cutover(plan).await?;
        drop(paused);
        Ok(())
    }

    async fn run_gradual(
        &self,
        plan: &mut MigrationPlan,
        endpoints: &MigrationEndpoints,
        control: &MigrationControl,
    ) -> ManagerResult<()> {
        let mirror = self.install_mirror(plan, endpoints).await?;
        if plan.status() == MigrationStatus::Running {
            self.inner.engine.backfill(plan, endpoints, control).await?;
            self.inner.engine.remove_orphans(plan, endpoints, control).await?;
            self.enter_verification(plan).await?;
        } else {
            // Resumed while verifying: the earlier pass is discarded.
            plan.reset_verification();
            self.inner.engine.remove_orphans(plan, endpoints, control).await?;
        }
        let rate = self.inner.engine.verify(plan, endpoints, control).await?;
        self.check_threshold(plan, rate)?;
        self.mirrored_cutover(plan, &mirror).await
    }

    async fn run_blue_green(
        &self,
        plan: &mut MigrationPlan,
        endpoints: &MigrationEndpoints,
        control: &MigrationControl,
    ) -> ManagerResult<()> {
        self.inner.engine.backfill(plan, endpoints, control).await?;
        let mirror = self.install_mirror(plan, endpoints).await?;
        self.inner.engine.catch_up(plan, endpoints, control).await?;
        self.enter_verification(plan).await?;
        let rate = self.inner.engine.verify(plan, endpoints, control).await?;
        self.check_threshold(plan, rate)?;
        self.mirrored_cutover(plan, &mirror).await
    }

    async fn install_mirror(
        &self,
        plan: &MigrationPlan,
        endpoints: &MigrationEndpoints,
    ) -> ManagerResult<MirrorHandle> {
        let mirror = MirrorHandle::spawn(
            Arc::clone(endpoints.target.adapter()),
            self.inner.settings.migration.mirror_capacity,
            self.inner.settings.calls,
        );
        let guard = self.inner.router.begin_transition(plan.capability()).await;
        if guard.current()?.state().provider() != Some(plan.source()) {
            return Err(MigrationError::ProviderUnavailable(plan.source().clone()).into());
        }
        guard.install_mirror(mirror.clone())?;
        tracing::info!(
            plan_id = %plan.id(),
            capability = %plan.capability(),
            target_provider = %plan.target(),
            "dual-write mirror installed"
        );
        Ok(mirror)
    }

    async fn mirrored_cutover(
        &self,
        plan: &mut MigrationPlan,
        mirror: &MirrorHandle,
    ) -> ManagerResult<()> {
        let max_pause = self.inner.settings.migration.max_pause;
        let paused = self.inner.router.pause_writes(plan.capability()).await;
        match tokio::time::timeout(max_pause, mirror.flush()).await {
            Ok(true) => {}
            Ok(false) => return Err(MigrationError::MirrorStopped(plan.target().clone()).into()),
            Err(_) => return Err(MigrationError::PauseWindowExceeded(max_pause).into()),
        }
        let stats = mirror.stats();
        if stats.dropped > 0 || stats.failed > 0 {
            tracing::warn!(
                plan_id = %plan.id(),
                dropped = stats.dropped,
                failed = stats.failed,
                "mirror lost writes during migration"
            );
        }
        self.cutover(plan).await?;
        drop(paused);
        Ok(())
    }

    /// Completes the plan and flips the binding to the target.
    ///
    /// The caller holds the write pause, so no write lands on the source
    /// between the last copy and the flip.
    async fn cutover(&self, plan: &mut MigrationPlan) -> ManagerResult<()> {
        let capability = plan.capability();
        let target = self
            .live_provider(plan.target())?
            .filter(|live| live.descriptor.serves(capability))
            .map(|live| live.adapter)
            .ok_or_else(|| MigrationError::ProviderUnavailable(plan.target().clone()))?;

        let guard = self.inner.router.begin_transition(capability).await;
        if guard.current()?.state().provider() != Some(plan.source()) {
            return Err(MigrationError::ProviderUnavailable(plan.source().clone()).into());
        }
        if !self.inner.health.status(plan.target()).is_healthy() {
            return Err(MigrationError::ProviderUnavailable(plan.target().clone()).into());
        }
        let mut completed = plan.clone();
        completed.complete(&*self.inner.clock)?;
        self.inner.migrations.update(&completed).await?;
        guard.bind(
            CapabilityBinding {
                capability,
                provider: completed.target().clone(),
                reason: BindingReason::Migration,
                bound_at: self.inner.clock.utc(),
            },
            target,
        )?;
        drop(guard);
        *plan = completed;

        self.announce_binding(BindingChange {
            capability,
            old: Some(plan.source().clone()),
            new: Some(plan.target().clone()),
            reason: BindingReason::Migration,
        })
        .await;
        self.announce_status(plan);
        tracing::info!(
            plan_id = %plan.id(),
            %capability,
            copied = plan.progress().copied,
            match_rate = ?plan.match_rate().map(|rate| rate.to_string()),
            "migration completed"
        );
        Ok(())
    }

    async fn enter_verification(&self, plan: &mut MigrationPlan) -> Result<(), MigrationError> {
        plan.begin_verification(&*self.inner.clock)?;
        self.inner.migrations.update(plan).await?;
        self.announce_status(plan);
        Ok(())
    }

    fn check_threshold(&self, plan: &MigrationPlan, rate: MatchRate) -> Result<(), MigrationError> {
        let threshold = self.inner.settings.migration.threshold(plan.strategy());
        if rate.meets(threshold) {
            Ok(())
        } else {
            Err(MigrationError::VerificationFailed { rate, threshold })
        }
    }

    async fn persist_status(&self, plan: &MigrationPlan) -> ManagerResult<()> {
        self.inner.migrations.update(plan).await?;
        self.announce_status(plan);
        Ok(())
    }

    /// Publishes the plan's status and wakes anyone waiting on it.
    fn announce_status(&self, plan: &MigrationPlan) {
        let status = plan.status();
        self.inner.events.publish(ControlPlaneEvent::MigrationStatusChanged {
            plan_id: plan.id(),
            status,
        });
        if status.is_terminal() {
            self.inner.events.publish(ControlPlaneEvent::MigrationCompleted {
                plan_id: plan.id(),
                status,
            });
        }
        match self.inner.active.lock() {
            Ok(active) => {
                if let Some(migration) = active
                    .get(&plan.capability())
                    .filter(|migration| migration.id == plan.id())
                {
                    migration.status.send_replace(status);
                }
            }
            Err(err) => tracing::error!(plan_id = %plan.id(), error = %err, "migration registry poisoned"),
        }
    }

    async fn fail_plan(&self, plan: &mut MigrationPlan, err: &ManagerError) {
        let reason = err.to_string();
        tracing::warn!(
            plan_id = %plan.id(),
            capability = %plan.capability(),
            error = %err,
            "migration failed; source stays bound"
        );
        self.detach_mirror(plan).await;
        if let Err(transition) = plan.fail(reason, &*self.inner.clock) {
            tracing::error!(plan_id = %plan.id(), error = %transition, "cannot mark plan failed");
            return;
        }
        if let Err(persist) = self.inner.migrations.update(plan).await {
            tracing::error!(plan_id = %plan.id(), error = %persist, "failed to persist failed plan");
        }
        self.announce_status(plan);
    }

    async fn detach_mirror(&self, plan: &MigrationPlan) {
        let guard = self.inner.router.begin_transition(plan.capability()).await;
        let mirrored = guard
            .current()
            .map(|route| route.mirror().is_some_and(|mirror| mirror.target() == plan.target()));
        match mirrored {
            Ok(true) => {
                if let Err(err) = guard.remove_mirror() {
                    tracing::error!(plan_id = %plan.id(), error = %err, "failed to remove mirror");
                }
            }
            Ok(false) => {}
            Err(err) => tracing::error!(plan_id = %plan.id(), error = %err, "failed to read route"),
        }
    }

    /// Resumes gradual plans that were copying or verifying and fails every
    /// other unfinished plan.
    pub(super) async fn resume_unfinished(&self) -> ManagerResult<()> {
        for mut plan in self.inner.migrations.list_unfinished().await? {
            let resumable = plan.strategy() == MigrationStrategy::Gradual
                && matches!(
                    plan.status(),
                    MigrationStatus::Running | MigrationStatus::Verifying
                );
            if resumable && self.active_id(plan.capability())?.is_none() {
                tracing::info!(
                    plan_id = %plan.id(),
                    status = %plan.status(),
                    cursor = ?plan.cursor(),
                    "resuming migration"
                );
                let control = MigrationControl::new();
                self.register_active(&plan, control.clone())?;
                self.spawn_driver(plan, control)?;
                continue;
            }
            tracing::warn!(plan_id = %plan.id(), status = %plan.status(), "failing interrupted migration");
            plan.fail(INTERRUPTED_BY_RESTART, &*self.inner.clock)?;
            self.inner.migrations.update(&plan).await?;
            self.announce_status(&plan);
        }
        Ok(())
    }
}
