//! Reaction to health transitions.
//!
//! An unhealthy provider loses every capability bound to it to the next
//! healthy provider by priority, and every migration it takes part in is
//! aborted. A provider becoming healthy again only rescues capabilities
//! left without any healthy provider; bindings never fail back on their own.

use super::error::ManagerResult;
use super::manager::BackendManager;
use crate::health::domain::{HealthStatus, HealthTransition};
use crate::manager::ports::ProviderCatalogRepository;
use crate::migration::ports::MigrationRepository;
use crate::provider::domain::Capability;
use crate::routing::domain::{BindingReason, BindingState};
use mockable::Clock;

impl<R, P, C> BackendManager<R, P, C>
where
    R: MigrationRepository + 'static,
    P: ProviderCatalogRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    pub(super) async fn handle_transition(&self, transition: &HealthTransition) -> ManagerResult<()> {
        match transition.new {
            HealthStatus::Unhealthy => self.fail_over_from(transition).await,
            HealthStatus::Healthy => self.recover_degraded().await,
            HealthStatus::Unknown | HealthStatus::Degraded => Ok(()),
        }
    }

    async fn fail_over_from(&self, transition: &HealthTransition) -> ManagerResult<()> {
        let provider = &transition.provider;
        self.cancel_migrations_using(provider, &format!("provider {provider} became unhealthy"))?;
        let providers = self.provider_table()?;
        for capability in self.inner.router.capabilities_bound_to(provider)? {
            let guard = self.inner.router.begin_transition(capability).await;
            // Re-read under the guard; a concurrent transition may have won.
            if guard.current()?.state().provider() != Some(provider) {
                continue;
            }
            let change = self.rebind_best(
                &guard,
                &providers,
                Some(provider.clone()),
                BindingReason::Failover,
            )?;
            drop(guard);
            if let Some(binding_change) = change {
                tracing::warn!(
                    %capability,
                    from = %provider,
                    to = ?binding_change.new.as_ref().map(ToString::to_string),
                    "capability failed over"
                );
                self.announce_binding(binding_change).await;
            }
        }
        Ok(())
    }

    async fn recover_degraded(&self) -> ManagerResult<()> {
        let providers = self.provider_table()?;
        let degraded: Vec<Capability> = self
            .inner
            .router
            .bindings()?
            .into_iter()
            .filter(|(_, state)| state.is_degraded())
            .map(|(capability, _)| capability)
            .collect();
        for capability in degraded {
            let guard = self.inner.router.begin_transition(capability).await;
            let route = guard.current()?;
            let previous = match route.state() {
                BindingState::NoHealthyProvider { previous, .. } => {
                    previous.clone()
                }
                _ => continue,
            };
            let change =
                self.rebind_best(&guard, &providers, previous, BindingReason::Recovery)?;
            drop(guard);
            if let Some(binding_change) = change {
                self.announce_binding(binding_change).await;
            }
        }
        Ok(())
    }
}
