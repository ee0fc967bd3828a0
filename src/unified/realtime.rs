//! Publish/subscribe facade.
//!
//! Subscriptions live on the provider that accepted them. They are not
//! carried over when the capability moves; callers re-subscribe after a
//! `BindingChanged` event for `realtime`.

use super::{error::ServiceResult, gateway::Gateway};
use crate::provider::domain::{Capability, Subscription, SubscriptionHandler, Topic};
use serde_json::Value;
use std::sync::Arc;

/// Publish/subscribe through the provider bound to `realtime`.
#[derive(Clone)]
pub struct RealtimeService {
    gateway: Gateway,
}

impl RealtimeService {
    pub(super) const fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Registers `handler` for messages on `topic`.
    ///
    /// # Errors
    ///
    /// Returns a routing or provider error.
    pub async fn subscribe(
        &self,
        topic: &Topic,
        handler: SubscriptionHandler,
    ) -> ServiceResult<Subscription> {
        self.gateway
            .read(Capability::Realtime, "subscribe", |adapter| {
                let callback = Arc::clone(&handler);
                async move { adapter.subscribe(topic, callback).await }
            })
            .await
    }

    /// Cancels a subscription on the currently bound provider.
    ///
    /// # Errors
    ///
    /// Returns a routing or provider error.
    pub async fn unsubscribe(&self, subscription: &Subscription) -> ServiceResult<()> {
        self.gateway
            .read(Capability::Realtime, "unsubscribe", |adapter| async move {
                adapter.unsubscribe(subscription).await
            })
            .await
    }

    /// Publishes `payload` on `topic`.
    ///
    /// # Errors
    ///
    /// Returns a routing or provider error.
    pub async fn publish(&self, topic: &Topic, payload: Value) -> ServiceResult<()> {
        self.gateway
            .write(Capability::Realtime, "publish", |adapter| {
                let message = payload.clone();
                async move { adapter.publish(topic, message).await }
            })
            .await
    }
}
