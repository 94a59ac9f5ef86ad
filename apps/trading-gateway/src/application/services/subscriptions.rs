//! Subscription Service
//!
//! Thin glue between the delivery surfaces and the
//! [`SubscriptionManager`]: parses raw symbols, records metrics, and tells
//! the feed supervisor when the set of upstream symbols changed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::domain::error::GatewayError;
use crate::domain::streaming::Symbol;
use crate::domain::subscription::{
    ConsumerId, Delivery, OverflowPolicy, SubscribeOptions, Subscribed, SubscriptionChanges,
    SubscriptionHandle, SubscriptionId, SubscriptionInfo, SubscriptionManager, SubscriptionStats,
    Unsubscribed,
};
use crate::infrastructure::metrics;

/// Wakes the feed supervisor when upstream interest changes.
///
/// The supervisor re-reads the active symbol set on every wake-up, so
/// several changes between two wake-ups collapse into one reconcile.
#[derive(Debug, Default)]
pub struct FeedControl {
    notify: Notify,
}

impl FeedControl {
    /// Create a control handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal that upstream interest changed.
    pub fn changed(&self) {
        self.notify.notify_one();
    }

    /// Wait for the next change signal.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}

/// A raw subscribe request from a delivery surface.
#[derive(Debug, Clone, Default)]
pub struct SubscribeRequest {
    /// Requesting consumer; a fresh id is generated when absent.
    pub consumer: Option<String>,
    /// Raw symbols.
    pub symbols: Vec<String>,
    /// Per-subscription overflow policy override.
    pub overflow_policy: Option<OverflowPolicy>,
    /// Fail instead of returning an existing identical subscription.
    pub strict: bool,
    /// Subscribe to every symbol; `symbols` must then be empty.
    pub whole_market: bool,
}

/// Subscription operations for the delivery surfaces.
#[derive(Debug)]
pub struct SubscriptionService {
    manager: Arc<SubscriptionManager>,
    feed: Arc<FeedControl>,
    default_timeout: Duration,
}

impl SubscriptionService {
    /// Create a service over a shared manager.
    #[must_use]
    pub const fn new(
        manager: Arc<SubscriptionManager>,
        feed: Arc<FeedControl>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            manager,
            feed,
            default_timeout,
        }
    }

    /// The underlying manager.
    #[must_use]
    pub const fn manager(&self) -> &Arc<SubscriptionManager> {
        &self.manager
    }

    /// Default pull timeout.
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Parse raw symbols and subscribe.
    ///
    /// # Errors
    ///
    /// `Validation` for a malformed or empty symbol list, plus everything
    /// [`SubscriptionManager::subscribe_with`] returns.
    pub fn subscribe(&self, request: SubscribeRequest) -> Result<Subscribed, GatewayError> {
        let symbols = request
            .symbols
            .iter()
            .map(|raw| Symbol::parse(raw))
            .collect::<Result<Vec<_>, _>>()?;
        let consumer = request
            .consumer
            .map_or_else(ConsumerId::generate, ConsumerId::new);

        let options = SubscribeOptions {
            overflow_policy: request.overflow_policy,
            strict: request.strict,
        };

        let subscribed = if request.whole_market {
            if !symbols.is_empty() {
                return Err(GatewayError::validation(
                    "whole-market subscription takes no symbols",
                ));
            }
            self.manager.subscribe_whole_market(consumer, options)?
        } else {
            self.manager.subscribe_with(consumer, symbols, options)?
        };

        if subscribed.created {
            metrics::record_subscription_created();
            tracing::info!(
                subscription_id = %subscribed.handle.id(),
                consumer = %subscribed.handle.consumer(),
                "Subscription created"
            );
        }
        self.after_change(&subscribed.changes);
        Ok(subscribed)
    }

    /// Remove a subscription. Unknown ids are a reported no-op.
    pub fn unsubscribe(&self, id: &SubscriptionId) -> Unsubscribed {
        let result = self.manager.unsubscribe(id);
        if let Unsubscribed::Removed { changes } = &result {
            metrics::record_subscription_removed(1);
            tracing::info!(subscription_id = %id, "Subscription removed");
            self.after_change(changes);
        }
        result
    }

    /// Remove every subscription owned by `consumer`.
    pub fn consumer_disconnected(&self, consumer: &ConsumerId) {
        let before = self.manager.stats().subscription_count;
        let changes = self.manager.consumer_disconnected(consumer);
        let removed = before.saturating_sub(self.manager.stats().subscription_count);
        if removed > 0 {
            metrics::record_subscription_removed(removed);
            tracing::info!(consumer = %consumer, removed, "Consumer disconnected");
        }
        self.after_change(&changes);
    }

    /// Pull the next delivery, waiting up to `timeout` (or the default).
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown subscription and `Timeout` when nothing
    /// arrives in time.
    pub async fn next(
        &self,
        id: &SubscriptionId,
        timeout: Option<Duration>,
    ) -> Result<Delivery, GatewayError> {
        let handle = self.handle(id)?;
        let delivery = handle.dequeue(timeout.unwrap_or(self.default_timeout)).await?;
        if delivery.tick().is_some() {
            metrics::record_tick_delivered();
        }
        Ok(delivery)
    }

    /// Handle for a subscription.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown subscription.
    pub fn handle(&self, id: &SubscriptionId) -> Result<SubscriptionHandle, GatewayError> {
        self.manager
            .handle(id)
            .ok_or_else(|| GatewayError::subscription_not_found(id.as_str()))
    }

    /// Snapshot of one subscription.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown subscription.
    pub fn info(&self, id: &SubscriptionId) -> Result<SubscriptionInfo, GatewayError> {
        self.manager
            .info(id)
            .ok_or_else(|| GatewayError::subscription_not_found(id.as_str()))
    }

    /// Snapshots of all subscriptions.
    #[must_use]
    pub fn list(&self) -> Vec<SubscriptionInfo> {
        self.manager.list()
    }

    /// Aggregate counts.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        self.manager.stats()
    }

    fn after_change(&self, changes: &SubscriptionChanges) {
        metrics::set_active_subscriptions(self.manager.stats().active_count);
        if !changes.is_empty() {
            self.feed.changed();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::subscription::{EndReason, SubscriptionConfig};

    fn service() -> SubscriptionService {
        SubscriptionService::new(
            Arc::new(SubscriptionManager::new(SubscriptionConfig::default())),
            Arc::new(FeedControl::new()),
            Duration::from_millis(50),
        )
    }

    fn request(consumer: &str, symbols: &[&str]) -> SubscribeRequest {
        SubscribeRequest {
            consumer: Some(consumer.into()),
            symbols: symbols.iter().map(ToString::to_string).collect(),
            ..SubscribeRequest::default()
        }
    }

    #[test]
    fn malformed_symbol_is_rejected() {
        let err = service().subscribe(request("a", &["OK", "bad symbol"])).unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[tokio::test]
    async fn first_subscriber_wakes_feed() {
        let service = service();
        service.subscribe(request("a", &["AAPL"])).unwrap();

        // notify_one stores a permit, so the wait completes immediately.
        tokio::time::timeout(Duration::from_millis(100), service.feed.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn next_on_unknown_subscription_is_not_found() {
        let err = service()
            .next(&SubscriptionId::from("sub_missing"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotFound { .. }));
    }

    #[tokio::test]
    async fn next_times_out_without_data() {
        let service = service();
        let subscribed = service.subscribe(request("a", &["AAPL"])).unwrap();
        let err = service
            .next(subscribed.handle.id(), Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Timeout(_)));
    }

    #[test]
    fn consumer_disconnect_removes_all_its_subscriptions() {
        let service = service();
        let a1 = service.subscribe(request("a", &["AAPL"])).unwrap();
        service.subscribe(request("a", &["MSFT"])).unwrap();
        service.subscribe(request("b", &["AAPL"])).unwrap();

        service.consumer_disconnected(&ConsumerId::new("a"));

        assert_eq!(service.stats().subscription_count, 1);
        assert!(matches!(
            a1.handle.try_dequeue(),
            Some(Delivery::EndOfStream(EndReason::Unsubscribed))
        ));
    }

    #[test]
    fn whole_market_request_rejects_symbols() {
        let service = SubscriptionService::new(
            Arc::new(SubscriptionManager::new(SubscriptionConfig {
                whole_market_enabled: true,
                ..SubscriptionConfig::default()
            })),
            Arc::new(FeedControl::new()),
            Duration::from_millis(50),
        );
        let err = service
            .subscribe(SubscribeRequest {
                whole_market: true,
                ..request("a", &["AAPL"])
            })
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));

        let subscribed = service
            .subscribe(SubscribeRequest {
                whole_market: true,
                ..request("a", &[])
            })
            .unwrap();
        assert!(subscribed.handle.is_whole_market());
    }

    #[test]
    fn unsubscribe_twice_is_a_no_op() {
        let service = service();
        let subscribed = service.subscribe(request("a", &["AAPL"])).unwrap();
        assert!(service.unsubscribe(subscribed.handle.id()).was_removed());
        assert!(!service.unsubscribe(subscribed.handle.id()).was_removed());
    }
}
