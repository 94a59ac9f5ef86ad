//! Subscription Fan-Out Integration Tests
//!
//! Exercises the subscription manager and service together the way the
//! feed supervisor and delivery surfaces drive them.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use trading_gateway::application::services::{FeedControl, SubscribeRequest, SubscriptionService};
use trading_gateway::domain::error::GatewayError;
use trading_gateway::domain::streaming::{Symbol, Tick, TickPayload};
use trading_gateway::domain::subscription::{
    ConsumerId, Delivery, EndReason, OverflowPolicy, SubscriptionConfig, SubscriptionManager,
    SubscriptionState,
};

// =============================================================================
// Helpers
// =============================================================================

fn sym(code: &str) -> Symbol {
    Symbol::parse(code).unwrap()
}

fn tick(code: &str, sequence: u64) -> Tick {
    Tick::new(
        sym(code),
        sequence,
        TickPayload {
            last_price: Decimal::new(1250 + i64::try_from(sequence).unwrap(), 2),
            ..TickPayload::default()
        },
    )
}

fn manager(capacity: usize) -> Arc<SubscriptionManager> {
    Arc::new(SubscriptionManager::new(SubscriptionConfig {
        queue_capacity: capacity,
        ..SubscriptionConfig::default()
    }))
}

fn service(manager: &Arc<SubscriptionManager>) -> SubscriptionService {
    SubscriptionService::new(
        Arc::clone(manager),
        Arc::new(FeedControl::new()),
        Duration::from_millis(50),
    )
}

fn sequences(deliveries: &[Delivery]) -> Vec<u64> {
    deliveries
        .iter()
        .filter_map(|d| d.tick().map(|t| t.sequence))
        .collect()
}

fn drain(handle: &trading_gateway::domain::subscription::SubscriptionHandle) -> Vec<Delivery> {
    std::iter::from_fn(|| handle.try_dequeue()).collect()
}

// =============================================================================
// Fan-Out
// =============================================================================

#[tokio::test]
async fn every_subscriber_sees_every_tick_in_order() {
    let manager = manager(100);
    let a = manager
        .subscribe(ConsumerId::new("a"), [sym("000001.SZ")])
        .unwrap();
    let b = manager
        .subscribe(ConsumerId::new("b"), [sym("000001.SZ"), sym("000002.SZ")])
        .unwrap();

    for seq in 1..=5 {
        manager.publish(tick("000001.SZ", seq));
    }
    manager.publish(tick("000002.SZ", 1));

    assert_eq!(sequences(&drain(&a.handle)), vec![1, 2, 3, 4, 5]);
    let b_deliveries = drain(&b.handle);
    assert_eq!(b_deliveries.len(), 6);
    assert_eq!(
        b_deliveries.last().and_then(Delivery::tick).unwrap().symbol,
        sym("000002.SZ")
    );
}

#[tokio::test]
async fn slow_consumer_does_not_affect_fast_one() {
    let manager = manager(3);
    let slow = manager
        .subscribe_with(
            ConsumerId::new("slow"),
            [sym("AAPL")],
            trading_gateway::domain::subscription::SubscribeOptions {
                overflow_policy: Some(OverflowPolicy::DropOldest),
                strict: false,
            },
        )
        .unwrap();
    let fast = manager
        .subscribe(ConsumerId::new("fast"), [sym("AAPL")])
        .unwrap();

    let mut fast_seen = Vec::new();
    for seq in 1..=10 {
        manager.publish(tick("AAPL", seq));
        let delivery = fast.handle.dequeue(Duration::from_millis(100)).await.unwrap();
        fast_seen.push(delivery.tick().unwrap().sequence);
    }

    assert_eq!(fast_seen, (1..=10).collect::<Vec<_>>());
    assert_eq!(fast.handle.dropped_count(), 0);

    let slow_deliveries = drain(&slow.handle);
    assert_eq!(sequences(&slow_deliveries), vec![8, 9, 10]);
    assert_eq!(slow.handle.dropped_count(), 7);
}

#[tokio::test]
async fn drop_newest_keeps_the_head_of_the_burst() {
    let manager = manager(2);
    let sub = manager
        .subscribe_with(
            ConsumerId::new("a"),
            [sym("AAPL")],
            trading_gateway::domain::subscription::SubscribeOptions {
                overflow_policy: Some(OverflowPolicy::DropNewest),
                strict: false,
            },
        )
        .unwrap();

    for seq in 1..=4 {
        manager.publish(tick("AAPL", seq));
    }

    assert_eq!(sequences(&drain(&sub.handle)), vec![1, 2]);
    assert_eq!(sub.handle.dropped_count(), 2);
}

#[tokio::test]
async fn gap_after_overflow_is_reported() {
    let manager = manager(2);
    let sub = manager
        .subscribe(ConsumerId::new("a"), [sym("AAPL")])
        .unwrap();

    manager.publish(tick("AAPL", 1));
    assert_eq!(sequences(&drain(&sub.handle)), vec![1]);

    for seq in 2..=5 {
        manager.publish(tick("AAPL", seq));
    }

    let deliveries = drain(&sub.handle);
    let Delivery::Tick { tick, missed } = &deliveries[0] else {
        panic!("expected a tick");
    };
    assert_eq!(tick.sequence, 4);
    assert_eq!(*missed, 2);
}

#[tokio::test]
async fn unsubscribe_releases_waiting_consumer() {
    let manager = manager(10);
    let sub = manager
        .subscribe(ConsumerId::new("a"), [sym("AAPL")])
        .unwrap();
    let handle = sub.handle.clone();

    let waiter = tokio::spawn(async move { handle.dequeue(Duration::from_secs(5)).await });
    tokio::task::yield_now().await;

    assert!(manager.unsubscribe(sub.handle.id()).was_removed());

    let delivery = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(delivery, Delivery::EndOfStream(EndReason::Unsubscribed));
}

#[tokio::test]
async fn feed_loss_marks_stale_and_ends_streams() {
    let manager = manager(10);
    let sub = manager
        .subscribe(ConsumerId::new("a"), [sym("AAPL")])
        .unwrap();
    manager.publish(tick("AAPL", 1));

    let loss = manager.feed_lost();
    assert_eq!(loss.affected, 1);
    assert!(loss.changes.unsubscribe.contains(&sym("AAPL")));
    assert_eq!(sub.handle.state(), SubscriptionState::Stale);

    // Already queued ticks drain before the end marker.
    let deliveries = drain(&sub.handle);
    assert_eq!(sequences(&deliveries), vec![1]);
    assert_eq!(
        deliveries.last(),
        Some(&Delivery::EndOfStream(EndReason::FeedLost))
    );

    // Nothing reaches a stale subscription.
    let report = manager.publish(tick("AAPL", 2));
    assert_eq!(report.matched, 0);
}

// =============================================================================
// Service
// =============================================================================

#[tokio::test]
async fn service_subscribe_is_idempotent_per_consumer_and_symbols() {
    let manager = manager(10);
    let service = service(&manager);
    let request = SubscribeRequest {
        consumer: Some("dashboard".into()),
        symbols: vec!["AAPL".into(), "MSFT".into()],
        ..SubscribeRequest::default()
    };

    let first = service.subscribe(request.clone()).unwrap();
    let second = service.subscribe(request.clone()).unwrap();
    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.handle.id(), second.handle.id());
    assert_eq!(service.stats().subscription_count, 1);

    let strict = service.subscribe(SubscribeRequest {
        strict: true,
        ..request
    });
    assert!(matches!(strict, Err(GatewayError::AlreadyExists(_))));
}

#[tokio::test]
async fn service_next_delivers_published_tick() {
    let manager = manager(10);
    let service = service(&manager);
    let subscribed = service
        .subscribe(SubscribeRequest {
            consumer: Some("puller".into()),
            symbols: vec!["AAPL".into()],
            ..SubscribeRequest::default()
        })
        .unwrap();

    let publisher = Arc::clone(&manager);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        publisher.publish(tick("AAPL", 7));
    });

    let delivery = service
        .next(subscribed.handle.id(), Some(Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(delivery.tick().unwrap().sequence, 7);
}

#[tokio::test]
async fn subscription_cap_is_enforced() {
    let manager = Arc::new(SubscriptionManager::new(SubscriptionConfig {
        max_subscriptions: 2,
        ..SubscriptionConfig::default()
    }));
    manager.subscribe(ConsumerId::new("a"), [sym("AAPL")]).unwrap();
    manager.subscribe(ConsumerId::new("b"), [sym("AAPL")]).unwrap();

    let third = manager.subscribe(ConsumerId::new("c"), [sym("AAPL")]);
    assert!(matches!(third, Err(GatewayError::LimitExceeded(_))));
}
