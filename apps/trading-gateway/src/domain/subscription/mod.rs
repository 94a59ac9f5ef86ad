//! Subscription Management
//!
//! Fans ticks from the single upstream feed out to many independent
//! subscriber queues.
//!
//! # Design
//!
//! The manager tracks:
//! - Every subscription by id, plus a symbol index used by `publish`
//! - An idempotency key of (consumer, symbol set) per subscription
//! - Which symbols have at least one active subscriber, so the feed
//!   only carries what someone is listening to
//! - Whole-market subscriptions, which receive every published tick
//!
//! Stale subscriptions (left behind by a lost feed) stay visible until they
//! are replaced, unsubscribed, or reaped to make room under the cap.
//!
//! The index sits behind one `RwLock`. `publish` holds the read lock only
//! long enough to collect matching queues; the pushes happen afterwards on
//! each queue's own lock, so a slow consumer never serializes the feed.
//! Unsubscribe closes the queue before returning, and a closed queue
//! refuses pushes, which makes unsubscription race-free against a publish
//! that already collected its targets.

pub mod queue;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

pub use queue::{Delivery, EndReason, OverflowPolicy, PushOutcome, TickQueue, TickSink};

use crate::domain::error::GatewayError;
use crate::domain::streaming::{SharedTick, Symbol};

// =============================================================================
// Identifiers
// =============================================================================

/// Identity of a consumer (a WebSocket connection, a REST client, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConsumerId(String);

impl ConsumerId {
    /// Create a consumer id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a unique consumer id.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("consumer_{}", uuid::Uuid::new_v4().simple()))
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConsumerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Opaque subscription identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    fn generate() -> Self {
        Self(format!("sub_{}", uuid::Uuid::new_v4().simple()))
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriptionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Receiving ticks.
    Active,
    /// The feed was lost; the queue is closed with an end-of-stream marker.
    Stale,
    /// Unsubscribed.
    Cancelled,
}

// =============================================================================
// Configuration
// =============================================================================

/// Limits and defaults for the subscription manager.
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionConfig {
    /// Capacity of each subscriber queue.
    pub queue_capacity: usize,
    /// Maximum number of registered subscriptions.
    pub max_subscriptions: usize,
    /// Policy used when a subscribe request does not pick one.
    pub overflow_policy: OverflowPolicy,
    /// Accept whole-market subscriptions.
    pub whole_market_enabled: bool,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            max_subscriptions: 100,
            overflow_policy: OverflowPolicy::DropOldest,
            whole_market_enabled: false,
        }
    }
}

/// Per-request subscribe options.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscribeOptions {
    /// Override the default overflow policy.
    pub overflow_policy: Option<OverflowPolicy>,
    /// Fail with `AlreadyExists` instead of returning the existing handle.
    pub strict: bool,
}

// =============================================================================
// Subscription Changes
// =============================================================================

/// Changes to upstream subscriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionChanges {
    /// Symbols that gained their first subscriber.
    pub subscribe: HashSet<Symbol>,
    /// Symbols that lost their last subscriber.
    pub unsubscribe: HashSet<Symbol>,
    /// `Some(true)` when the first whole-market subscriber arrived,
    /// `Some(false)` when the last one left.
    pub whole_market: Option<bool>,
}

impl SubscriptionChanges {
    /// Check if there are any changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribe.is_empty() && self.unsubscribe.is_empty() && self.whole_market.is_none()
    }

    /// Fold later changes into these.
    pub fn merge(&mut self, later: Self) {
        self.subscribe.extend(later.subscribe);
        self.unsubscribe.extend(later.unsubscribe);
        if later.whole_market.is_some() {
            self.whole_market = later.whole_market;
        }
    }
}

// =============================================================================
// Subscription and Handle
// =============================================================================

#[derive(Debug)]
struct Subscription {
    id: SubscriptionId,
    consumer: ConsumerId,
    symbols: BTreeSet<Symbol>,
    whole_market: bool,
    queue: TickQueue,
    state: RwLock<SubscriptionState>,
    created_at: DateTime<Utc>,
}

impl Subscription {
    fn state(&self) -> SubscriptionState {
        *self.state.read()
    }

    fn info(&self) -> SubscriptionInfo {
        SubscriptionInfo {
            id: self.id.clone(),
            consumer: self.consumer.clone(),
            symbols: self.symbols.iter().cloned().collect(),
            whole_market: self.whole_market,
            state: self.state(),
            overflow_policy: self.queue.policy(),
            capacity: self.queue.capacity(),
            queued: self.queue.len(),
            delivered: self.queue.delivered_count(),
            dropped: self.queue.dropped_count(),
            created_at: self.created_at,
        }
    }
}

/// Consumer-side handle to a subscription.
///
/// Clones refer to the same queue.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    inner: Arc<Subscription>,
}

impl SubscriptionHandle {
    /// Subscription id.
    #[must_use]
    pub fn id(&self) -> &SubscriptionId {
        &self.inner.id
    }

    /// Consumer that owns the subscription.
    #[must_use]
    pub fn consumer(&self) -> &ConsumerId {
        &self.inner.consumer
    }

    /// Subscribed symbols; empty for a whole-market subscription.
    #[must_use]
    pub fn symbols(&self) -> &BTreeSet<Symbol> {
        &self.inner.symbols
    }

    /// Whether the subscription receives every symbol.
    #[must_use]
    pub fn is_whole_market(&self) -> bool {
        self.inner.whole_market
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        self.inner.state()
    }

    /// Ticks lost to overflow.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.inner.queue.dropped_count()
    }

    /// Pull the next delivery, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Timeout`] when nothing arrives in time.
    pub async fn dequeue(&self, timeout: Duration) -> Result<Delivery, GatewayError> {
        self.inner.queue.dequeue(timeout).await
    }

    /// Pull the next delivery without waiting.
    #[must_use]
    pub fn try_dequeue(&self) -> Option<Delivery> {
        self.inner.queue.try_dequeue()
    }

    /// Snapshot of the subscription.
    #[must_use]
    pub fn info(&self) -> SubscriptionInfo {
        self.inner.info()
    }
}

impl PartialEq for SubscriptionHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for SubscriptionHandle {}

/// Serializable snapshot of a subscription.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionInfo {
    /// Subscription id.
    pub id: SubscriptionId,
    /// Owning consumer.
    pub consumer: ConsumerId,
    /// Subscribed symbols, sorted.
    pub symbols: Vec<Symbol>,
    /// Receives every symbol.
    pub whole_market: bool,
    /// Lifecycle state.
    pub state: SubscriptionState,
    /// Overflow policy.
    pub overflow_policy: OverflowPolicy,
    /// Queue capacity.
    pub capacity: usize,
    /// Currently queued ticks.
    pub queued: usize,
    /// Ticks delivered to the consumer.
    pub delivered: u64,
    /// Ticks dropped by overflow.
    pub dropped: u64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Operation Results
// =============================================================================

/// Result of a subscribe call.
#[derive(Debug, Clone)]
pub struct Subscribed {
    /// Handle to the (new or existing) subscription.
    pub handle: SubscriptionHandle,
    /// Whether a new subscription was created.
    pub created: bool,
    /// Upstream changes caused by this call.
    pub changes: SubscriptionChanges,
}

/// Result of an unsubscribe call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unsubscribed {
    /// The subscription was removed.
    Removed {
        /// Upstream changes caused by the removal.
        changes: SubscriptionChanges,
    },
    /// Nothing to do: the id was unknown or already removed.
    NotFound,
}

impl Unsubscribed {
    /// Whether a subscription was actually removed.
    #[must_use]
    pub const fn was_removed(&self) -> bool {
        matches!(self, Self::Removed { .. })
    }
}

/// Result of a publish call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscriptions interested in the symbol.
    pub matched: usize,
    /// Queues that accepted the tick.
    pub accepted: usize,
    /// Ticks lost to overflow across all matched queues.
    pub dropped: usize,
}

/// Result of marking the feed as lost.
#[derive(Debug, Clone, Default)]
pub struct FeedLoss {
    /// Subscriptions moved to `Stale`.
    pub affected: usize,
    /// Upstream symbols that no longer have subscribers.
    pub changes: SubscriptionChanges,
}

// =============================================================================
// Subscription Index
// =============================================================================

type SubscriptionKey = (ConsumerId, BTreeSet<Symbol>);

#[derive(Debug, Default)]
struct SubscriptionIndex {
    subscriptions: HashMap<SubscriptionId, Arc<Subscription>>,
    by_symbol: HashMap<Symbol, Vec<Arc<Subscription>>>,
    whole_market: Vec<Arc<Subscription>>,
    by_key: HashMap<SubscriptionKey, SubscriptionId>,
}

impl SubscriptionIndex {
    fn active_count(&self) -> usize {
        self.subscriptions
            .values()
            .filter(|s| s.state() == SubscriptionState::Active)
            .count()
    }

    fn attach_symbols(&mut self, sub: &Arc<Subscription>, changes: &mut SubscriptionChanges) {
        if sub.whole_market {
            if self.whole_market.is_empty() {
                changes.whole_market = Some(true);
            }
            self.whole_market.push(Arc::clone(sub));
        }
        for symbol in &sub.symbols {
            let subs = self.by_symbol.entry(symbol.clone()).or_default();
            if subs.is_empty() {
                changes.subscribe.insert(symbol.clone());
            }
            subs.push(Arc::clone(sub));
        }
    }

    fn detach_symbols(&mut self, sub: &Subscription, changes: &mut SubscriptionChanges) {
        if sub.whole_market {
            let before = self.whole_market.len();
            self.whole_market.retain(|s| s.id != sub.id);
            if before != self.whole_market.len() && self.whole_market.is_empty() {
                changes.whole_market = Some(false);
            }
        }
        for symbol in &sub.symbols {
            let Some(subs) = self.by_symbol.get_mut(symbol) else {
                continue;
            };
            subs.retain(|s| s.id != sub.id);
            if subs.is_empty() {
                self.by_symbol.remove(symbol);
                changes.unsubscribe.insert(symbol.clone());
            }
        }
    }

    fn remove(&mut self, id: &SubscriptionId) -> Option<(Arc<Subscription>, SubscriptionChanges)> {
        let sub = self.subscriptions.remove(id)?;
        let key = (sub.consumer.clone(), sub.symbols.clone());
        if self.by_key.get(&key) == Some(id) {
            self.by_key.remove(&key);
        }
        let mut changes = SubscriptionChanges::default();
        self.detach_symbols(&sub, &mut changes);
        Some((sub, changes))
    }

    /// Drop every subscription that is no longer active.
    fn reap_inactive(&mut self) -> Vec<Arc<Subscription>> {
        let ids: Vec<SubscriptionId> = self
            .subscriptions
            .values()
            .filter(|s| s.state() != SubscriptionState::Active)
            .map(|s| s.id.clone())
            .collect();
        ids.iter()
            .filter_map(|id| self.remove(id))
            .map(|(sub, _)| sub)
            .collect()
    }
}

// =============================================================================
// Subscription Manager
// =============================================================================

/// Registers subscriptions and fans published ticks out to their queues.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use trading_gateway::domain::streaming::{Symbol, Tick, TickPayload};
/// use trading_gateway::domain::subscription::{ConsumerId, SubscriptionManager};
///
/// # async fn example() {
/// let manager = SubscriptionManager::default();
/// let aapl = Symbol::parse("AAPL").unwrap();
///
/// let sub = manager
///     .subscribe(ConsumerId::new("a"), [aapl.clone()])
///     .unwrap();
/// manager.publish(Tick::new(aapl, 1, TickPayload::default()));
///
/// let delivery = sub.handle.dequeue(Duration::from_secs(1)).await.unwrap();
/// assert_eq!(delivery.tick().unwrap().sequence, 1);
/// # }
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    config: SubscriptionConfig,
    index: RwLock<SubscriptionIndex>,
}

impl SubscriptionManager {
    /// Create a manager with the given limits.
    #[must_use]
    pub fn new(config: SubscriptionConfig) -> Self {
        Self {
            config,
            index: RwLock::new(SubscriptionIndex::default()),
        }
    }

    /// Manager configuration.
    #[must_use]
    pub const fn config(&self) -> &SubscriptionConfig {
        &self.config
    }

    /// Subscribe a consumer to a set of symbols with default options.
    ///
    /// A repeated request for the same (consumer, symbol set) returns the
    /// existing handle.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty symbol set and
    /// `LimitExceeded` when the subscription cap is reached.
    pub fn subscribe(
        &self,
        consumer: ConsumerId,
        symbols: impl IntoIterator<Item = Symbol>,
    ) -> Result<Subscribed, GatewayError> {
        self.subscribe_with(consumer, symbols, SubscribeOptions::default())
    }

    /// Subscribe with explicit options.
    ///
    /// # Errors
    ///
    /// As [`Self::subscribe`], plus `AlreadyExists` for a strict duplicate.
    pub fn subscribe_with(
        &self,
        consumer: ConsumerId,
        symbols: impl IntoIterator<Item = Symbol>,
        options: SubscribeOptions,
    ) -> Result<Subscribed, GatewayError> {
        let symbols: BTreeSet<Symbol> = symbols.into_iter().collect();
        if symbols.is_empty() {
            return Err(GatewayError::validation(
                "subscription requires at least one symbol",
            ));
        }
        self.register(consumer, symbols, false, options)
    }

    /// Subscribe a consumer to every symbol the feed carries.
    ///
    /// Idempotent per consumer, like [`Self::subscribe`].
    ///
    /// # Errors
    ///
    /// Returns a validation error when whole-market subscriptions are
    /// disabled, otherwise as [`Self::subscribe_with`].
    pub fn subscribe_whole_market(
        &self,
        consumer: ConsumerId,
        options: SubscribeOptions,
    ) -> Result<Subscribed, GatewayError> {
        if !self.config.whole_market_enabled {
            return Err(GatewayError::validation(
                "whole-market subscriptions are disabled",
            ));
        }
        self.register(consumer, BTreeSet::new(), true, options)
    }

    fn register(
        &self,
        consumer: ConsumerId,
        symbols: BTreeSet<Symbol>,
        whole_market: bool,
        options: SubscribeOptions,
    ) -> Result<Subscribed, GatewayError> {
        // Whole-market subscriptions key on the empty set, which a symbol
        // subscription can never have.
        let key = (consumer, symbols);
        let mut retired = Vec::new();
        let result = {
            let mut index = self.index.write();

            let existing = index
                .by_key
                .get(&key)
                .and_then(|id| index.subscriptions.get(id))
                .cloned();

            if let Some(existing) = existing {
                if existing.state() == SubscriptionState::Active {
                    if options.strict {
                        return Err(GatewayError::AlreadyExists(format!(
                            "consumer {} already subscribed as {}",
                            key.0, existing.id
                        )));
                    }
                    return Ok(Subscribed {
                        handle: SubscriptionHandle { inner: existing },
                        created: false,
                        changes: SubscriptionChanges::default(),
                    });
                }
                // A stale subscription with the same key is replaced.
                retired.extend(index.remove(&existing.id).map(|(sub, _)| sub));
            }

            if index.subscriptions.len() >= self.config.max_subscriptions {
                retired.extend(index.reap_inactive());
            }
            if index.subscriptions.len() >= self.config.max_subscriptions {
                return Err(GatewayError::LimitExceeded(format!(
                    "maximum of {} subscriptions reached",
                    self.config.max_subscriptions
                )));
            }

            let (consumer, symbols) = key;
            let sub = Arc::new(Subscription {
                id: SubscriptionId::generate(),
                consumer: consumer.clone(),
                queue: TickQueue::new(
                    self.config.queue_capacity,
                    options.overflow_policy.unwrap_or(self.config.overflow_policy),
                ),
                symbols: symbols.clone(),
                whole_market,
                state: RwLock::new(SubscriptionState::Active),
                created_at: Utc::now(),
            });

            let mut changes = SubscriptionChanges::default();
            index.attach_symbols(&sub, &mut changes);
            index.by_key.insert((consumer, symbols), sub.id.clone());
            index.subscriptions.insert(sub.id.clone(), Arc::clone(&sub));

            Subscribed {
                handle: SubscriptionHandle { inner: sub },
                created: true,
                changes,
            }
        };

        if !retired.is_empty() {
            tracing::debug!(count = retired.len(), "Retired stale subscriptions");
        }
        for old in retired {
            *old.state.write() = SubscriptionState::Cancelled;
            old.queue.close(EndReason::Unsubscribed);
        }

        tracing::debug!(
            subscription_id = %result.handle.id(),
            consumer = %result.handle.consumer(),
            symbols = result.handle.symbols().len(),
            whole_market,
            "Subscription created"
        );

        Ok(result)
    }

    /// Remove a subscription, discarding anything still queued.
    ///
    /// Once this returns, no further tick reaches the subscription's queue.
    pub fn unsubscribe(&self, id: &SubscriptionId) -> Unsubscribed {
        let removed = self.index.write().remove(id);
        let Some((sub, changes)) = removed else {
            return Unsubscribed::NotFound;
        };

        *sub.state.write() = SubscriptionState::Cancelled;
        sub.queue.close(EndReason::Unsubscribed);
        tracing::debug!(subscription_id = %id, "Subscription removed");

        Unsubscribed::Removed { changes }
    }

    /// Remove every subscription owned by a consumer.
    pub fn consumer_disconnected(&self, consumer: &ConsumerId) -> SubscriptionChanges {
        let removed: Vec<(Arc<Subscription>, SubscriptionChanges)> = {
            let mut index = self.index.write();
            let ids: Vec<SubscriptionId> = index
                .subscriptions
                .values()
                .filter(|s| &s.consumer == consumer)
                .map(|s| s.id.clone())
                .collect();
            ids.iter().filter_map(|id| index.remove(id)).collect()
        };

        let mut merged = SubscriptionChanges::default();
        for (sub, changes) in removed {
            *sub.state.write() = SubscriptionState::Cancelled;
            sub.queue.close(EndReason::Unsubscribed);
            merged.merge(changes);
        }
        merged
    }

    /// Offer a tick to every subscription interested in its symbol and to
    /// every whole-market subscription.
    ///
    /// Never blocks on a full queue.
    pub fn publish(&self, tick: impl Into<SharedTick>) -> PublishReport {
        let tick: SharedTick = tick.into();
        let targets: Vec<Arc<Subscription>> = {
            let index = self.index.read();
            index
                .by_symbol
                .get(&tick.symbol)
                .into_iter()
                .flatten()
                .chain(&index.whole_market)
                .cloned()
                .collect()
        };
        if targets.is_empty() {
            return PublishReport::default();
        }

        let mut report = PublishReport {
            matched: targets.len(),
            ..PublishReport::default()
        };
        for sub in targets {
            let outcome = sub.queue.offer(Arc::clone(&tick));
            if outcome.is_accepted() {
                report.accepted += 1;
            }
            if outcome.dropped() {
                report.dropped += 1;
            }
        }
        report
    }

    /// Mark every active subscription stale and close its queue with an
    /// end-of-stream marker.
    pub fn feed_lost(&self) -> FeedLoss {
        let (stale, changes) = {
            let mut index = self.index.write();
            let stale: Vec<Arc<Subscription>> = index
                .subscriptions
                .values()
                .filter(|s| s.state() == SubscriptionState::Active)
                .cloned()
                .collect();
            let whole_market = !index.whole_market.is_empty();
            index.whole_market.clear();
            let changes = SubscriptionChanges {
                subscribe: HashSet::new(),
                unsubscribe: index.by_symbol.drain().map(|(symbol, _)| symbol).collect(),
                whole_market: whole_market.then_some(false),
            };
            for sub in &stale {
                *sub.state.write() = SubscriptionState::Stale;
            }
            (stale, changes)
        };

        for sub in &stale {
            sub.queue.close(EndReason::FeedLost);
        }
        if !stale.is_empty() {
            tracing::warn!(affected = stale.len(), "Feed lost, subscriptions marked stale");
        }

        FeedLoss {
            affected: stale.len(),
            changes,
        }
    }

    /// Look up a handle by id.
    #[must_use]
    pub fn handle(&self, id: &SubscriptionId) -> Option<SubscriptionHandle> {
        self.index
            .read()
            .subscriptions
            .get(id)
            .map(|inner| SubscriptionHandle {
                inner: Arc::clone(inner),
            })
    }

    /// Snapshot of one subscription.
    #[must_use]
    pub fn info(&self, id: &SubscriptionId) -> Option<SubscriptionInfo> {
        self.index.read().subscriptions.get(id).map(|s| s.info())
    }

    /// Snapshots of all subscriptions, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<SubscriptionInfo> {
        let mut infos: Vec<SubscriptionInfo> = self
            .index
            .read()
            .subscriptions
            .values()
            .map(|s| s.info())
            .collect();
        infos.sort_by_key(|i| i.created_at);
        infos
    }

    /// Symbols with at least one active subscriber, sorted.
    #[must_use]
    pub fn active_symbols(&self) -> BTreeSet<Symbol> {
        self.index.read().by_symbol.keys().cloned().collect()
    }

    /// Whether any active subscription wants the whole market.
    #[must_use]
    pub fn wants_whole_market(&self) -> bool {
        !self.index.read().whole_market.is_empty()
    }

    /// Aggregate statistics.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        let index = self.index.read();
        let consumers: HashSet<&ConsumerId> =
            index.subscriptions.values().map(|s| &s.consumer).collect();
        SubscriptionStats {
            subscription_count: index.subscriptions.len(),
            active_count: index.active_count(),
            symbol_count: index.by_symbol.len(),
            whole_market_count: index.whole_market.len(),
            consumer_count: consumers.len(),
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Aggregate subscription statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubscriptionStats {
    /// Registered subscriptions, stale ones included.
    pub subscription_count: usize,
    /// Subscriptions currently receiving ticks.
    pub active_count: usize,
    /// Symbols with at least one active subscriber.
    pub symbol_count: usize,
    /// Active whole-market subscriptions.
    pub whole_market_count: usize,
    /// Distinct consumers.
    pub consumer_count: usize,
}

// =============================================================================
// Tests
// =============================================================================
