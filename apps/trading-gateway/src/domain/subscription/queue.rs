//! Bounded Tick Queue
//!
//! Per-subscription delivery queue. Pushes never block: when the queue is
//! full the configured [`OverflowPolicy`] decides which tick is discarded
//! and the dropped counter is bumped. Consumers pull with a timeout and
//! receive an explicit end-of-stream marker once the queue is closed.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::domain::error::GatewayError;
use crate::domain::streaming::{SharedTick, Symbol};

// =============================================================================
// Capability
// =============================================================================

/// Something a published tick can be offered to.
pub trait TickSink: Send + Sync {
    /// Offer a tick without blocking. Returns whether the tick was accepted.
    fn enqueue(&self, tick: SharedTick) -> bool;
}

// =============================================================================
// Policy and Delivery Types
// =============================================================================

/// What to discard when a subscriber queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued tick to make room for the new one.
    #[default]
    DropOldest,
    /// Keep the queue as is and discard the incoming tick.
    DropNewest,
}

impl OverflowPolicy {
    /// Get the string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DropOldest => "drop_oldest",
            Self::DropNewest => "drop_newest",
        }
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverflowPolicy {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "drop_oldest" | "oldest" => Ok(Self::DropOldest),
            "drop_newest" | "newest" => Ok(Self::DropNewest),
            other => Err(GatewayError::validation(format!(
                "unknown overflow policy: {other}"
            ))),
        }
    }
}

/// Why a queue stopped delivering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The subscription was cancelled.
    Unsubscribed,
    /// The upstream feed was lost.
    FeedLost,
}

impl EndReason {
    /// Get the string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unsubscribed => "unsubscribed",
            Self::FeedLost => "feed_lost",
        }
    }
}

/// One item pulled from a subscriber queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// A tick, with the number of sequence numbers skipped since the last
    /// tick delivered for the same symbol.
    Tick {
        /// The tick.
        tick: SharedTick,
        /// Missing sequence numbers before this tick (0 when contiguous).
        missed: u64,
    },
    /// The queue is closed and drained.
    EndOfStream(EndReason),
}

impl Delivery {
    /// Get the tick, if this is a tick delivery.
    #[must_use]
    pub const fn tick(&self) -> Option<&SharedTick> {
        match self {
            Self::Tick { tick, .. } => Some(tick),
            Self::EndOfStream(_) => None,
        }
    }

    /// Whether this is the end-of-stream marker.
    #[must_use]
    pub const fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndOfStream(_))
    }
}

/// Result of offering a tick to a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Queued with room to spare.
    Accepted,
    /// Queued after evicting the oldest tick.
    AcceptedWithEviction,
    /// Discarded because the queue was full.
    Rejected,
    /// Discarded because the queue is closed.
    Closed,
}

impl PushOutcome {
    /// Whether the offered tick ended up in the queue.
    #[must_use]
    pub const fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted | Self::AcceptedWithEviction)
    }

    /// Whether a tick was lost to overflow.
    #[must_use]
    pub const fn dropped(self) -> bool {
        matches!(self, Self::AcceptedWithEviction | Self::Rejected)
    }
}

// =============================================================================
// Tick Queue
// =============================================================================

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<SharedTick>,
    closed: Option<EndReason>,
    last_delivered: HashMap<Symbol, u64>,
}

impl QueueState {
    fn pop(&mut self) -> Option<Delivery> {
        if let Some(tick) = self.items.pop_front() {
            let missed = match self.last_delivered.insert(tick.symbol.clone(), tick.sequence) {
                Some(last) if tick.sequence > last => tick.sequence - last - 1,
                _ => 0,
            };
            return Some(Delivery::Tick { tick, missed });
        }
        self.closed.map(Delivery::EndOfStream)
    }
}

/// Bounded single-subscription queue.
#[derive(Debug)]
pub struct TickQueue {
    capacity: usize,
    policy: OverflowPolicy,
    state: Mutex<QueueState>,
    notify: Notify,
    dropped: AtomicU64,
    delivered: AtomicU64,
}

impl TickQueue {
    /// Create a queue. A zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            policy,
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.min(1024)),
                ..QueueState::default()
            }),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
        }
    }

    /// Offer a tick, applying the overflow policy when full.
    pub fn offer(&self, tick: SharedTick) -> PushOutcome {
        let outcome = {
            let mut state = self.state.lock();
            if state.closed.is_some() {
                return PushOutcome::Closed;
            }
            if state.items.len() < self.capacity {
                state.items.push_back(tick);
                PushOutcome::Accepted
            } else {
                match self.policy {
                    OverflowPolicy::DropOldest => {
                        state.items.pop_front();
                        state.items.push_back(tick);
                        PushOutcome::AcceptedWithEviction
                    }
                    OverflowPolicy::DropNewest => PushOutcome::Rejected,
                }
            }
        };

        if outcome.dropped() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        if outcome.is_accepted() {
            self.notify.notify_one();
        }
        outcome
    }

    /// Close the queue.
    ///
    /// Closing for [`EndReason::Unsubscribed`] discards anything still
    /// queued. Closing for [`EndReason::FeedLost`] keeps queued ticks so the
    /// consumer can drain them before seeing the marker. Returns `false`
    /// if the queue was already closed.
    pub fn close(&self, reason: EndReason) -> bool {
        {
            let mut state = self.state.lock();
            if state.closed.is_some() {
                return false;
            }
            state.closed = Some(reason);
            if reason == EndReason::Unsubscribed {
                state.items.clear();
            }
        }
        self.notify.notify_waiters();
        true
    }

    /// Pull the next item without waiting.
    #[must_use]
    pub fn try_dequeue(&self) -> Option<Delivery> {
        let delivery = self.state.lock().pop();
        if matches!(delivery, Some(Delivery::Tick { .. })) {
            self.delivered.fetch_add(1, Ordering::Relaxed);
        }
        delivery
    }

    /// Pull the next item, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Timeout`] if nothing arrives in time. The
    /// queue is left untouched in that case.
    pub async fn dequeue(&self, timeout: Duration) -> Result<Delivery, GatewayError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(delivery) = self.try_dequeue() {
                return Ok(delivery);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(GatewayError::Timeout(timeout));
            }
        }
    }

    /// Number of queued ticks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued ticks.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Overflow policy applied by this queue.
    #[must_use]
    pub const fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Ticks lost to overflow so far.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Ticks handed to the consumer so far.
    #[must_use]
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Why the queue was closed, if it was.
    #[must_use]
    pub fn end_reason(&self) -> Option<EndReason> {
        self.state.lock().closed
    }
}

impl TickSink for TickQueue {
    fn enqueue(&self, tick: SharedTick) -> bool {
        self.offer(tick).is_accepted()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::streaming::{Tick, TickPayload};
    use test_case::test_case;

    fn tick(symbol: &str, seq: u64) -> SharedTick {
        Arc::new(Tick::new(
            Symbol::parse(symbol).unwrap(),
            seq,
            TickPayload::default(),
        ))
    }

    fn seq_of(delivery: &Delivery) -> u64 {
        delivery.tick().map(|t| t.sequence).unwrap()
    }

    #[test]
    fn drop_oldest_evicts_head_and_counts() {
        let queue = TickQueue::new(2, OverflowPolicy::DropOldest);
        assert_eq!(queue.offer(tick("AAPL", 1)), PushOutcome::Accepted);
        assert_eq!(queue.offer(tick("AAPL", 2)), PushOutcome::Accepted);
        assert_eq!(
            queue.offer(tick("AAPL", 3)),
            PushOutcome::AcceptedWithEviction
        );

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped_count(), 1);
        assert_eq!(seq_of(&queue.try_dequeue().unwrap()), 2);
        assert_eq!(seq_of(&queue.try_dequeue().unwrap()), 3);
    }

    #[test]
    fn drop_newest_keeps_queue() {
        let queue = TickQueue::new(2, OverflowPolicy::DropNewest);
        queue.offer(tick("AAPL", 1));
        queue.offer(tick("AAPL", 2));
        assert!(!queue.enqueue(tick("AAPL", 3)));

        assert_eq!(queue.dropped_count(), 1);
        assert_eq!(seq_of(&queue.try_dequeue().unwrap()), 1);
        assert_eq!(seq_of(&queue.try_dequeue().unwrap()), 2);
        assert!(queue.try_dequeue().is_none());
    }

    #[test]
    fn gap_is_reported_per_symbol() {
        let queue = TickQueue::new(8, OverflowPolicy::DropOldest);
        queue.offer(tick("AAPL", 1));
        queue.offer(tick("MSFT", 10));
        queue.offer(tick("AAPL", 4));
        queue.offer(tick("MSFT", 11));

        let missed: Vec<u64> = std::iter::from_fn(|| queue.try_dequeue())
            .map(|d| match d {
                Delivery::Tick { missed, .. } => missed,
                Delivery::EndOfStream(_) => u64::MAX,
            })
            .collect();
        assert_eq!(missed, vec![0, 0, 2, 0]);
    }

    #[test]
    fn unsubscribe_close_discards_items() {
        let queue = TickQueue::new(4, OverflowPolicy::DropOldest);
        queue.offer(tick("AAPL", 1));
        assert!(queue.close(EndReason::Unsubscribed));

        assert_eq!(
            queue.try_dequeue(),
            Some(Delivery::EndOfStream(EndReason::Unsubscribed))
        );
        assert_eq!(queue.offer(tick("AAPL", 2)), PushOutcome::Closed);
        assert_eq!(queue.dropped_count(), 0);
    }

    #[test]
    fn feed_lost_close_drains_then_ends() {
        let queue = TickQueue::new(4, OverflowPolicy::DropOldest);
        queue.offer(tick("AAPL", 1));
        queue.close(EndReason::FeedLost);

        assert_eq!(seq_of(&queue.try_dequeue().unwrap()), 1);
        assert_eq!(
            queue.try_dequeue(),
            Some(Delivery::EndOfStream(EndReason::FeedLost))
        );
        // Marker is sticky.
        assert!(queue.try_dequeue().unwrap().is_end_of_stream());
    }

    #[test]
    fn first_close_wins() {
        let queue = TickQueue::new(1, OverflowPolicy::DropOldest);
        assert!(queue.close(EndReason::FeedLost));
        assert!(!queue.close(EndReason::Unsubscribed));
        assert_eq!(queue.end_reason(), Some(EndReason::FeedLost));
    }

    #[test]
    fn zero_capacity_is_raised() {
        let queue = TickQueue::new(0, OverflowPolicy::DropOldest);
        assert_eq!(queue.capacity(), 1);
    }

    #[test_case("drop_oldest", OverflowPolicy::DropOldest)]
    #[test_case("DROP-NEWEST", OverflowPolicy::DropNewest)]
    #[test_case("newest", OverflowPolicy::DropNewest)]
    fn parse_policy(raw: &str, expected: OverflowPolicy) {
        assert_eq!(raw.parse::<OverflowPolicy>().unwrap(), expected);
    }

    #[test]
    fn parse_policy_rejects_block() {
        assert!("block".parse::<OverflowPolicy>().is_err());
    }

    #[tokio::test]
    async fn dequeue_times_out_without_side_effects() {
        let queue = TickQueue::new(4, OverflowPolicy::DropOldest);
        let err = queue.dequeue(Duration::from_millis(20)).await.unwrap_err();
        assert_eq!(err, GatewayError::Timeout(Duration::from_millis(20)));
        assert!(queue.end_reason().is_none());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn dequeue_wakes_on_push() {
        let queue = Arc::new(TickQueue::new(4, OverflowPolicy::DropOldest));
        let producer = Arc::clone(&queue);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.offer(tick("AAPL", 9));
        });

        let delivery = queue.dequeue(Duration::from_secs(2)).await.unwrap();
        assert_eq!(seq_of(&delivery), 9);
        assert_eq!(queue.delivered_count(), 1);
    }

    #[tokio::test]
    async fn dequeue_wakes_on_close() {
        let queue = Arc::new(TickQueue::new(4, OverflowPolicy::DropOldest));
        let closer = Arc::clone(&queue);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            closer.close(EndReason::FeedLost);
        });

        let delivery = queue.dequeue(Duration::from_secs(2)).await.unwrap();
        assert_eq!(delivery, Delivery::EndOfStream(EndReason::FeedLost));
    }
}
