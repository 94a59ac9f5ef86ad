//! Trading Event Broadcast
//!
//! Fans trading callbacks (order, trade, position, asset, errors) out to
//! any number of listeners over a tokio broadcast channel, and keeps a
//! short history so a late listener can catch up.
//!
//! Publishing never blocks. A listener that falls behind the channel
//! capacity observes `RecvError::Lagged` and skips ahead.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::application::ports::TradingEventSink;
use crate::domain::session::AccountId;
use crate::domain::trading::TradingEvent;

/// Configuration for the event hub.
#[derive(Debug, Clone, Copy)]
pub struct EventHubConfig {
    /// Broadcast channel capacity.
    pub channel_capacity: usize,
    /// Number of recent events retained.
    pub history_size: usize,
}

impl Default for EventHubConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1_000,
            history_size: 100,
        }
    }
}

/// A listener's starting point: recent events plus a live receiver that
/// continues exactly where the snapshot ends.
#[derive(Debug)]
pub struct EventSubscription {
    /// Most recent events, oldest first.
    pub recent: Vec<TradingEvent>,
    /// Live events published after the snapshot.
    pub receiver: broadcast::Receiver<TradingEvent>,
}

/// Central hub for trading events.
///
/// # Example
///
/// ```rust
/// use trading_gateway::infrastructure::broadcast::TradingEventHub;
///
/// let hub = TradingEventHub::with_defaults();
/// let mut listener = hub.subscribe(10);
/// assert!(listener.recent.is_empty());
/// ```
#[derive(Debug)]
pub struct TradingEventHub {
    tx: broadcast::Sender<TradingEvent>,
    history: Mutex<VecDeque<TradingEvent>>,
    history_size: usize,
}

impl TradingEventHub {
    /// Create a hub with the given configuration.
    #[must_use]
    pub fn new(config: EventHubConfig) -> Self {
        Self {
            tx: broadcast::channel(config.channel_capacity.max(1)).0,
            history: Mutex::new(VecDeque::with_capacity(config.history_size)),
            history_size: config.history_size,
        }
    }

    /// Create a hub with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(EventHubConfig::default())
    }

    /// Record an event and send it to current listeners.
    ///
    /// Returns the number of listeners reached.
    pub fn send(&self, event: TradingEvent) -> usize {
        let mut history = self.history.lock();
        if self.history_size > 0 {
            if history.len() == self.history_size {
                history.pop_front();
            }
            history.push_back(event.clone());
        }
        // No receivers is not an error for a fan-out.
        self.tx.send(event).unwrap_or(0)
    }

    /// Start listening, receiving up to `recent` past events first.
    #[must_use]
    pub fn subscribe(&self, recent: usize) -> EventSubscription {
        let history = self.history.lock();
        let skip = history.len().saturating_sub(recent);
        EventSubscription {
            recent: history.iter().skip(skip).cloned().collect(),
            receiver: self.tx.subscribe(),
        }
    }

    /// Recent events, optionally limited to one account, oldest first.
    #[must_use]
    pub fn recent(&self, account: Option<&AccountId>, limit: usize) -> Vec<TradingEvent> {
        let history = self.history.lock();
        let mut events: Vec<TradingEvent> = history
            .iter()
            .rev()
            .filter(|e| account.is_none_or(|a| &e.account_id == a))
            .take(limit)
            .cloned()
            .collect();
        events.reverse();
        events
    }

    /// Number of events kept for late listeners.
    #[must_use]
    pub const fn history_size(&self) -> usize {
        self.history_size
    }

    /// Number of live listeners.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl TradingEventSink for TradingEventHub {
    fn publish(&self, event: TradingEvent) {
        let reached = self.send(event);
        tracing::trace!(listeners = reached, "Trading event published");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::TradingEventKind;

    fn event(account: &str) -> TradingEvent {
        TradingEvent::now(AccountId::parse(account).unwrap(), TradingEventKind::Connected)
    }

    #[test]
    fn send_without_listeners_is_fine() {
        let hub = TradingEventHub::with_defaults();
        assert_eq!(hub.send(event("a")), 0);
        assert_eq!(hub.recent(None, 10).len(), 1);
    }

    #[test]
    fn history_is_bounded() {
        let hub = TradingEventHub::new(EventHubConfig {
            channel_capacity: 8,
            history_size: 3,
        });
        for account in ["a", "b", "c", "d"] {
            hub.send(event(account));
        }
        let recent: Vec<String> = hub
            .recent(None, 10)
            .into_iter()
            .map(|e| e.account_id.as_str().to_string())
            .collect();
        assert_eq!(recent, vec!["b", "c", "d"]);
    }

    #[test]
    fn recent_filters_by_account() {
        let hub = TradingEventHub::with_defaults();
        hub.send(event("a"));
        hub.send(event("b"));
        hub.send(event("a"));
        let account = AccountId::parse("a").unwrap();
        assert_eq!(hub.recent(Some(&account), 10).len(), 2);
        assert_eq!(hub.recent(Some(&account), 1).len(), 1);
    }

    #[tokio::test]
    async fn subscriber_gets_snapshot_then_live_events() {
        let hub = TradingEventHub::with_defaults();
        hub.send(event("a"));
        hub.send(event("b"));

        let mut listener = hub.subscribe(1);
        assert_eq!(listener.recent.len(), 1);
        assert_eq!(listener.recent[0].account_id.as_str(), "b");

        hub.publish(event("c"));
        let live = listener.receiver.recv().await.unwrap();
        assert_eq!(live.account_id.as_str(), "c");
    }
}
