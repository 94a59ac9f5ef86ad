//! Simulated market data feed.
//!
//! Emits a random-walk tick for every subscribed symbol of its universe (or
//! the whole universe while whole-market is on) once per interval. Intervals with nothing to send produce a heartbeat so the
//! supervisor's silence detection stays quiet.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rust_decimal::Decimal;
use tokio::time::{Interval, MissedTickBehavior};

use crate::application::ports::{FeedConnector, FeedError, FeedMessage, FeedStream};
use crate::domain::streaming::{Symbol, Tick, TickPayload};
use crate::domain::subscription::SubscriptionChanges;
use crate::infrastructure::config::MockSettings;

/// Largest per-tick move, in basis points.
const MAX_STEP_BPS: i64 = 20;

/// Feed connector producing simulated ticks.
#[derive(Debug, Clone)]
pub struct SimulatedFeed {
    universe: Vec<Symbol>,
    interval: Duration,
}

impl SimulatedFeed {
    /// Create a feed over a fixed symbol universe.
    #[must_use]
    pub fn new(universe: Vec<Symbol>, interval: Duration) -> Self {
        Self {
            universe,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// Symbols this feed can quote.
    #[must_use]
    pub fn universe(&self) -> &[Symbol] {
        &self.universe
    }
}

impl From<&MockSettings> for SimulatedFeed {
    fn from(settings: &MockSettings) -> Self {
        let universe = settings
            .symbols
            .iter()
            .filter_map(|raw| match Symbol::parse(raw) {
                Ok(symbol) => Some(symbol),
                Err(e) => {
                    tracing::warn!(symbol = %raw, error = %e, "Skipping invalid simulated symbol");
                    None
                }
            })
            .collect();
        Self::new(universe, settings.tick_interval)
    }
}

#[async_trait]
impl FeedConnector for SimulatedFeed {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn connect(&self) -> Result<Box<dyn FeedStream>, FeedError> {
        let prices = self
            .universe
            .iter()
            .enumerate()
            .map(|(i, symbol)| {
                let step = i64::try_from(i).unwrap_or(0);
                (symbol.clone(), Quote::new(Decimal::new(1000 + step * 500, 2)))
            })
            .collect();

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(symbols = self.universe.len(), "Simulated feed connected");
        Ok(Box::new(SimulatedStream {
            quotes: prices,
            subscribed: BTreeSet::new(),
            whole_market: false,
            interval,
            pending: VecDeque::new(),
        }))
    }
}

#[derive(Debug)]
struct Quote {
    price: Decimal,
    sequence: u64,
    volume: u64,
}

impl Quote {
    const fn new(price: Decimal) -> Self {
        Self {
            price,
            sequence: 0,
            volume: 0,
        }
    }

    fn step(&mut self, symbol: &Symbol) -> Tick {
        let mut rng = rand::rng();
        let bps = rng.random_range(-MAX_STEP_BPS..=MAX_STEP_BPS);
        let moved = (self.price + self.price * Decimal::new(bps, 4)).round_dp(2);
        self.price = moved.max(Decimal::new(1, 2));
        self.sequence += 1;
        self.volume += rng.random_range(1..=50) * 100;

        let spread = Decimal::new(1, 2);
        Tick::new(
            symbol.clone(),
            self.sequence,
            TickPayload {
                last_price: self.price,
                bid_price: Some((self.price - spread).max(Decimal::ZERO)),
                ask_price: Some(self.price + spread),
                volume: self.volume,
            },
        )
    }
}

struct SimulatedStream {
    quotes: BTreeMap<Symbol, Quote>,
    subscribed: BTreeSet<Symbol>,
    whole_market: bool,
    interval: Interval,
    pending: VecDeque<Tick>,
}

impl SimulatedStream {
    fn wanted(&self, symbol: &Symbol) -> bool {
        self.whole_market || self.subscribed.contains(symbol)
    }
}

#[async_trait]
impl FeedStream for SimulatedStream {
    async fn next_message(&mut self) -> Result<FeedMessage, FeedError> {
        if let Some(tick) = self.pending.pop_front() {
            return Ok(FeedMessage::Tick(tick));
        }

        self.interval.tick().await;

        let whole_market = self.whole_market;
        for (symbol, quote) in &mut self.quotes {
            if whole_market || self.subscribed.contains(symbol) {
                self.pending.push_back(quote.step(symbol));
            }
        }

        Ok(self
            .pending
            .pop_front()
            .map_or(FeedMessage::Heartbeat, FeedMessage::Tick))
    }

    async fn update_subscriptions(
        &mut self,
        changes: &SubscriptionChanges,
    ) -> Result<(), FeedError> {
        self.subscribed.extend(changes.subscribe.iter().cloned());
        for symbol in &changes.unsubscribe {
            self.subscribed.remove(symbol);
        }
        if let Some(on) = changes.whole_market {
            self.whole_market = on;
        }
        let pending = std::mem::take(&mut self.pending);
        let kept: VecDeque<Tick> = pending
            .into_iter()
            .filter(|tick| self.wanted(&tick.symbol))
            .collect();
        self.pending = kept;
        Ok(())
    }
}
