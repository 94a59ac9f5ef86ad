//! Simulated Trading Backend
//!
//! Deterministic in-process backend for mock mode. Each account has one
//! book shared by all of its sessions:
//!
//! - Limit orders rest. A buy freezes its notional in cash, a sell freezes
//!   the position's available volume. Cancelling releases what was frozen.
//! - Market orders fill immediately at the request price, or at the
//!   position's market price when none is given.
//!
//! Order ids are `mock_order_<n>` starting at 1000.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::application::ports::{BackendConnection, BackendKind, TradingBackend, TradingEventSink};
use crate::domain::error::BackendError;
use crate::domain::session::{AccountCredentials, AccountId};
use crate::domain::streaming::Symbol;
use crate::domain::trading::{
    AccountInfo, AssetInfo, CancelRequest, CancelResponse, OrderInfo, OrderRequest, OrderResponse,
    OrderSide, OrderStatus, OrderType, PositionInfo, TradeInfo, TradingEvent, TradingEventKind,
};

const FIRST_ORDER_ID: u64 = 1000;

// =============================================================================
// Book
// =============================================================================

fn amount_overflow() -> BackendError {
    BackendError::rejected("INVALID_AMOUNT", "order amount is out of range")
}

#[derive(Debug, Clone)]
struct Holding {
    name: String,
    volume: u64,
    available: u64,
    cost_price: Decimal,
    market_price: Decimal,
}

impl Holding {
    fn market_value(&self) -> Decimal {
        self.market_price * Decimal::from(self.volume)
    }

    fn profit_loss(&self) -> Decimal {
        (self.market_price - self.cost_price) * Decimal::from(self.volume)
    }

    fn to_info(&self, symbol: &Symbol) -> PositionInfo {
        PositionInfo {
            symbol: symbol.clone(),
            name: self.name.clone(),
            volume: self.volume,
            available_volume: self.available,
            cost_price: self.cost_price,
            market_price: self.market_price,
            market_value: self.market_value(),
            profit_loss: self.profit_loss(),
        }
    }
}

#[derive(Debug, Clone)]
struct SimOrder {
    info: OrderInfo,
    frozen_cash: Decimal,
    frozen_volume: u64,
}

/// What a mutation changed, for event fan-out.
#[derive(Debug, Default)]
struct Changes {
    order: Option<OrderInfo>,
    trade: Option<TradeInfo>,
    position: Option<PositionInfo>,
    asset: Option<AssetInfo>,
}

#[derive(Debug)]
struct Book {
    account_id: AccountId,
    cash: Decimal,
    frozen_cash: Decimal,
    holdings: BTreeMap<Symbol, Holding>,
    orders: Vec<SimOrder>,
    trades: Vec<TradeInfo>,
}

impl Book {
    fn seeded(account_id: AccountId) -> Self {
        let mut holdings = BTreeMap::new();
        for (code, name, volume, cost, market) in [
            ("000001.SZ", "Ping An Bank", 10_000, Decimal::new(1250, 2), Decimal::new(1320, 2)),
            ("000002.SZ", "Vanke A", 5_000, Decimal::new(1880, 2), Decimal::new(1950, 2)),
        ] {
            if let Ok(symbol) = Symbol::parse(code) {
                holdings.insert(
                    symbol,
                    Holding {
                        name: name.to_string(),
                        volume,
                        available: volume,
                        cost_price: cost,
                        market_price: market,
                    },
                );
            }
        }
        Self {
            account_id,
            cash: Decimal::new(950_000, 0),
            frozen_cash: Decimal::new(50_000, 0),
            holdings,
            orders: Vec::new(),
            trades: Vec::new(),
        }
    }

    fn market_value(&self) -> Decimal {
        self.holdings.values().map(Holding::market_value).sum()
    }

    fn asset(&self) -> AssetInfo {
        let market_value = self.market_value();
        AssetInfo {
            total_asset: self.cash + self.frozen_cash + market_value,
            market_value,
            cash: self.cash,
            frozen_cash: self.frozen_cash,
            profit_loss: self.holdings.values().map(Holding::profit_loss).sum(),
        }
    }

    fn account(&self) -> AccountInfo {
        let asset = self.asset();
        AccountInfo {
            account_id: self.account_id.clone(),
            account_type: "STOCK".to_string(),
            balance: self.cash + self.frozen_cash,
            available_balance: self.cash,
            frozen_balance: self.frozen_cash,
            market_value: asset.market_value,
            total_asset: asset.total_asset,
        }
    }

    fn positions(&self) -> Vec<PositionInfo> {
        self.holdings
            .iter()
            .map(|(symbol, holding)| holding.to_info(symbol))
            .collect()
    }

    fn submit(&mut self, order_id: String, request: &OrderRequest) -> Result<Changes, BackendError> {
        let now = Utc::now();
        let mut info = OrderInfo {
            order_id,
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            volume: request.volume,
            price: request.price,
            filled_volume: 0,
            status: OrderStatus::Submitted,
            submitted_at: now,
        };

        match request.order_type {
            OrderType::Limit => {
                let price = request
                    .price
                    .ok_or_else(|| BackendError::rejected("NO_PRICE", "limit order needs a price"))?;
                let (frozen_cash, frozen_volume) = match request.side {
                    OrderSide::Buy => {
                        let notional = request.notional(price).ok_or_else(amount_overflow)?;
                        self.freeze_cash(notional)?;
                        (notional, 0)
                    }
                    OrderSide::Sell => {
                        self.freeze_volume(&request.symbol, request.volume)?;
                        (Decimal::ZERO, request.volume)
                    }
                };
                self.orders.push(SimOrder {
                    info: info.clone(),
                    frozen_cash,
                    frozen_volume,
                });
                Ok(Changes {
                    order: Some(info),
                    position: self.position_info(&request.symbol),
                    asset: Some(self.asset()),
                    ..Changes::default()
                })
            }
            OrderType::Market => {
                let price = request
                    .price
                    .or_else(|| self.holdings.get(&request.symbol).map(|h| h.market_price))
                    .ok_or_else(|| {
                        BackendError::rejected("NO_PRICE", "no reference price for market order")
                    })?;
                let trade = self.fill(&info, price)?;
                info.filled_volume = info.volume;
                info.status = OrderStatus::Filled;
                info.price = Some(price);
                self.orders.push(SimOrder {
                    info: info.clone(),
                    frozen_cash: Decimal::ZERO,
                    frozen_volume: 0,
                });
                Ok(Changes {
                    order: Some(info),
                    trade: Some(trade),
                    position: self.position_info(&request.symbol),
                    asset: Some(self.asset()),
                })
            }
        }
    }

    fn cancel(&mut self, order_id: &str) -> Result<Changes, BackendError> {
        let order = self
            .orders
            .iter_mut()
            .find(|o| o.info.order_id == order_id)
            .ok_or_else(|| {
                BackendError::rejected("ORDER_NOT_FOUND", format!("unknown order {order_id}"))
            })?;
        if !order.info.status.is_open() {
            return Err(BackendError::rejected(
                "ORDER_NOT_OPEN",
                format!("order {order_id} is {:?}", order.info.status),
            ));
        }

        order.info.status = OrderStatus::Cancelled;
        let info = order.info.clone();
        let (frozen_cash, frozen_volume) = (order.frozen_cash, order.frozen_volume);
        order.frozen_cash = Decimal::ZERO;
        order.frozen_volume = 0;

        self.cash += frozen_cash;
        self.frozen_cash -= frozen_cash;
        if let Some(holding) = self.holdings.get_mut(&info.symbol) {
            holding.available += frozen_volume;
        }

        Ok(Changes {
            position: self.position_info(&info.symbol),
            order: Some(info),
            asset: Some(self.asset()),
            ..Changes::default()
        })
    }

    fn freeze_cash(&mut self, amount: Decimal) -> Result<(), BackendError> {
        if amount > self.cash {
            return Err(BackendError::rejected(
                "INSUFFICIENT_FUNDS",
                format!("needs {amount}, available {}", self.cash),
            ));
        }
        self.cash -= amount;
        self.frozen_cash += amount;
        Ok(())
    }

    fn freeze_volume(&mut self, symbol: &Symbol, volume: u64) -> Result<(), BackendError> {
        let holding = self
            .holdings
            .get_mut(symbol)
            .filter(|h| h.available >= volume)
            .ok_or_else(|| {
                BackendError::rejected(
                    "INSUFFICIENT_POSITION",
                    format!("not enough available {symbol} to sell {volume}"),
                )
            })?;
        holding.available -= volume;
        Ok(())
    }

    fn fill(&mut self, order: &OrderInfo, price: Decimal) -> Result<TradeInfo, BackendError> {
        let notional = price
            .checked_mul(Decimal::from(order.volume))
            .ok_or_else(amount_overflow)?;
        match order.side {
            OrderSide::Buy => {
                if notional > self.cash {
                    return Err(BackendError::rejected(
                        "INSUFFICIENT_FUNDS",
                        format!("needs {notional}, available {}", self.cash),
                    ));
                }
                let (held, old_cost) = self
                    .holdings
                    .get(&order.symbol)
                    .map_or((0, Decimal::ZERO), |h| (h.volume, h.cost_price * Decimal::from(h.volume)));
                let volume = held.checked_add(order.volume).ok_or_else(amount_overflow)?;
                let cost_price = old_cost
                    .checked_add(notional)
                    .ok_or_else(amount_overflow)?
                    .checked_div(Decimal::from(volume))
                    .ok_or_else(amount_overflow)?
                    .round_dp(4);

                // Every check has passed; nothing below can fail.
                self.cash -= notional;
                let holding = self
                    .holdings
                    .entry(order.symbol.clone())
                    .or_insert_with(|| Holding {
                        name: order.symbol.to_string(),
                        volume: 0,
                        available: 0,
                        cost_price: price,
                        market_price: price,
                    });
                holding.available += order.volume;
                holding.volume = volume;
                holding.cost_price = cost_price;
                holding.market_price = price;
            }
            OrderSide::Sell => {
                let cash = self.cash.checked_add(notional).ok_or_else(amount_overflow)?;
                self.freeze_volume(&order.symbol, order.volume)?;
                let emptied = match self.holdings.get_mut(&order.symbol) {
                    Some(holding) => {
                        holding.volume -= order.volume;
                        holding.market_price = price;
                        holding.volume == 0
                    }
                    None => false,
                };
                if emptied {
                    self.holdings.remove(&order.symbol);
                }
                self.cash = cash;
            }
        }

        let trade = TradeInfo {
            trade_id: format!("mock_trade_{}", self.trades.len() + 1),
            order_id: order.order_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            volume: order.volume,
            price,
            traded_at: Utc::now(),
        };
        self.trades.push(trade.clone());
        Ok(trade)
    }

    fn position_info(&self, symbol: &Symbol) -> Option<PositionInfo> {
        self.holdings.get(symbol).map(|h| h.to_info(symbol))
    }
}

// =============================================================================
// Backend
// =============================================================================

/// In-process simulated backend.
pub struct SimulatedBackend {
    books: Mutex<HashMap<AccountId, Arc<Mutex<Book>>>>,
    order_seq: Arc<AtomicU64>,
    events: Option<Arc<dyn TradingEventSink>>,
}

impl SimulatedBackend {
    /// Create a backend with empty books.
    #[must_use]
    pub fn new() -> Self {
        Self {
            books: Mutex::new(HashMap::new()),
            order_seq: Arc::new(AtomicU64::new(FIRST_ORDER_ID)),
            events: None,
        }
    }

    /// Publish simulated order, trade, position and asset callbacks.
    #[must_use]
    pub fn with_events(mut self, sink: Arc<dyn TradingEventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    fn book(&self, account_id: &AccountId) -> Arc<Mutex<Book>> {
        Arc::clone(
            self.books
                .lock()
                .entry(account_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(Book::seeded(account_id.clone())))),
        )
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TradingBackend for SimulatedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Simulated
    }

    async fn open(
        &self,
        account_id: &AccountId,
        _credentials: &AccountCredentials,
    ) -> Result<Box<dyn BackendConnection>, BackendError> {
        tracing::debug!(account_id = %account_id, "Opening simulated connection");
        Ok(Box::new(SimulatedConnection {
            account_id: account_id.clone(),
            book: self.book(account_id),
            order_seq: Arc::clone(&self.order_seq),
            events: self.events.clone(),
            closed: false,
        }))
    }
}

/// A session's handle on a simulated account.
pub struct SimulatedConnection {
    account_id: AccountId,
    book: Arc<Mutex<Book>>,
    order_seq: Arc<AtomicU64>,
    events: Option<Arc<dyn TradingEventSink>>,
    closed: bool,
}

impl SimulatedConnection {
    fn ensure_open(&self) -> Result<(), BackendError> {
        if self.closed {
            return Err(BackendError::ConnectionLost("simulated connection closed".into()));
        }
        Ok(())
    }

    fn emit(&self, changes: Changes) {
        let Some(sink) = &self.events else {
            return;
        };
        let kinds = [
            changes.order.map(TradingEventKind::Order),
            changes.trade.map(TradingEventKind::Trade),
            changes.position.map(TradingEventKind::Position),
            changes.asset.map(TradingEventKind::Asset),
        ];
        for kind in kinds.into_iter().flatten() {
            sink.publish(TradingEvent::now(self.account_id.clone(), kind));
        }
    }
}

#[async_trait]
impl BackendConnection for SimulatedConnection {
    async fn account(&mut self) -> Result<AccountInfo, BackendError> {
        self.ensure_open()?;
        Ok(self.book.lock().account())
    }

    async fn asset(&mut self) -> Result<AssetInfo, BackendError> {
        self.ensure_open()?;
        Ok(self.book.lock().asset())
    }

    async fn positions(&mut self) -> Result<Vec<PositionInfo>, BackendError> {
        self.ensure_open()?;
        Ok(self.book.lock().positions())
    }

    async fn orders(&mut self) -> Result<Vec<OrderInfo>, BackendError> {
        self.ensure_open()?;
        Ok(self.book.lock().orders.iter().map(|o| o.info.clone()).collect())
    }

    async fn trades(&mut self) -> Result<Vec<TradeInfo>, BackendError> {
        self.ensure_open()?;
        Ok(self.book.lock().trades.clone())
    }

    async fn submit_order(
        &mut self,
        request: &OrderRequest,
    ) -> Result<OrderResponse, BackendError> {
        self.ensure_open()?;
        let order_id = format!("mock_order_{}", self.order_seq.fetch_add(1, Ordering::Relaxed));
        let changes = self.book.lock().submit(order_id, request)?;
        let response = changes.order.as_ref().map(|order| OrderResponse {
            order_id: order.order_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            volume: order.volume,
            price: order.price,
            status: order.status,
            submitted_at: order.submitted_at,
            intercepted: false,
            message: Some("simulated".to_string()),
        });
        self.emit(changes);
        response.ok_or_else(|| BackendError::Protocol("simulation produced no order".into()))
    }

    async fn cancel_order(
        &mut self,
        request: &CancelRequest,
    ) -> Result<CancelResponse, BackendError> {
        self.ensure_open()?;
        let changes = self.book.lock().cancel(&request.order_id)?;
        self.emit(changes);
        Ok(CancelResponse {
            order_id: request.order_id.clone(),
            success: true,
            intercepted: false,
            message: Some("simulated".to_string()),
        })
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        self.closed = true;
        Ok(())
    }
}
