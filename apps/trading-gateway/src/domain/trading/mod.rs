//! Trading DTOs
//!
//! Request and response payloads exchanged with a trading backend. Each
//! value is scoped to exactly one session; beyond input validation these
//! types carry no invariants of their own.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::error::GatewayError;
use crate::domain::session::AccountId;
use crate::domain::streaming::Symbol;

/// Largest accepted order volume, in shares.
pub const MAX_ORDER_VOLUME: u64 = 1_000_000_000_000;

/// Largest accepted order price.
pub const MAX_ORDER_PRICE: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

// =============================================================================
// Enums
// =============================================================================

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    /// Buy.
    Buy,
    /// Sell.
    Sell,
}

/// Order type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Rest at a limit price.
    #[default]
    Limit,
    /// Execute at the prevailing price.
    Market,
}

/// Order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Accepted locally, not yet at the exchange.
    Pending,
    /// Working at the exchange.
    Submitted,
    /// Partially executed.
    PartialFilled,
    /// Fully executed.
    Filled,
    /// Cancelled.
    Cancelled,
    /// Rejected.
    Rejected,
}

impl OrderStatus {
    /// Whether the order can still be cancelled.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Submitted | Self::PartialFilled)
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Order submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Instrument.
    pub symbol: Symbol,
    /// Side.
    pub side: OrderSide,
    /// Type.
    #[serde(default)]
    pub order_type: OrderType,
    /// Quantity in shares.
    pub volume: u64,
    /// Limit price, required for limit orders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    /// Strategy tag forwarded to the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_name: Option<String>,
    /// Free-form remark forwarded to the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
}

impl OrderRequest {
    /// Create a limit order.
    #[must_use]
    pub const fn limit(symbol: Symbol, side: OrderSide, volume: u64, price: Decimal) -> Self {
        Self {
            symbol,
            side,
            order_type: OrderType::Limit,
            volume,
            price: Some(price),
            strategy_name: None,
            remark: None,
        }
    }

    /// Create a market order.
    #[must_use]
    pub const fn market(symbol: Symbol, side: OrderSide, volume: u64) -> Self {
        Self {
            symbol,
            side,
            order_type: OrderType::Market,
            volume,
            price: None,
            strategy_name: None,
            remark: None,
        }
    }

    /// Validate the request.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a zero or oversized volume, a price
    /// outside `(0, MAX_ORDER_PRICE]`, or a limit order without a price.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.volume == 0 {
            return Err(GatewayError::validation("volume must be positive"));
        }
        if self.volume > MAX_ORDER_VOLUME {
            return Err(GatewayError::validation(format!(
                "volume exceeds {MAX_ORDER_VOLUME}"
            )));
        }
        if let Some(price) = self.price {
            if price <= Decimal::ZERO {
                return Err(GatewayError::validation("price must be positive"));
            }
            if price > MAX_ORDER_PRICE {
                return Err(GatewayError::validation(format!(
                    "price exceeds {MAX_ORDER_PRICE}"
                )));
            }
        }
        if self.order_type == OrderType::Limit && self.price.is_none() {
            return Err(GatewayError::validation("limit orders require a price"));
        }
        Ok(())
    }

    /// Notional value at the given price, or `None` if it does not fit in
    /// a `Decimal`.
    #[must_use]
    pub fn notional(&self, price: Decimal) -> Option<Decimal> {
        price.checked_mul(Decimal::from(self.volume))
    }
}

/// Order cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRequest {
    /// Order to cancel.
    pub order_id: String,
}

impl CancelRequest {
    /// Validate the request.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty order id.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.order_id.trim().is_empty() {
            return Err(GatewayError::validation("order_id must not be empty"));
        }
        Ok(())
    }
}

// =============================================================================
// Responses
// =============================================================================

/// Result of an order submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResponse {
    /// Backend order id.
    pub order_id: String,
    /// Instrument.
    pub symbol: Symbol,
    /// Side.
    pub side: OrderSide,
    /// Quantity.
    pub volume: u64,
    /// Price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    /// Status after submission.
    pub status: OrderStatus,
    /// Submission time.
    pub submitted_at: DateTime<Utc>,
    /// True when the order was blocked by the mode gate and never reached
    /// the backend.
    #[serde(default)]
    pub intercepted: bool,
    /// Human-readable note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Result of an order cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResponse {
    /// Order that was targeted.
    pub order_id: String,
    /// Whether the cancellation was accepted.
    pub success: bool,
    /// True when the cancellation was blocked by the mode gate.
    #[serde(default)]
    pub intercepted: bool,
    /// Human-readable note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Account summary returned on connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Account id.
    pub account_id: AccountId,
    /// Account type, e.g. `STOCK`.
    pub account_type: String,
    /// Total cash balance.
    pub balance: Decimal,
    /// Cash available for new orders.
    pub available_balance: Decimal,
    /// Cash frozen by open orders.
    pub frozen_balance: Decimal,
    /// Market value of positions.
    pub market_value: Decimal,
    /// Cash plus market value.
    pub total_asset: Decimal,
}

/// Asset snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetInfo {
    /// Cash plus market value.
    pub total_asset: Decimal,
    /// Market value of positions.
    pub market_value: Decimal,
    /// Cash available for new orders.
    pub cash: Decimal,
    /// Cash frozen by open orders.
    pub frozen_cash: Decimal,
    /// Unrealized profit and loss.
    pub profit_loss: Decimal,
}

/// One holding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionInfo {
    /// Instrument.
    pub symbol: Symbol,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Shares held.
    pub volume: u64,
    /// Shares that can be sold now.
    pub available_volume: u64,
    /// Average cost.
    pub cost_price: Decimal,
    /// Last mark.
    pub market_price: Decimal,
    /// `volume * market_price`.
    pub market_value: Decimal,
    /// `(market_price - cost_price) * volume`.
    pub profit_loss: Decimal,
}

/// An order known to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderInfo {
    /// Backend order id.
    pub order_id: String,
    /// Instrument.
    pub symbol: Symbol,
    /// Side.
    pub side: OrderSide,
    /// Type.
    pub order_type: OrderType,
    /// Quantity.
    pub volume: u64,
    /// Price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    /// Quantity executed so far.
    pub filled_volume: u64,
    /// Status.
    pub status: OrderStatus,
    /// Submission time.
    pub submitted_at: DateTime<Utc>,
}

/// An execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeInfo {
    /// Backend trade id.
    pub trade_id: String,
    /// Order that produced it.
    pub order_id: String,
    /// Instrument.
    pub symbol: Symbol,
    /// Side.
    pub side: OrderSide,
    /// Executed quantity.
    pub volume: u64,
    /// Executed price.
    pub price: Decimal,
    /// Execution time.
    pub traded_at: DateTime<Utc>,
}

/// Exposure ratios derived from an asset snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSnapshot {
    /// Total asset the ratios are relative to.
    pub total_asset: Decimal,
    /// `market_value / total_asset`.
    pub position_ratio: Decimal,
    /// `cash / total_asset`.
    pub cash_ratio: Decimal,
}

impl RiskSnapshot {
    /// Derive ratios from an asset snapshot. Ratios are zero when the
    /// account holds nothing.
    #[must_use]
    pub fn from_asset(asset: &AssetInfo) -> Self {
        let ratio = |part: Decimal| {
            if asset.total_asset.is_zero() {
                Decimal::ZERO
            } else {
                (part / asset.total_asset).round_dp(4)
            }
        };
        Self {
            total_asset: asset.total_asset,
            position_ratio: ratio(asset.market_value),
            cash_ratio: ratio(asset.cash),
        }
    }
}

// =============================================================================
// Trading Events
// =============================================================================

/// What happened on an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TradingEventKind {
    /// A session connected.
    Connected,
    /// A session disconnected.
    Disconnected,
    /// An order changed.
    Order(OrderInfo),
    /// An execution happened.
    Trade(TradeInfo),
    /// A position changed.
    Position(PositionInfo),
    /// The asset snapshot changed.
    Asset(AssetInfo),
    /// An order submission failed.
    OrderError {
        /// Backend order id, if one was assigned.
        order_id: Option<String>,
        /// Error text.
        message: String,
    },
    /// A cancellation failed.
    CancelError {
        /// Targeted order.
        order_id: String,
        /// Error text.
        message: String,
    },
}

/// A trading callback fanned out to event subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingEvent {
    /// Account the event belongs to.
    pub account_id: AccountId,
    /// Event time.
    pub timestamp: DateTime<Utc>,
    /// Event body.
    #[serde(flatten)]
    pub kind: TradingEventKind,
}

impl TradingEvent {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn now(account_id: AccountId, kind: TradingEventKind) -> Self {
        Self {
            account_id,
            timestamp: Utc::now(),
            kind,
        }
    }
}
