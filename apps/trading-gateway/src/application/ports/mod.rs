//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `TradingBackend` / `BackendConnection`: the wrapped trading SDK
//! - `FeedConnector` / `FeedStream`: the upstream market data feed
//! - `TradingEventSink`: fan-out of account callbacks

use std::fmt;

use async_trait::async_trait;

use crate::domain::error::BackendError;
use crate::domain::session::{AccountCredentials, AccountId};
use crate::domain::streaming::Tick;
use crate::domain::subscription::SubscriptionChanges;
use crate::domain::trading::{
    AccountInfo, AssetInfo, CancelRequest, CancelResponse, OrderInfo, OrderRequest, OrderResponse,
    PositionInfo, TradeInfo, TradingEvent,
};

// =============================================================================
// Trading Backend
// =============================================================================

/// Which kind of backend an adapter talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// In-process deterministic simulation.
    Simulated,
    /// A real trading system.
    Live,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simulated => f.write_str("simulated"),
            Self::Live => f.write_str("live"),
        }
    }
}

/// Opens backend connections for accounts.
#[async_trait]
pub trait TradingBackend: Send + Sync {
    /// What this backend is.
    fn kind(&self) -> BackendKind;

    /// Open a new, exclusively owned connection for an account.
    async fn open(
        &self,
        account_id: &AccountId,
        credentials: &AccountCredentials,
    ) -> Result<Box<dyn BackendConnection>, BackendError>;
}

/// One live backend connection. Not assumed safe for concurrent use.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackendConnection: Send {
    /// Account summary.
    async fn account(&mut self) -> Result<AccountInfo, BackendError>;

    /// Asset snapshot.
    async fn asset(&mut self) -> Result<AssetInfo, BackendError>;

    /// Current holdings.
    async fn positions(&mut self) -> Result<Vec<PositionInfo>, BackendError>;

    /// Orders placed today.
    async fn orders(&mut self) -> Result<Vec<OrderInfo>, BackendError>;

    /// Executions today.
    async fn trades(&mut self) -> Result<Vec<TradeInfo>, BackendError>;

    /// Submit an order.
    async fn submit_order(&mut self, request: &OrderRequest)
    -> Result<OrderResponse, BackendError>;

    /// Cancel an order.
    async fn cancel_order(
        &mut self,
        request: &CancelRequest,
    ) -> Result<CancelResponse, BackendError>;

    /// Release the connection.
    async fn close(&mut self) -> Result<(), BackendError>;
}

// =============================================================================
// Market Data Feed
// =============================================================================

/// Errors raised by a feed adapter.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The connection could not be established.
    #[error("feed connection failed: {0}")]
    ConnectionFailed(String),

    /// The connection ended.
    #[error("feed connection closed")]
    Closed,

    /// A frame could not be decoded.
    #[error("feed protocol error: {0}")]
    Protocol(String),

    /// The transport failed mid-stream.
    #[error("feed transport error: {0}")]
    Transport(String),
}

/// One item read from the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMessage {
    /// A market data update.
    Tick(Tick),
    /// Liveness signal with no data.
    Heartbeat,
}

/// Opens connections to the upstream feed.
#[async_trait]
pub trait FeedConnector: Send + Sync {
    /// Short name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Open a new feed connection.
    async fn connect(&self) -> Result<Box<dyn FeedStream>, FeedError>;
}

/// An open feed connection.
#[async_trait]
pub trait FeedStream: Send {
    /// Read the next message. Must be cancel-safe.
    async fn next_message(&mut self) -> Result<FeedMessage, FeedError>;

    /// Apply upstream subscription changes.
    async fn update_subscriptions(&mut self, changes: &SubscriptionChanges)
    -> Result<(), FeedError>;
}

// =============================================================================
// Trading Events
// =============================================================================

/// Receives account callbacks for fan-out.
pub trait TradingEventSink: Send + Sync {
    /// Publish an event. Never blocks.
    fn publish(&self, event: TradingEvent);
}
