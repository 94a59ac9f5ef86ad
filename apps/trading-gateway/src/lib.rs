#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Trading Gateway - Session-Scoped Trading and Market Data Fan-Out
//!
//! Fronts a trading/market-data backend that is not safe for concurrent
//! use. One upstream tick feed is fanned out to many bounded subscriber
//! queues, and every trading session owns exactly one backend connection
//! whose calls are serialized.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: data types and the subscription fan-out
//!   - `streaming`: symbols and ticks
//!   - `subscription`: subscription manager and bounded queues
//!   - `session`, `trading`, `mode`, `error`
//!
//! - **Application**: use cases and port definitions
//!   - `ports`: trading backend, feed and event sink interfaces
//!   - `services`: session registry, mode gate, trading and subscription
//!     services
//!
//! - **Infrastructure**: adapters and external integrations
//!   - `simulation`: mock-mode backend and feed
//!   - `bridge`: dev/prod sidecar backend and feed
//!   - `feed`: supervisor with heartbeat and reconnect
//!   - `http`: REST and WebSocket delivery
//!   - `health`, `metrics`, `telemetry`, `config`, `broadcast`
//!
//! # Data Flow
//!
//! ```text
//! feed ──► FeedSupervisor ──► SubscriptionManager::publish ──► queue A ──► WS / pull
//!                                                          └─► queue B ──► WS / pull
//!
//! REST ──► TradingService ──► SessionRegistry lane ──► ModeGate ──► backend
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::error::{BackendError, GatewayError};
pub use domain::mode::Mode;
pub use domain::session::{AccountCredentials, AccountId, SessionId, SessionInfo, SessionState};
pub use domain::streaming::{Symbol, Tick, TickPayload};
pub use domain::subscription::{
    ConsumerId, Delivery, EndReason, OverflowPolicy, SubscriptionChanges, SubscriptionConfig,
    SubscriptionHandle, SubscriptionId, SubscriptionManager, SubscriptionStats,
};

// Services
pub use application::services::{
    FeedControl, ModeGate, SessionConfig, SessionRegistry, SubscribeRequest, SubscriptionService,
    TradingService,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, GatewayConfig};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
