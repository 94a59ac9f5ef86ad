//! REST and WebSocket Delivery Surface
//!
//! axum router exposing trading sessions, pull-based subscriptions and
//! WebSocket streams.
//!
//! # Routes
//!
//! | Method | Path | Purpose |
//! |--------|------|---------|
//! | POST | `/api/v1/trading/connect` | open a session |
//! | POST | `/api/v1/trading/disconnect/{session_id}` | close a session |
//! | GET | `/api/v1/trading/{account,asset,positions,orders,trades,risk,status}/{session_id}` | queries |
//! | POST | `/api/v1/trading/order/{session_id}` | submit an order |
//! | POST | `/api/v1/trading/cancel/{session_id}` | cancel an order |
//! | POST/GET | `/api/v1/data/subscriptions` | subscribe / list |
//! | GET/DELETE | `/api/v1/data/subscriptions/{id}` | inspect / unsubscribe |
//! | GET | `/api/v1/data/subscriptions/{id}/next?timeout_ms=` | pull one delivery |
//! | WS | `/ws/quote/{subscription_id}` | push quotes |
//! | WS | `/ws/trading?account_id=` | trading events |

mod error;
mod rest;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{SubscriptionService, TradingService};
use crate::infrastructure::broadcast::TradingEventHub;

pub use error::status_for;
pub use rest::DeliveryBody;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Session-scoped trading operations.
    pub trading: Arc<TradingService>,
    /// Subscription operations.
    pub subscriptions: Arc<SubscriptionService>,
    /// Trading event fan-out.
    pub events: Arc<TradingEventHub>,
    /// Cancelled on shutdown; open sockets close when it fires.
    pub shutdown: CancellationToken,
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    let trading = Router::new()
        .route("/connect", post(rest::connect))
        .route("/disconnect/{session_id}", post(rest::disconnect))
        .route("/account/{session_id}", get(rest::account))
        .route("/asset/{session_id}", get(rest::asset))
        .route("/positions/{session_id}", get(rest::positions))
        .route("/orders/{session_id}", get(rest::orders))
        .route("/trades/{session_id}", get(rest::trades))
        .route("/risk/{session_id}", get(rest::risk))
        .route("/status/{session_id}", get(rest::status))
        .route("/order/{session_id}", post(rest::submit_order))
        .route("/cancel/{session_id}", post(rest::cancel_order));

    let data = Router::new()
        .route(
            "/subscriptions",
            post(rest::subscribe).get(rest::list_subscriptions),
        )
        .route(
            "/subscriptions/{id}",
            get(rest::subscription_info).delete(rest::unsubscribe),
        )
        .route("/subscriptions/{id}/next", get(rest::next_delivery));

    Router::new()
        .nest("/api/v1/trading", trading)
        .nest("/api/v1/data", data)
        .route("/ws/quote/{subscription_id}", get(ws::quote_socket))
        .route("/ws/trading", get(ws::trading_socket))
        .with_state(state)
}

/// API HTTP server.
pub struct ApiServer {
    port: u16,
    state: AppState,
}

impl ApiServer {
    /// Create a server. It stops when `state.shutdown` is cancelled.
    #[must_use]
    pub const fn new(port: u16, state: AppState) -> Self {
        Self { port, state }
    }

    /// Serve until shutdown.
    ///
    /// # Errors
    ///
    /// Returns `ApiServerError` if binding fails or the server dies.
    pub async fn run(self) -> Result<(), ApiServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ApiServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "API server listening");

        let shutdown = self.state.shutdown.clone();
        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .map_err(|e| ApiServerError::ServerFailed(e.to_string()))?;

        tracing::info!("API server stopped");
        Ok(())
    }
}

/// API server errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}
