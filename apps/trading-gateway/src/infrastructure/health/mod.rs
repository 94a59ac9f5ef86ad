//! Health Check and Metrics Endpoint
//!
//! Separate-port HTTP endpoint for orchestrators and monitoring.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON status: mode, feed, sessions, subscriptions
//! - `GET /healthz` - liveness check (simple OK)
//! - `GET /readyz` - readiness check (feed connected at least once)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::SessionRegistry;
use crate::domain::mode::Mode;
use crate::domain::subscription::{SubscriptionManager, SubscriptionStats};
use crate::infrastructure::feed::{ConnectionState, FeedState, FeedStatus};
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Gateway version.
    pub version: String,
    /// Process-wide trading mode.
    pub mode: Mode,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Upstream feed, if one is configured.
    pub feed: Option<FeedStatus>,
    /// Open trading sessions.
    pub sessions: usize,
    /// Subscription statistics.
    pub subscriptions: SubscriptionStats,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Feed connected (or none configured).
    Healthy,
    /// Feed is reconnecting.
    Degraded,
    /// Feed gave up.
    Unhealthy,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    mode: Mode,
    feed: Option<Arc<FeedState>>,
    sessions: Arc<SessionRegistry>,
    subscriptions: Arc<SubscriptionManager>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: impl Into<String>,
        mode: Mode,
        feed: Option<Arc<FeedState>>,
        sessions: Arc<SessionRegistry>,
        subscriptions: Arc<SubscriptionManager>,
    ) -> Self {
        Self {
            version: version.into(),
            started_at: Instant::now(),
            mode,
            feed,
            sessions,
            subscriptions,
        }
    }

    fn is_ready(&self) -> bool {
        self.feed.as_ref().is_none_or(|feed| feed.ever_connected())
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

/// Build the health router.
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.is_ready() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let feed = state.feed.as_ref().map(|f| f.status());
    HealthResponse {
        status: determine_health_status(feed.as_ref()),
        version: state.version.clone(),
        mode: state.mode,
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        feed,
        sessions: state.sessions.count(),
        subscriptions: state.subscriptions.stats(),
    }
}

fn determine_health_status(feed: Option<&FeedStatus>) -> HealthStatus {
    match feed.map(|f| f.state) {
        None | Some(ConnectionState::Connected) => HealthStatus::Healthy,
        Some(ConnectionState::Failed) => HealthStatus::Unhealthy,
        Some(_) => HealthStatus::Degraded,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
