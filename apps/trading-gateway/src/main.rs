//! Trading Gateway Binary
//!
//! Starts the gateway: feed supervisor, session registry, REST/WebSocket
//! API and health server.
//!
//! # Usage
//!
//! ```bash
//! APP_MODE=mock cargo run --bin trading-gateway
//! ```
//!
//! # Environment Variables
//!
//! ## Mode
//! - `APP_MODE`: mock | dev | prod (default: dev)
//! - `GATEWAY_ALLOW_REAL_TRADING`: must be `true` for prod
//!
//! ## Required in dev/prod
//! - `GATEWAY_BACKEND_URL`: SDK sidecar HTTP base URL
//! - `GATEWAY_FEED_URL`: SDK sidecar market data WebSocket URL
//!
//! ## Optional
//! - `GATEWAY_HTTP_PORT`: REST/WebSocket port (default: 8000)
//! - `GATEWAY_HEALTH_PORT`: health and metrics port (default: 8082)
//! - `GATEWAY_BRIDGE_TOKEN`: bearer token sent to the sidecar
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: enables OTLP trace export
//! - `LOG_FORMAT`: plain | json (default: plain)
//! - `RUST_LOG`: log filter (default: `trading_gateway=info`)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use trading_gateway::application::ports::{FeedConnector, TradingBackend};
use trading_gateway::application::services::{
    FeedControl, ModeGate, SessionRegistry, SubscriptionService, TradingService,
};
use trading_gateway::domain::subscription::SubscriptionManager;
use trading_gateway::infrastructure::bridge::{HttpBridgeBackend, WsBridgeFeed};
use trading_gateway::infrastructure::broadcast::TradingEventHub;
use trading_gateway::infrastructure::config::GatewayConfig;
use trading_gateway::infrastructure::feed::{
    FeedState, FeedSupervisor, HeartbeatConfig, ReconnectConfig,
};
use trading_gateway::infrastructure::health::{HealthServer, HealthServerState};
use trading_gateway::infrastructure::http::{ApiServer, AppState};
use trading_gateway::infrastructure::simulation::{SimulatedBackend, SimulatedFeed};
use trading_gateway::infrastructure::{metrics, telemetry};

/// Graceful shutdown timeout for each open session.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("failed to install rustls crypto provider");
    }

    load_dotenv();

    let _telemetry_guard = telemetry::init().context("telemetry initialization failed")?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting trading gateway");

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed");
    }

    let config = GatewayConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown = CancellationToken::new();

    // Trading events
    let events = Arc::new(TradingEventHub::with_defaults());

    // Backend and feed for the configured mode
    let (backend, connector) = build_adapters(&config, &events)?;
    let gate = Arc::new(ModeGate::new(config.mode));
    gate.check_backend(backend.kind())
        .context("backend does not match mode")?;

    // Sessions
    let registry = Arc::new(SessionRegistry::new(
        backend,
        config.mode,
        config.sessions.registry_config(),
    ));
    let sweeper = registry.spawn_idle_sweeper(config.sessions.sweep_interval, shutdown.child_token());
    let trading = Arc::new(
        TradingService::new(Arc::clone(&registry), gate, config.sessions.call_timeout)
            .with_events(Arc::clone(&events) as _),
    );

    // Subscriptions and feed
    let manager = Arc::new(SubscriptionManager::new(
        config.subscriptions.manager_config(),
    ));
    let feed_control = Arc::new(FeedControl::new());
    let subscriptions = Arc::new(SubscriptionService::new(
        Arc::clone(&manager),
        Arc::clone(&feed_control),
        config.subscriptions.pull_timeout,
    ));

    let feed_state = Arc::new(FeedState::new(connector.name()));
    let supervisor = FeedSupervisor::new(
        connector,
        Arc::clone(&manager),
        feed_control,
        Arc::clone(&feed_state),
        ReconnectConfig::from(&config.feed),
        HeartbeatConfig::for_timeout(config.feed.heartbeat_timeout),
        shutdown.child_token(),
    );
    tokio::spawn(async move {
        if let Err(e) = supervisor.run().await {
            tracing::error!(error = %e, "Feed supervisor stopped");
        }
    });

    // Health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION"),
        config.mode,
        Some(feed_state),
        Arc::clone(&registry),
        Arc::clone(&manager),
    ));
    let health_server = HealthServer::new(config.server.health_port, health_state, shutdown.clone());
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    // API server
    let api_server = ApiServer::new(
        config.server.http_port,
        AppState {
            trading,
            subscriptions,
            events,
            shutdown: shutdown.clone(),
        },
    );
    let api_shutdown = shutdown.clone();
    let api = tokio::spawn(async move {
        if let Err(e) = api_server.run().await {
            tracing::error!(error = %e, "API server error");
            api_shutdown.cancel();
        }
    });

    tracing::info!(mode = %config.mode, "Trading gateway ready");

    await_shutdown(shutdown).await;

    let _ = api.await;
    let _ = sweeper.await;
    registry.close_all(SHUTDOWN_TIMEOUT).await;

    tracing::info!("Trading gateway stopped");
    Ok(())
}

/// Pick the backend and feed for the configured mode.
fn build_adapters(
    config: &GatewayConfig,
    events: &Arc<TradingEventHub>,
) -> anyhow::Result<(Arc<dyn TradingBackend>, Arc<dyn FeedConnector>)> {
    if config.mode.is_simulated() {
        let backend = SimulatedBackend::new().with_events(Arc::clone(events) as _);
        let feed = SimulatedFeed::from(&config.mock);
        return Ok((Arc::new(backend), Arc::new(feed)));
    }

    let backend_url = config
        .bridge
        .backend_url
        .as_deref()
        .context("GATEWAY_BACKEND_URL is required")?;
    let feed_url = config
        .bridge
        .feed_url
        .as_deref()
        .context("GATEWAY_FEED_URL is required")?;

    let backend = HttpBridgeBackend::new(
        backend_url,
        config.bridge.api_token.clone(),
        config.sessions.call_timeout,
    )
    .context("failed to build bridge backend")?;
    let feed = WsBridgeFeed::new(feed_url, config.bridge.api_token.clone());
    Ok((Arc::new(backend), Arc::new(feed)))
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &GatewayConfig) {
    tracing::info!(
        mode = %config.mode,
        http_port = config.server.http_port,
        health_port = config.server.health_port,
        queue_capacity = config.subscriptions.queue_capacity,
        overflow_policy = %config.subscriptions.overflow_policy,
        max_sessions = config.sessions.max_sessions,
        "Configuration loaded"
    );
    tracing::debug!(bridge = ?config.bridge, "Bridge endpoints");
}

/// Wait for shutdown signal (SIGTERM or SIGINT), or for an internal
/// component to cancel the token.
async fn await_shutdown(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = shutdown.cancelled() => {
            tracing::info!("Internal shutdown requested");
        }
    }

    shutdown.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
