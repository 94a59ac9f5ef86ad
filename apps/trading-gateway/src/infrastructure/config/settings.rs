//! Gateway Configuration Settings
//!
//! Configuration types for the trading gateway, loaded from environment
//! variables.

use std::fmt;
use std::time::Duration;

use crate::application::services::SessionConfig;
use crate::domain::mode::Mode;
use crate::domain::streaming::Symbol;
use crate::domain::subscription::{OverflowPolicy, SubscriptionConfig};

/// Source of raw configuration values, keyed by variable name.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// REST and WebSocket port.
    pub http_port: u16,
    /// Health check and metrics port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            http_port: 8000,
            health_port: 8082,
        }
    }
}

/// Subscription fan-out settings.
#[derive(Debug, Clone)]
pub struct SubscriptionSettings {
    /// Capacity of each subscriber queue.
    pub queue_capacity: usize,
    /// Maximum number of registered subscriptions.
    pub max_subscriptions: usize,
    /// Default overflow policy.
    pub overflow_policy: OverflowPolicy,
    /// Default pull timeout for subscriber queues.
    pub pull_timeout: Duration,
    /// Accept whole-market subscriptions.
    pub whole_market_enabled: bool,
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            max_subscriptions: 100,
            overflow_policy: OverflowPolicy::DropOldest,
            pull_timeout: Duration::from_secs(60),
            whole_market_enabled: false,
        }
    }
}

impl SubscriptionSettings {
    /// Limits for the subscription manager.
    #[must_use]
    pub const fn manager_config(&self) -> SubscriptionConfig {
        SubscriptionConfig {
            queue_capacity: self.queue_capacity,
            max_subscriptions: self.max_subscriptions,
            overflow_policy: self.overflow_policy,
            whole_market_enabled: self.whole_market_enabled,
        }
    }
}

/// Session registry settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Maximum live sessions.
    pub max_sessions: usize,
    /// Maximum live sessions per account.
    pub max_sessions_per_account: usize,
    /// Idle time after which a session is evicted.
    pub idle_timeout: Duration,
    /// How often the idle sweep runs.
    pub sweep_interval: Duration,
    /// Deadline for a single trading call, including the lane wait.
    pub call_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_sessions: 64,
            max_sessions_per_account: 4,
            idle_timeout: Duration::from_secs(1800),
            sweep_interval: Duration::from_secs(60),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl SessionSettings {
    /// Limits for the session registry.
    #[must_use]
    pub const fn registry_config(&self) -> SessionConfig {
        SessionConfig {
            max_sessions: self.max_sessions,
            max_sessions_per_account: self.max_sessions_per_account,
            idle_timeout: self.idle_timeout,
        }
    }
}

/// Upstream feed supervision settings.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Silence after which the feed is considered lost.
    pub heartbeat_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(60),
            reconnect_delay_initial: Duration::from_secs(1),
            reconnect_delay_max: Duration::from_secs(64),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 0,
        }
    }
}

/// Endpoints of the SDK bridge used in dev and prod.
#[derive(Clone, Default)]
pub struct BridgeSettings {
    /// Base URL of the trading bridge.
    pub backend_url: Option<String>,
    /// WebSocket URL of the market data bridge.
    pub feed_url: Option<String>,
    /// Optional token sent to the bridge.
    pub api_token: Option<String>,
}

impl fmt::Debug for BridgeSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeSettings")
            .field("backend_url", &self.backend_url)
            .field("feed_url", &self.feed_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Simulated feed settings for mock mode.
#[derive(Debug, Clone)]
pub struct MockSettings {
    /// Symbols the simulated feed quotes.
    pub symbols: Vec<String>,
    /// Interval between simulated ticks.
    pub tick_interval: Duration,
}

impl Default for MockSettings {
    fn default() -> Self {
        Self {
            symbols: ["000001.SZ", "000002.SZ", "600000.SH", "600036.SH"]
                .into_iter()
                .map(String::from)
                .collect(),
            tick_interval: Duration::from_millis(500),
        }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Process-wide trading mode.
    pub mode: Mode,
    /// Explicit opt-in required before prod mode may start.
    pub allow_real_trading: bool,
    /// Server port settings.
    pub server: ServerSettings,
    /// Subscription settings.
    pub subscriptions: SubscriptionSettings,
    /// Session settings.
    pub sessions: SessionSettings,
    /// Feed supervision settings.
    pub feed: FeedSettings,
    /// Bridge endpoints.
    pub bridge: BridgeSettings,
    /// Simulation settings.
    pub mock: MockSettings,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Dev,
            allow_real_trading: false,
            server: ServerSettings::default(),
            subscriptions: SubscriptionSettings::default(),
            sessions: SessionSettings::default(),
            feed: FeedSettings::default(),
            bridge: BridgeSettings::default(),
            mock: MockSettings::default(),
        }
    }
}

impl GatewayConfig {
    /// Create configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting configuration is unusable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key/value source.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting configuration is unusable.
    pub fn from_lookup(env: EnvLookup<'_>) -> Result<Self, ConfigError> {
        let mode = parse_mode(env);

        let server = ServerSettings {
            http_port: parse_env_u16(env, "GATEWAY_HTTP_PORT", ServerSettings::default().http_port),
            health_port: parse_env_u16(
                env,
                "GATEWAY_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        let subscriptions = SubscriptionSettings {
            queue_capacity: parse_env_usize(
                env,
                "GATEWAY_QUEUE_CAPACITY",
                SubscriptionSettings::default().queue_capacity,
            ),
            max_subscriptions: parse_env_usize(
                env,
                "GATEWAY_MAX_SUBSCRIPTIONS",
                SubscriptionSettings::default().max_subscriptions,
            ),
            overflow_policy: env("GATEWAY_OVERFLOW_POLICY")
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            pull_timeout: parse_env_duration_secs(
                env,
                "GATEWAY_SUBSCRIPTION_TIMEOUT_SECS",
                SubscriptionSettings::default().pull_timeout,
            ),
            whole_market_enabled: parse_env_bool(env, "GATEWAY_WHOLE_QUOTE_ENABLED"),
        };

        let sessions = SessionSettings {
            max_sessions: parse_env_usize(
                env,
                "GATEWAY_MAX_SESSIONS",
                SessionSettings::default().max_sessions,
            ),
            max_sessions_per_account: parse_env_usize(
                env,
                "GATEWAY_MAX_SESSIONS_PER_ACCOUNT",
                SessionSettings::default().max_sessions_per_account,
            ),
            idle_timeout: parse_env_duration_secs(
                env,
                "GATEWAY_SESSION_IDLE_TIMEOUT_SECS",
                SessionSettings::default().idle_timeout,
            ),
            sweep_interval: parse_env_duration_secs(
                env,
                "GATEWAY_SESSION_SWEEP_INTERVAL_SECS",
                SessionSettings::default().sweep_interval,
            ),
            call_timeout: parse_env_duration_secs(
                env,
                "GATEWAY_TRADING_TIMEOUT_SECS",
                SessionSettings::default().call_timeout,
            ),
        };

        let feed = FeedSettings {
            heartbeat_timeout: parse_env_duration_secs(
                env,
                "GATEWAY_FEED_HEARTBEAT_TIMEOUT_SECS",
                FeedSettings::default().heartbeat_timeout,
            ),
            reconnect_delay_initial: parse_env_duration_millis(
                env,
                "GATEWAY_RECONNECT_DELAY_INITIAL_MS",
                FeedSettings::default().reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_env_duration_secs(
                env,
                "GATEWAY_RECONNECT_DELAY_MAX_SECS",
                FeedSettings::default().reconnect_delay_max,
            ),
            reconnect_delay_multiplier: parse_env_f64(
                env,
                "GATEWAY_RECONNECT_DELAY_MULTIPLIER",
                FeedSettings::default().reconnect_delay_multiplier,
            ),
            max_reconnect_attempts: parse_env_u32(
                env,
                "GATEWAY_MAX_RECONNECT_ATTEMPTS",
                FeedSettings::default().max_reconnect_attempts,
            ),
        };

        let bridge = BridgeSettings {
            backend_url: non_empty(env, "GATEWAY_BACKEND_URL"),
            feed_url: non_empty(env, "GATEWAY_FEED_URL"),
            api_token: non_empty(env, "GATEWAY_BRIDGE_TOKEN"),
        };

        let mock = MockSettings {
            symbols: env("GATEWAY_MOCK_SYMBOLS").map_or_else(
                || MockSettings::default().symbols,
                |raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                },
            ),
            tick_interval: parse_env_duration_millis(
                env,
                "GATEWAY_MOCK_TICK_INTERVAL_MS",
                MockSettings::default().tick_interval,
            ),
        };

        let config = Self {
            mode,
            allow_real_trading: parse_env_bool(env, "GATEWAY_ALLOW_REAL_TRADING"),
            server,
            subscriptions,
            sessions,
            feed,
            bridge,
            mock,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field requirements.
    ///
    /// # Errors
    ///
    /// - `MissingEnvVar` when dev/prod lacks a bridge URL
    /// - `RealTradingNotAllowed` when prod is selected without opt-in
    /// - `Invalid` for zero capacities or timeouts
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.mode.is_simulated() {
            if self.bridge.backend_url.is_none() {
                return Err(ConfigError::MissingEnvVar("GATEWAY_BACKEND_URL".to_string()));
            }
            if self.bridge.feed_url.is_none() {
                return Err(ConfigError::MissingEnvVar("GATEWAY_FEED_URL".to_string()));
            }
        }
        if self.mode == Mode::Prod && !self.allow_real_trading {
            return Err(ConfigError::RealTradingNotAllowed);
        }
        if self.subscriptions.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "GATEWAY_QUEUE_CAPACITY must be positive".to_string(),
            ));
        }
        if self.sessions.max_sessions == 0 || self.sessions.max_sessions_per_account == 0 {
            return Err(ConfigError::Invalid("session caps must be positive".to_string()));
        }
        if self.sessions.call_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "GATEWAY_TRADING_TIMEOUT_SECS must be positive".to_string(),
            ));
        }
        if self.mode.is_simulated() && self.mock.symbols.is_empty() {
            return Err(ConfigError::EmptyValue("GATEWAY_MOCK_SYMBOLS".to_string()));
        }
        if let Some(bad) = self.mock.symbols.iter().find(|s| Symbol::parse(s).is_err()) {
            return Err(ConfigError::Invalid(format!(
                "GATEWAY_MOCK_SYMBOLS contains invalid symbol {bad:?}"
            )));
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Prod mode without the explicit opt-in.
    #[error("APP_MODE=prod requires GATEWAY_ALLOW_REAL_TRADING=true")]
    RealTradingNotAllowed,
    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn parse_mode(env: EnvLookup<'_>) -> Mode {
    let Some(raw) = env("APP_MODE") else {
        return Mode::Dev;
    };
    raw.parse().unwrap_or_else(|_| {
        tracing::warn!(value = %raw, "Unrecognized APP_MODE, falling back to dev");
        Mode::Dev
    })
}

fn non_empty(env: EnvLookup<'_>, key: &str) -> Option<String> {
    env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_env_bool(env: EnvLookup<'_>, key: &str) -> bool {
    env(key).is_some_and(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
}

fn parse_env_u16(env: EnvLookup<'_>, key: &str, default: u16) -> u16 {
    env(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_env_u32(env: EnvLookup<'_>, key: &str, default: u32) -> u32 {
    env(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_env_usize(env: EnvLookup<'_>, key: &str, default: usize) -> usize {
    env(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_env_f64(env: EnvLookup<'_>, key: &str, default: f64) -> f64 {
    env(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_env_duration_secs(env: EnvLookup<'_>, key: &str, default: Duration) -> Duration {
    env(key)
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(env: EnvLookup<'_>, key: &str, default: Duration) -> Duration {
    env(key)
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
