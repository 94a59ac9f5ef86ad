//! Configuration Module
//!
//! Configuration loading for the gateway service.

mod settings;

pub use settings::{
    BridgeSettings, ConfigError, EnvLookup, FeedSettings, GatewayConfig, MockSettings,
    ServerSettings, SessionSettings, SubscriptionSettings,
};
