//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for the trading backend, the feed and event fan-out.
pub mod ports;

/// Session, mode gate, trading and subscription services.
pub mod services;
