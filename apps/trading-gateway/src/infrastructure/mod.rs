//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the process plumbing around them.

/// SDK sidecar adapters (HTTP trading backend, WebSocket feed).
pub mod bridge;

/// Broadcast hub for trading events.
pub mod broadcast;

/// Configuration from the environment.
pub mod config;

/// Upstream feed supervision.
pub mod feed;

/// Health check HTTP endpoint.
pub mod health;

/// REST and WebSocket delivery surface.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// In-process simulation for mock mode.
pub mod simulation;

/// OpenTelemetry tracing integration.
pub mod telemetry;
