//! Adapters for the SDK sidecar used in dev and prod modes: an HTTP
//! trading backend and a WebSocket market data feed.

mod backend;
mod feed;

pub use backend::{HttpBridgeBackend, HttpBridgeConnection};
pub use feed::WsBridgeFeed;
