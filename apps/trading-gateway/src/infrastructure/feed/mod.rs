//! Upstream feed supervision: heartbeat detection, reconnect backoff,
//! connection state and the supervisor loop that drives
//! `SubscriptionManager::publish`.

pub mod heartbeat;
pub mod reconnect;
pub mod state;
pub mod supervisor;

pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatMonitor, HeartbeatState};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use state::{ConnectionState, FeedState, FeedStatus};
pub use supervisor::{FeedSupervisor, FeedSupervisorError};
