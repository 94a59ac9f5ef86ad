//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `SessionRegistry`: owns backend connections and their execution lanes
//! - `ModeGate`: mock/dev/prod handling of mutating calls
//! - `TradingService`: session-scoped trading operations
//! - `SubscriptionService`: subscription glue for the delivery surfaces

mod mode_gate;
mod session_registry;
mod subscriptions;
mod trading;

pub use mode_gate::ModeGate;
pub use session_registry::{SessionConfig, SessionRegistry};
pub use subscriptions::{FeedControl, SubscribeRequest, SubscriptionService};
pub use trading::{Connected, TradingService};
