//! In-process simulation used in mock mode: a trading backend with
//! per-account books and a random-walk market data feed.

mod backend;
mod feed;

pub use backend::{SimulatedBackend, SimulatedConnection};
pub use feed::SimulatedFeed;
