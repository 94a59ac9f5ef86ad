//! Domain Layer - Core gateway types and coordination logic.
//!
//! This layer holds the tick and trading data types, the error taxonomy,
//! and the subscription fan-out. Nothing here performs I/O.

/// Gateway error taxonomy.
pub mod error;

/// Process-wide trading mode.
pub mod mode;

/// Session identifiers and state.
pub mod session;

/// Tick types.
pub mod streaming;

/// Subscription fan-out and bounded queues.
pub mod subscription;

/// Trading request/response DTOs and events.
pub mod trading;
