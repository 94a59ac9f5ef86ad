//! Feed connection state shared between the supervisor and the health
//! endpoints.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

/// Connection state of the upstream feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not connected and not trying.
    Disconnected,
    /// First connection attempt in progress.
    Connecting,
    /// Receiving data.
    Connected,
    /// Waiting to retry after a failure.
    Reconnecting,
    /// Gave up after exhausting reconnect attempts.
    Failed,
}

/// Live feed status, updated by the supervisor.
#[derive(Debug)]
pub struct FeedState {
    name: &'static str,
    state: RwLock<ConnectionState>,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
    ever_connected: AtomicBool,
    reconnect_attempts: AtomicU32,
    ticks_received: AtomicU64,
    upstream_symbols: AtomicU64,
}

/// Serializable snapshot of [`FeedState`].
#[derive(Debug, Clone, Serialize)]
pub struct FeedStatus {
    /// Feed adapter name.
    pub name: &'static str,
    /// Connection state.
    pub state: ConnectionState,
    /// Whether the feed is connected now.
    pub connected: bool,
    /// Last successful connect.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Most recent error.
    pub last_error: Option<String>,
    /// Attempts since the last successful connect.
    pub reconnect_attempts: u32,
    /// Ticks received since start.
    pub ticks_received: u64,
    /// Symbols currently subscribed upstream.
    pub upstream_symbols: u64,
}

impl FeedState {
    /// Create a disconnected feed state.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            state: RwLock::new(ConnectionState::Disconnected),
            last_connected_at: RwLock::new(None),
            last_error: RwLock::new(None),
            ever_connected: AtomicBool::new(false),
            reconnect_attempts: AtomicU32::new(0),
            ticks_received: AtomicU64::new(0),
            upstream_symbols: AtomicU64::new(0),
        }
    }

    /// Feed adapter name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Set the connection state.
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
        if state == ConnectionState::Connected {
            *self.last_connected_at.write() = Some(Utc::now());
            *self.last_error.write() = None;
            self.ever_connected.store(true, Ordering::Relaxed);
            self.reconnect_attempts.store(0, Ordering::Relaxed);
        }
    }

    /// Record an error without changing the state.
    pub fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write() = Some(message.into());
    }

    /// Count a reconnect attempt.
    pub fn increment_reconnect_attempts(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a received tick.
    pub fn increment_ticks(&self) {
        self.ticks_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Update the upstream symbol count.
    pub fn set_upstream_symbols(&self, count: usize) {
        self.upstream_symbols
            .store(u64::try_from(count).unwrap_or(u64::MAX), Ordering::Relaxed);
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Whether the feed is connected now.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Whether the feed connected at least once.
    #[must_use]
    pub fn ever_connected(&self) -> bool {
        self.ever_connected.load(Ordering::Relaxed)
    }

    /// Snapshot for reporting.
    #[must_use]
    pub fn status(&self) -> FeedStatus {
        let state = self.state();
        FeedStatus {
            name: self.name,
            state,
            connected: state == ConnectionState::Connected,
            last_connected_at: *self.last_connected_at.read(),
            last_error: self.last_error.read().clone(),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            ticks_received: self.ticks_received.load(Ordering::Relaxed),
            upstream_symbols: self.upstream_symbols.load(Ordering::Relaxed),
        }
    }
}
