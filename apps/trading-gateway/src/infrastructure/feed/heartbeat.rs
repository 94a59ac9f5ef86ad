//! Feed Heartbeat Monitor
//!
//! Detects a silent upstream feed. Every tick or heartbeat frame counts as
//! activity; if nothing arrives within the timeout, the monitor emits
//! [`HeartbeatEvent::Timeout`] and exits so the supervisor can tear the
//! connection down.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    /// How often the monitor checks for silence.
    pub check_interval: Duration,
    /// Silence after which the feed is considered dead.
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self::for_timeout(Duration::from_secs(60))
    }
}

impl HeartbeatConfig {
    /// Configuration checking four times per timeout window.
    #[must_use]
    pub fn for_timeout(timeout: Duration) -> Self {
        Self {
            check_interval: (timeout / 4).max(Duration::from_millis(10)),
            timeout,
        }
    }
}

/// Events emitted by the heartbeat monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// No activity within the timeout.
    Timeout {
        /// Time since the last activity.
        silent_for: Duration,
    },
}

/// Activity tracker shared between the reader and the monitor.
#[derive(Debug)]
pub struct HeartbeatState {
    last_activity: RwLock<Instant>,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatState {
    /// Create state with activity recorded now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_activity: RwLock::new(Instant::now()),
        }
    }

    /// Record activity.
    pub fn record_activity(&self) {
        *self.last_activity.write() = Instant::now();
    }

    /// Time since the last activity.
    #[must_use]
    pub fn silent_for(&self) -> Duration {
        self.last_activity.read().elapsed()
    }
}

/// Watches a [`HeartbeatState`] and reports silence.
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    state: Arc<HeartbeatState>,
    event_tx: mpsc::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
}

impl HeartbeatMonitor {
    /// Create a monitor.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        state: Arc<HeartbeatState>,
        event_tx: mpsc::Sender<HeartbeatEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            event_tx,
            cancel,
        }
    }

    /// Run until cancelled or a timeout is reported.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.config.check_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Heartbeat monitor cancelled");
                    break;
                }
                _ = interval.tick() => {
                    let silent_for = self.state.silent_for();
                    if silent_for > self.config.timeout {
                        tracing::warn!(
                            silent_ms = silent_for.as_millis(),
                            timeout_ms = self.config.timeout.as_millis(),
                            "Feed heartbeat timeout"
                        );
                        let _ = self.event_tx.send(HeartbeatEvent::Timeout { silent_for }).await;
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_interval_is_a_fraction_of_timeout() {
        let config = HeartbeatConfig::for_timeout(Duration::from_secs(60));
        assert_eq!(config.check_interval, Duration::from_secs(15));
        assert_eq!(
            HeartbeatConfig::for_timeout(Duration::from_millis(8)).check_interval,
            Duration::from_millis(10)
        );
    }

    #[test]
    fn activity_resets_silence() {
        let state = HeartbeatState::new();
        std::thread::sleep(Duration::from_millis(20));
        assert!(state.silent_for() >= Duration::from_millis(20));
        state.record_activity();
        assert!(state.silent_for() < Duration::from_millis(20));
    }

    #[tokio::test]
    async fn monitor_reports_silence() {
        let state = Arc::new(HeartbeatState::new());
        let (tx, mut rx) = mpsc::channel(1);
        let monitor = HeartbeatMonitor::new(
            HeartbeatConfig::for_timeout(Duration::from_millis(40)),
            state,
            tx,
            CancellationToken::new(),
        );
        let handle = tokio::spawn(monitor.run());

        let event = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, HeartbeatEvent::Timeout { .. }));
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn activity_keeps_monitor_quiet() {
        let state = Arc::new(HeartbeatState::new());
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let monitor = HeartbeatMonitor::new(
            HeartbeatConfig::for_timeout(Duration::from_millis(60)),
            Arc::clone(&state),
            tx,
            cancel.clone(),
        );
        let handle = tokio::spawn(monitor.run());

        for _ in 0..6 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            state.record_activity();
        }
        assert!(rx.try_recv().is_err());

        cancel.cancel();
        tokio::time::timeout(Duration::from_millis(100), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
