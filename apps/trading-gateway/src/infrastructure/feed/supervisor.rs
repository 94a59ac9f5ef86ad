//! Feed Supervisor
//!
//! Keeps one upstream feed connection alive and pumps its ticks into the
//! [`SubscriptionManager`].
//!
//! - Connects through a [`FeedConnector`], reconnecting with backoff.
//! - Watches for silence with a [`HeartbeatMonitor`].
//! - Keeps the upstream symbol set (and the whole-market switch) equal to
//!   the manager's active interest, re-reading it whenever [`FeedControl`]
//!   signals a change.
//! - When an established connection is lost, marks every subscription
//!   stale so consumers see an end-of-stream marker instead of silence.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatMonitor, HeartbeatState};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::state::{ConnectionState, FeedState};
use crate::application::ports::{FeedConnector, FeedError, FeedMessage, FeedStream};
use crate::application::services::FeedControl;
use crate::domain::streaming::Symbol;
use crate::domain::subscription::{SubscriptionChanges, SubscriptionManager};
use crate::infrastructure::metrics;

/// Supervisor errors.
#[derive(Debug, thiserror::Error)]
pub enum FeedSupervisorError {
    /// Reconnect attempts were exhausted.
    #[error("feed {feed} gave up after {attempts} reconnect attempts")]
    ReconnectExhausted {
        /// Feed adapter name.
        feed: &'static str,
        /// Attempts made.
        attempts: u32,
    },
}

/// What the current upstream connection has been asked to carry.
#[derive(Debug, Default)]
struct Upstream {
    symbols: BTreeSet<Symbol>,
    whole_market: bool,
}

/// Supervises the upstream market data feed.
pub struct FeedSupervisor {
    connector: Arc<dyn FeedConnector>,
    manager: Arc<SubscriptionManager>,
    control: Arc<FeedControl>,
    state: Arc<FeedState>,
    reconnect: ReconnectConfig,
    heartbeat: HeartbeatConfig,
    cancel: CancellationToken,
}

impl FeedSupervisor {
    /// Create a supervisor.
    #[must_use]
    pub const fn new(
        connector: Arc<dyn FeedConnector>,
        manager: Arc<SubscriptionManager>,
        control: Arc<FeedControl>,
        state: Arc<FeedState>,
        reconnect: ReconnectConfig,
        heartbeat: HeartbeatConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            connector,
            manager,
            control,
            state,
            reconnect,
            heartbeat,
            cancel,
        }
    }

    /// Run until cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error once reconnect attempts are exhausted.
    pub async fn run(self) -> Result<(), FeedSupervisorError> {
        let feed = self.connector.name();
        let mut policy = ReconnectPolicy::new(self.reconnect);
        self.state.set_state(ConnectionState::Connecting);

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let mut established = false;
            match self.connect_and_run(&mut established, &mut policy).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(feed, error = %e, established, "Feed connection error");
                    metrics::record_feed_error(feed, error_kind(&e));
                    self.state.record_error(e.to_string());
                    if established {
                        self.on_connection_lost();
                    }
                }
            }

            let Some(delay) = policy.next_delay() else {
                self.state.set_state(ConnectionState::Failed);
                return Err(FeedSupervisorError::ReconnectExhausted {
                    feed,
                    attempts: policy.attempt_count(),
                });
            };

            self.state.set_state(ConnectionState::Reconnecting);
            self.state.increment_reconnect_attempts();
            metrics::record_feed_reconnect(feed);
            tracing::info!(
                feed,
                attempt = policy.attempt_count(),
                delay_ms = delay.as_millis(),
                "Reconnecting to feed"
            );

            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.state.set_state(ConnectionState::Disconnected);
        metrics::set_feed_connected(feed, false);
        tracing::info!(feed, "Feed supervisor stopped");
        Ok(())
    }

    async fn connect_and_run(
        &self,
        established: &mut bool,
        policy: &mut ReconnectPolicy,
    ) -> Result<(), FeedError> {
        let feed = self.connector.name();

        let mut stream = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            stream = self.connector.connect() => stream?,
        };

        *established = true;
        policy.reset();
        self.state.set_state(ConnectionState::Connected);
        metrics::set_feed_connected(feed, true);
        tracing::info!(feed, "Feed connected");

        let mut upstream = Upstream::default();
        self.reconcile(stream.as_mut(), &mut upstream).await?;

        let heartbeat_state = Arc::new(HeartbeatState::new());
        let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel::<HeartbeatEvent>(1);
        let heartbeat_cancel = self.cancel.child_token();
        let _heartbeat_guard = heartbeat_cancel.clone().drop_guard();
        tokio::spawn(
            HeartbeatMonitor::new(
                self.heartbeat,
                Arc::clone(&heartbeat_state),
                heartbeat_tx,
                heartbeat_cancel,
            )
            .run(),
        );

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return Ok(()),
                event = heartbeat_rx.recv() => {
                    return Err(match event {
                        Some(HeartbeatEvent::Timeout { silent_for }) => FeedError::Transport(
                            format!("no data for {}ms", silent_for.as_millis()),
                        ),
                        None => FeedError::Closed,
                    });
                }
                () = self.control.wait() => {
                    self.reconcile(stream.as_mut(), &mut upstream).await?;
                }
                message = stream.next_message() => {
                    heartbeat_state.record_activity();
                    match message? {
                        FeedMessage::Tick(tick) => {
                            self.state.increment_ticks();
                            let report = self.manager.publish(tick);
                            metrics::record_tick_published(report);
                        }
                        FeedMessage::Heartbeat => {}
                    }
                }
            }
        }
    }

    /// Bring the upstream subscriptions in line with the manager's active
    /// interest.
    async fn reconcile(
        &self,
        stream: &mut dyn FeedStream,
        upstream: &mut Upstream,
    ) -> Result<(), FeedError> {
        let desired = self.manager.active_symbols();
        let whole_market = self.manager.wants_whole_market();
        let changes = SubscriptionChanges {
            subscribe: desired.difference(&upstream.symbols).cloned().collect(),
            unsubscribe: upstream.symbols.difference(&desired).cloned().collect(),
            whole_market: (whole_market != upstream.whole_market).then_some(whole_market),
        };
        if changes.is_empty() {
            return Ok(());
        }

        stream.update_subscriptions(&changes).await?;
        tracing::debug!(
            feed = self.connector.name(),
            added = changes.subscribe.len(),
            removed = changes.unsubscribe.len(),
            total = desired.len(),
            whole_market,
            "Upstream subscriptions updated"
        );
        self.state.set_upstream_symbols(desired.len());
        *upstream = Upstream {
            symbols: desired,
            whole_market,
        };
        Ok(())
    }

    fn on_connection_lost(&self) {
        let feed = self.connector.name();
        metrics::set_feed_connected(feed, false);
        self.state.set_upstream_symbols(0);
        let loss = self.manager.feed_lost();
        metrics::set_active_subscriptions(self.manager.stats().active_count);
        tracing::warn!(
            feed,
            affected = loss.affected,
            "Feed lost, subscriptions marked stale"
        );
    }
}

const fn error_kind(error: &FeedError) -> &'static str {
    match error {
        FeedError::ConnectionFailed(_) => "connect",
        FeedError::Closed => "closed",
        FeedError::Protocol(_) => "protocol",
        FeedError::Transport(_) => "transport",
    }
}
