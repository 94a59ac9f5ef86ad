//! Prometheus Metrics Module
//!
//! Exposes gateway metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Ticks**: published, delivered and dropped ticks
//! - **Subscriptions**: created/removed counters and the active gauge
//! - **Sessions**: opened/closed/evicted counters and the active gauge
//! - **Trading**: calls by operation and outcome, intercepted mutations,
//!   call latency
//! - **Feed**: connection state and reconnect attempts
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! before [`init_metrics`] is a no-op.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::error::GatewayError;
use crate::domain::mode::Mode;
use crate::domain::subscription::PublishReport;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Later calls return the same handle.
///
/// # Errors
///
/// Returns an error if another recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "gateway_ticks_published_total",
        "Ticks received from the upstream feed"
    );
    describe_counter!(
        "gateway_ticks_enqueued_total",
        "Ticks accepted into subscriber queues"
    );
    describe_counter!(
        "gateway_ticks_dropped_total",
        "Ticks dropped by subscriber overflow policies"
    );
    describe_counter!(
        "gateway_ticks_delivered_total",
        "Ticks pulled by consumers"
    );

    describe_counter!(
        "gateway_subscriptions_created_total",
        "Subscriptions created"
    );
    describe_counter!(
        "gateway_subscriptions_removed_total",
        "Subscriptions removed"
    );
    describe_gauge!("gateway_subscriptions_active", "Active subscriptions");

    describe_counter!("gateway_sessions_opened_total", "Sessions opened");
    describe_counter!("gateway_sessions_closed_total", "Sessions closed");
    describe_counter!(
        "gateway_sessions_evicted_total",
        "Sessions closed by the idle sweeper"
    );
    describe_gauge!("gateway_sessions_active", "Live sessions");

    describe_counter!(
        "gateway_trading_calls_total",
        "Trading calls by operation and outcome"
    );
    describe_counter!(
        "gateway_orders_intercepted_total",
        "Mutations intercepted in dev mode"
    );
    describe_histogram!(
        "gateway_trading_call_seconds",
        "Trading call duration including the session lane wait"
    );

    describe_gauge!(
        "gateway_feed_connected",
        "Whether the upstream feed is connected (1) or not (0)"
    );
    describe_counter!(
        "gateway_feed_reconnects_total",
        "Upstream feed reconnection attempts"
    );
    describe_counter!("gateway_feed_errors_total", "Upstream feed errors by type");
}

// =============================================================================
// Ticks and Subscriptions
// =============================================================================

/// Record one published tick and its fan-out result.
pub fn record_tick_published(report: PublishReport) {
    counter!("gateway_ticks_published_total").increment(1);
    counter!("gateway_ticks_enqueued_total").increment(report.accepted as u64);
    if report.dropped > 0 {
        counter!("gateway_ticks_dropped_total").increment(report.dropped as u64);
    }
}

/// Record a tick handed to a consumer.
pub fn record_tick_delivered() {
    counter!("gateway_ticks_delivered_total").increment(1);
}

/// Record a new subscription.
pub fn record_subscription_created() {
    counter!("gateway_subscriptions_created_total").increment(1);
}

/// Record removed subscriptions.
pub fn record_subscription_removed(count: usize) {
    counter!("gateway_subscriptions_removed_total").increment(count as u64);
}

/// Update the active subscription gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_subscriptions(count: usize) {
    gauge!("gateway_subscriptions_active").set(count as f64);
}

// =============================================================================
// Sessions and Trading
// =============================================================================

/// Record an opened session.
pub fn record_session_opened(mode: Mode) {
    counter!("gateway_sessions_opened_total", "mode" => mode.as_str()).increment(1);
}

/// Record a released session.
pub fn record_session_closed(mode: Mode) {
    counter!("gateway_sessions_closed_total", "mode" => mode.as_str()).increment(1);
}

/// Record an idle eviction.
pub fn record_session_evicted() {
    counter!("gateway_sessions_evicted_total").increment(1);
}

/// Update the live session gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_sessions(count: usize) {
    gauge!("gateway_sessions_active").set(count as f64);
}

/// Record a trading call outcome and its duration.
pub fn record_trading_call<T>(
    operation: &'static str,
    result: &Result<T, GatewayError>,
    elapsed: Duration,
) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.code(),
    };
    counter!(
        "gateway_trading_calls_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
    histogram!("gateway_trading_call_seconds", "operation" => operation)
        .record(elapsed.as_secs_f64());
}

/// Record a dev-mode interception.
pub fn record_intercepted(operation: &'static str) {
    counter!("gateway_orders_intercepted_total", "operation" => operation).increment(1);
}

// =============================================================================
// Feed
// =============================================================================

/// Update the feed connection gauge.
pub fn set_feed_connected(feed: &'static str, connected: bool) {
    gauge!("gateway_feed_connected", "feed" => feed).set(if connected { 1.0 } else { 0.0 });
}

/// Record a reconnection attempt.
pub fn record_feed_reconnect(feed: &'static str) {
    counter!("gateway_feed_reconnects_total", "feed" => feed).increment(1);
}

/// Record a feed error.
pub fn record_feed_error(feed: &'static str, error_type: &'static str) {
    counter!(
        "gateway_feed_errors_total",
        "feed" => feed,
        "error_type" => error_type
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_a_no_op() {
        record_tick_published(PublishReport {
            matched: 2,
            accepted: 1,
            dropped: 1,
        });
        record_trading_call::<()>("account", &Err(GatewayError::validation("x")), Duration::ZERO);
        set_feed_connected("simulated", true);
    }

    #[test]
    fn handle_is_absent_before_init() {
        // Other tests never install a recorder.
        assert!(get_metrics_handle().is_none());
    }
}
