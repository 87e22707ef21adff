//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Quotes**: counts of quotes received, throttled, and stored
//! - **Frames**: malformed frames dropped
//! - **Connection**: status gauge and reconnect counters
//! - **Subscriptions**: active subscription count
//! - **SLA**: first-quote delivery breaches

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
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
        "quote_stream_quotes_received_total",
        "Total quote frames received from the broker"
    );
    describe_counter!(
        "quote_stream_quotes_stored_total",
        "Total quotes written to the quote store"
    );
    describe_counter!(
        "quote_stream_quotes_throttled_total",
        "Total quotes retained by the per-symbol throttle window"
    );
    describe_counter!(
        "quote_stream_frames_malformed_total",
        "Total malformed broker frames dropped"
    );
    describe_counter!(
        "quote_stream_reconnects_total",
        "Total reconnection attempts by failure kind"
    );
    describe_counter!(
        "quote_stream_sla_breaches_total",
        "Total first-quote delivery windows missed"
    );

    describe_gauge!(
        "quote_stream_connection_status",
        "Connection status (1 for the current state, 0 otherwise)"
    );
    describe_gauge!(
        "quote_stream_subscriptions_active",
        "Number of active topic subscriptions"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// All status names, used to zero out the non-current status gauges.
const STATUS_NAMES: [&str; 4] = ["connecting", "connected", "reconnecting", "disconnected"];

/// Record a quote frame received from the broker.
pub fn record_quote_received() {
    counter!("quote_stream_quotes_received_total").increment(1);
}

/// Record a quote written to the store.
pub fn record_quote_stored() {
    counter!("quote_stream_quotes_stored_total").increment(1);
}

/// Record a quote retained by a throttle window.
pub fn record_quote_throttled() {
    counter!("quote_stream_quotes_throttled_total").increment(1);
}

/// Record a malformed frame dropped.
pub fn record_malformed_frame() {
    counter!("quote_stream_frames_malformed_total").increment(1);
}

/// Record a reconnection attempt.
pub fn record_reconnect(kind: &'static str) {
    counter!("quote_stream_reconnects_total", "kind" => kind).increment(1);
}

/// Record a missed first-quote delivery window.
pub fn record_sla_breach() {
    counter!("quote_stream_sla_breaches_total").increment(1);
}

/// Update the connection status gauge.
pub fn set_connection_status(status: &'static str) {
    for name in STATUS_NAMES {
        let value = if name == status { 1.0 } else { 0.0 };
        gauge!("quote_stream_connection_status", "status" => name).set(value);
    }
}

/// Update the active subscription count.
pub fn set_active_subscriptions(count: f64) {
    gauge!("quote_stream_subscriptions_active").set(count);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_a_noop() {
        // The metrics macros fall back to a no-op recorder when none is
        // installed; none of these may panic in that state.
        record_quote_received();
        record_quote_stored();
        record_quote_throttled();
        record_malformed_frame();
        record_reconnect("transport");
        record_sla_breach();
        set_connection_status("connected");
        set_active_subscriptions(2.0);
    }
}
