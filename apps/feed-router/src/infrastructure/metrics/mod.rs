//! Prometheus Metrics Module
//!
//! Exposes router metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Frames**: inbound frames, decode failures, unknown tickers
//! - **Delivery**: ticks delivered to sinks, sink failures, dispatch latency
//! - **Connections**: per-class state, reconnects, handshake failures
//! - **Registry**: active tickers and sinks
//!
//! # Integration
//!
//! When a port is configured the exporter serves `/metrics` on it.
//! Without a recorder installed every recording function is a no-op.

use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::application::services::ConnectionState;
use crate::domain::streaming::SecurityClass;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics setup failure.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The exporter could not be built.
    #[error("failed to build Prometheus exporter: {0}")]
    Build(String),

    /// Another recorder is already installed.
    #[error("metrics recorder already installed")]
    AlreadyInstalled,
}

/// Install the Prometheus recorder and serve it on `port`.
///
/// Returns `Ok(None)` when `port` is 0. Calling again after a successful
/// install returns the existing handle. Must run inside a Tokio runtime.
///
/// # Errors
///
/// Returns [`MetricsError`] if the exporter cannot be built or a different
/// recorder is already installed.
pub fn init_metrics(port: u16) -> Result<Option<PrometheusHandle>, MetricsError> {
    if port == 0 {
        return Ok(None);
    }
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(Some(handle.clone()));
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let (recorder, exporter) = PrometheusBuilder::new()
        .with_http_listener(addr)
        .build()
        .map_err(|e| MetricsError::Build(e.to_string()))?;

    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).map_err(|_| MetricsError::AlreadyInstalled)?;

    tokio::spawn(async move {
        if let Err(e) = exporter.await {
            tracing::error!(error = ?e, "Metrics exporter stopped");
        }
    });

    register_metrics();
    tracing::info!(port, "Metrics exporter listening");

    Ok(Some(PROMETHEUS_HANDLE.get_or_init(|| handle).clone()))
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
        "feed_router_frames_received_total",
        "Total frames received from upstream feeds"
    );
    describe_counter!(
        "feed_router_ticks_dispatched_total",
        "Total ticks delivered to sinks"
    );
    describe_counter!(
        "feed_router_decode_errors_total",
        "Total inbound frames that failed to decode"
    );
    describe_counter!(
        "feed_router_unknown_ticker_total",
        "Total ticks dropped for tickers with no subscribers"
    );
    describe_counter!(
        "feed_router_sink_failures_total",
        "Total sink callbacks that returned an error or panicked"
    );
    describe_counter!(
        "feed_router_reconnects_total",
        "Total reconnects after a dropped connection"
    );
    describe_counter!(
        "feed_router_handshake_failures_total",
        "Total handshakes that exhausted the retry budget"
    );
    describe_counter!(
        "feed_router_commands_total",
        "Total commands executed by the router worker"
    );

    describe_gauge!(
        "feed_router_connection_state",
        "Connection state per class (0 disconnected, 1 connecting, 2 open)"
    );
    describe_gauge!(
        "feed_router_active_tickers",
        "Tickers with at least one sink"
    );
    describe_gauge!("feed_router_active_sinks", "Sinks holding at least one ticker");

    describe_histogram!(
        "feed_router_dispatch_seconds",
        "Time to decode a frame and deliver it to every sink"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// How a sink callback failed.
#[derive(Debug, Clone, Copy)]
pub enum SinkFailure {
    /// Returned an error.
    Error,
    /// Panicked.
    Panic,
}

impl SinkFailure {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Panic => "panic",
        }
    }
}

/// Record a frame received on a class's connection.
pub fn record_frame_received(class: SecurityClass) {
    counter!("feed_router_frames_received_total", "class" => class.as_str()).increment(1);
}

/// Record ticks delivered to sinks.
pub fn record_ticks_dispatched(class: SecurityClass, count: u64) {
    counter!("feed_router_ticks_dispatched_total", "class" => class.as_str()).increment(count);
}

/// Record a frame that failed to decode.
pub fn record_decode_error(class: SecurityClass) {
    counter!("feed_router_decode_errors_total", "class" => class.as_str()).increment(1);
}

/// Record a tick for an unregistered ticker.
pub fn record_unknown_ticker(class: SecurityClass) {
    counter!("feed_router_unknown_ticker_total", "class" => class.as_str()).increment(1);
}

/// Record a failed sink callback.
pub fn record_sink_failure(failure: SinkFailure) {
    counter!("feed_router_sink_failures_total", "failure" => failure.as_str()).increment(1);
}

/// Record a reconnect after a drop.
pub fn record_reconnect(class: SecurityClass) {
    counter!("feed_router_reconnects_total", "class" => class.as_str()).increment(1);
}

/// Record a handshake that exhausted its retry budget.
pub fn record_handshake_failure(class: SecurityClass) {
    counter!("feed_router_handshake_failures_total", "class" => class.as_str()).increment(1);
}

/// Record an executed command.
pub fn record_command(command: &'static str) {
    counter!("feed_router_commands_total", "command" => command).increment(1);
}

/// Update a class's connection state gauge.
pub fn set_connection_state(class: SecurityClass, state: ConnectionState) {
    gauge!("feed_router_connection_state", "class" => class.as_str()).set(state.as_gauge());
}

/// Update registry size gauges.
#[allow(clippy::cast_precision_loss)]
pub fn set_registry_size(tickers: usize, sinks: usize) {
    gauge!("feed_router_active_tickers").set(tickers as f64);
    gauge!("feed_router_active_sinks").set(sinks as f64);
}

/// Record how long one frame took to dispatch.
pub fn record_dispatch_duration(class: SecurityClass, duration: Duration) {
    histogram!("feed_router_dispatch_seconds", "class" => class.as_str())
        .record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_failure_labels() {
        assert_eq!(SinkFailure::Error.as_str(), "error");
        assert_eq!(SinkFailure::Panic.as_str(), "panic");
    }

    #[test]
    fn zero_port_disables_exporter() {
        assert!(init_metrics(0).unwrap().is_none());
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_frame_received(SecurityClass::Crypto);
        record_sink_failure(SinkFailure::Panic);
        set_connection_state(SecurityClass::Equity, ConnectionState::Open);
        set_registry_size(3, 2);
    }
}
