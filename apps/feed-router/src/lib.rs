#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::option_if_let_else,
        clippy::items_after_statements
    )
)]

//! Feed Router - Live Market Data Fan-out
//!
//! Maintains at most one exchange WebSocket per security class and
//! multiplexes live ticks to any number of chart sinks keyed by ticker.
//! Many charts watching the same ticker share one upstream subscription.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types with no I/O
//!   - `streaming`: tickers, classes, intervals, ticks and bars
//!   - `subscription`: the ticker → sinks registry
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: transport, codec, historical data and sink interfaces
//!   - `services`: router worker, connection manager, dispatcher, chart feed
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `binance`: WebSocket transport, wire codec, REST klines
//!   - `config`: environment configuration
//!   - `metrics`: Prometheus instrumentation
//!   - `sinks`: log-backed sink
//!   - `telemetry`: tracing and OpenTelemetry
//!
//! # Data Flow
//!
//! ```text
//! caller threads ──► CommandQueue ──► RouterWorker ──► SUBSCRIBE/UNSUBSCRIBE ──► exchange WS
//!                                         │
//! exchange WS ──► frames ──► TickDispatcher ──► sink 1, sink 2, ... sink N
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::streaming::{
    Bar, Interval, InvalidTicker, SecurityClass, SubscriptionKind, Tick, TickSnapshot, Ticker,
};
pub use domain::subscription::{SinkId, SubscriptionChanges, SubscriptionRegistry};

// Ports
pub use application::ports::{
    FeedCodec, FeedTransport, HistoricalDataPort, HistoricalError, HistoryRequest, InboundFrame,
    SinkError, SinkHandle, TickSink, TransportError,
};

// Services
pub use application::services::{
    ChartError, ChartFeed, ConnectionSettings, ConnectionState, FeedRouter, LoadRequest,
    LoadSummary, ReconnectConfig, RouterError, RouterWorker, StatusSnapshot,
};

// Infrastructure
pub use infrastructure::binance::{BinanceCodec, BinanceRestClient, BinanceTransport};
pub use infrastructure::config::{ConfigError, RouterConfig};
pub use infrastructure::metrics::init_metrics;
pub use infrastructure::sinks::LogSink;
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
