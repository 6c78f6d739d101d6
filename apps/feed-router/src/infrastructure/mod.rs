//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Binance WebSocket and REST adapters.
pub mod binance;

/// Configuration loaded from the environment.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Log-backed tick sink.
pub mod sinks;

/// Tracing subscriber and OpenTelemetry integration.
pub mod telemetry;
