//! Domain Layer - Core market data types and subscription bookkeeping.
//!
//! Pure types with no I/O. Everything here is owned and mutated by the
//! router worker or copied out to callers as snapshots.

/// Market data types (tickers, classes, ticks, bars).
pub mod streaming;

/// Ticker-to-sink registry with upstream reference counting.
pub mod subscription;
