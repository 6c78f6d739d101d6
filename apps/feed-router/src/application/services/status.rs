//! Router Status
//!
//! Counters and connection states published by the worker and readable
//! from any thread without going through the command queue.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::domain::streaming::SecurityClass;

/// Lifecycle of one class's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No connection and none in progress.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Live and accepting control messages.
    Open,
}

impl ConnectionState {
    /// Numeric form for the connection state gauge.
    #[must_use]
    pub const fn as_gauge(self) -> f64 {
        match self {
            Self::Disconnected => 0.0,
            Self::Connecting => 1.0,
            Self::Open => 2.0,
        }
    }
}

/// Live status of a router. Written only by the worker.
#[derive(Debug, Default)]
pub struct RouterStatus {
    connections: RwLock<BTreeMap<SecurityClass, ConnectionState>>,
    last_connected_at: RwLock<BTreeMap<SecurityClass, DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
    frames_received: AtomicU64,
    ticks_dispatched: AtomicU64,
    decode_errors: AtomicU64,
    unknown_ticker_drops: AtomicU64,
    sink_failures: AtomicU64,
    reconnects: AtomicU64,
    handshake_failures: AtomicU64,
    commands_processed: AtomicU64,
    active_tickers: AtomicUsize,
    active_sinks: AtomicUsize,
}

impl RouterStatus {
    /// Create an empty status.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a connection state change.
    pub fn set_connection_state(&self, class: SecurityClass, state: ConnectionState) {
        self.connections.write().insert(class, state);
        if state == ConnectionState::Open {
            self.last_connected_at.write().insert(class, Utc::now());
        }
    }

    /// Record the most recent error.
    pub fn set_error(&self, message: String) {
        *self.last_error.write() = Some(message);
    }

    /// Record one inbound frame.
    pub fn increment_frames(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record ticks delivered to sinks.
    pub fn add_ticks_dispatched(&self, count: u64) {
        self.ticks_dispatched.fetch_add(count, Ordering::Relaxed);
    }

    /// Record one undecodable frame.
    pub fn increment_decode_errors(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one tick for an unregistered ticker.
    pub fn increment_unknown_ticker(&self) {
        self.unknown_ticker_drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Record failed sink callbacks.
    pub fn add_sink_failures(&self, count: u64) {
        self.sink_failures.fetch_add(count, Ordering::Relaxed);
    }

    /// Record one reconnect after a drop.
    pub fn increment_reconnects(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one handshake that exhausted its retry budget.
    pub fn increment_handshake_failures(&self) {
        self.handshake_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one executed command.
    pub fn increment_commands(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Update registry sizes.
    pub fn set_registry_size(&self, tickers: usize, sinks: usize) {
        self.active_tickers.store(tickers, Ordering::Relaxed);
        self.active_sinks.store(sinks, Ordering::Relaxed);
    }

    /// Current state of a class's connection.
    #[must_use]
    pub fn connection_state(&self, class: SecurityClass) -> ConnectionState {
        self.connections.read().get(&class).copied().unwrap_or_default()
    }

    /// Copy every field.
    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            connections: self.connections.read().clone(),
            last_connected_at: self.last_connected_at.read().clone(),
            last_error: self.last_error.read().clone(),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            ticks_dispatched: self.ticks_dispatched.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            unknown_ticker_drops: self.unknown_ticker_drops.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            handshake_failures: self.handshake_failures.load(Ordering::Relaxed),
            commands_processed: self.commands_processed.load(Ordering::Relaxed),
            active_tickers: self.active_tickers.load(Ordering::Relaxed),
            active_sinks: self.active_sinks.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`RouterStatus`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    /// Connection state per class that has ever been touched.
    pub connections: BTreeMap<SecurityClass, ConnectionState>,
    /// Last successful handshake per class.
    pub last_connected_at: BTreeMap<SecurityClass, DateTime<Utc>>,
    /// Most recent connection error.
    pub last_error: Option<String>,
    /// Inbound frames received.
    pub frames_received: u64,
    /// Sink deliveries that succeeded.
    pub ticks_dispatched: u64,
    /// Frames that failed to decode.
    pub decode_errors: u64,
    /// Ticks dropped for unregistered tickers.
    pub unknown_ticker_drops: u64,
    /// Sink callbacks that errored or panicked.
    pub sink_failures: u64,
    /// Reconnects after a dropped connection.
    pub reconnects: u64,
    /// Handshakes that exhausted the retry budget.
    pub handshake_failures: u64,
    /// Commands executed by the worker.
    pub commands_processed: u64,
    /// Tickers with at least one sink.
    pub active_tickers: usize,
    /// Sinks with at least one ticker.
    pub active_sinks: usize,
}
