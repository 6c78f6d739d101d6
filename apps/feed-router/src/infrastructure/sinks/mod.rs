//! Logging Sink
//!
//! A [`TickSink`] that writes what it receives to the log. Used by the
//! binary to chart configured symbols without a UI.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::application::ports::{SinkError, TickSink};
use crate::domain::streaming::{Bar, SecurityClass, TickSnapshot, Ticker};

/// Sink that logs ticks and history for one chart.
#[derive(Debug)]
pub struct LogSink {
    label: String,
    ticks: AtomicU64,
    bars: AtomicU64,
    last_price: Mutex<Option<Decimal>>,
}

impl LogSink {
    /// Create a sink whose log lines carry `label`.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ticks: AtomicU64::new(0),
            bars: AtomicU64::new(0),
            last_price: Mutex::new(None),
        }
    }

    /// Chart label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Ticks received.
    #[must_use]
    pub fn ticks_received(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Bars received across all loads.
    #[must_use]
    pub fn bars_received(&self) -> u64 {
        self.bars.load(Ordering::Relaxed)
    }

    /// Price of the most recent tick or bar close.
    #[must_use]
    pub fn last_price(&self) -> Option<Decimal> {
        *self.last_price.lock()
    }
}

impl TickSink for LogSink {
    fn on_tick(&self, tick: &TickSnapshot) -> Result<(), SinkError> {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        *self.last_price.lock() = Some(tick.price);

        tracing::debug!(
            chart = %self.label,
            ticker = %tick.ticker,
            price = %tick.price,
            volume = %tick.volume,
            event_time = %tick.event_time,
            "Tick"
        );
        Ok(())
    }

    fn on_connection_failed(&self, class: SecurityClass, reason: &str) {
        tracing::error!(chart = %self.label, class = %class, reason, "Live feed unavailable");
    }

    fn on_subscription_rejected(&self, ticker: &Ticker, reason: &str) {
        tracing::warn!(chart = %self.label, ticker = %ticker, reason, "Live subscription refused");
    }

    fn on_bars(&self, bars: &[Bar]) -> Result<(), SinkError> {
        self.bars.fetch_add(bars.len() as u64, Ordering::Relaxed);
        if let Some(last) = bars.last() {
            *self.last_price.lock() = Some(last.close);
        }

        tracing::info!(
            chart = %self.label,
            bars = bars.len(),
            first = ?bars.first().map(|bar| bar.open_time),
            last = ?bars.last().map(|bar| bar.open_time),
            "Historical window loaded"
        );
        Ok(())
    }
}
