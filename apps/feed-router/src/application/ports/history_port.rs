//! Historical Data Port (Driven Port)
//!
//! Request/response fetch of a bounded window of past bars.

use async_trait::async_trait;

use crate::domain::streaming::{Bar, Interval, Ticker};

/// Largest window the exchange returns in one request.
pub const MAX_HISTORY_LIMIT: u16 = 1000;

/// Request for a historical window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    /// Instrument.
    pub ticker: Ticker,
    /// Candle interval.
    pub interval: Interval,
    /// Number of bars, clamped to `1..=1000`.
    pub limit: u16,
}

impl HistoryRequest {
    /// Create a request, clamping `limit` into the supported range.
    #[must_use]
    pub fn new(ticker: Ticker, interval: Interval, limit: u16) -> Self {
        Self {
            ticker,
            interval,
            limit: limit.clamp(1, MAX_HISTORY_LIMIT),
        }
    }
}

/// Historical fetch failure. Recoverable and never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoricalError {
    /// The request could not be sent or timed out.
    #[error("historical request failed: {message}")]
    Request {
        /// Error details.
        message: String,
    },

    /// Non-success HTTP status.
    #[error("historical request returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The body could not be decoded into bars.
    #[error("failed to decode bars: {message}")]
    Decode {
        /// Error details.
        message: String,
    },

    /// The exchange returned no bars.
    #[error("no results for {ticker}")]
    Empty {
        /// Requested ticker.
        ticker: Ticker,
    },
}

/// Port for fetching historical bars.
#[async_trait]
pub trait HistoricalDataPort: Send + Sync {
    /// Fetch a window of bars, oldest first.
    ///
    /// # Errors
    ///
    /// Non-success responses and empty results are reported as
    /// [`HistoricalError`].
    async fn fetch_bars(&self, request: &HistoryRequest) -> Result<Vec<Bar>, HistoricalError>;
}
