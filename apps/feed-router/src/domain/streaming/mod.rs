//! Market Data Streaming Types
//!
//! Core domain types for live and historical market data: tickers,
//! security classes, channel kinds, ticks and bars. These types are
//! codec-agnostic and represent the canonical internal representation
//! shared by the router, its sinks and the historical fetcher.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Ticker
// =============================================================================

/// Characters stripped from a raw ticker before it is used as a key.
const TICKER_SEPARATORS: &[char] = &['-', '/', '_', ':', '.'];

/// Exchange symbol in normalized form (uppercase, no separators).
///
/// `"btc-usdt"`, `"BTC/USDT"` and `" btcusdt "` all normalize to `BTCUSDT`.
/// Every registry lookup goes through this type, so two spellings of the
/// same instrument always share one subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ticker(String);

impl Ticker {
    /// Normalize a raw symbol.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTicker`] if nothing is left after stripping separators.
    pub fn parse(raw: &str) -> Result<Self, InvalidTicker> {
        let normalized: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && !TICKER_SEPARATORS.contains(c))
            .flat_map(char::to_uppercase)
            .collect();

        if normalized.is_empty() {
            return Err(InvalidTicker(raw.to_string()));
        }

        Ok(Self(normalized))
    }

    /// The normalized symbol.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase form used in exchange stream names.
    #[must_use]
    pub fn stream_name(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Ticker {
    type Err = InvalidTicker;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Ticker {
    type Error = InvalidTicker;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Ticker> for String {
    fn from(ticker: Ticker) -> Self {
        ticker.0
    }
}

/// A raw symbol that normalizes to nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid ticker: {0:?}")]
pub struct InvalidTicker(pub String);

// =============================================================================
// Security Class
// =============================================================================

/// Partition of instruments served by one upstream connection.
///
/// Connections are never shared across classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityClass {
    /// Crypto spot pairs.
    Crypto,
    /// Listed equities.
    Equity,
}

impl SecurityClass {
    /// All security classes.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Crypto, Self::Equity]
    }

    /// Class name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Crypto => "crypto",
            Self::Equity => "equity",
        }
    }

    /// Parse a class name, case-insensitively.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "crypto" => Some(Self::Crypto),
            "equity" | "stock" | "stocks" => Some(Self::Equity),
            _ => None,
        }
    }
}

impl fmt::Display for SecurityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Interval
// =============================================================================

/// Candle interval understood by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Interval {
    /// One second.
    S1,
    /// One minute.
    #[default]
    M1,
    /// Three minutes.
    M3,
    /// Five minutes.
    M5,
    /// Fifteen minutes.
    M15,
    /// Thirty minutes.
    M30,
    /// One hour.
    H1,
    /// Two hours.
    H2,
    /// Four hours.
    H4,
    /// Six hours.
    H6,
    /// Eight hours.
    H8,
    /// Twelve hours.
    H12,
    /// One day.
    D1,
    /// Three days.
    D3,
    /// One week.
    W1,
    /// One month.
    Mo1,
}

impl Interval {
    /// Exchange interval code (`1m`, `4h`, `1M`, ...).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::S1 => "1s",
            Self::M1 => "1m",
            Self::M3 => "3m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H2 => "2h",
            Self::H4 => "4h",
            Self::H6 => "6h",
            Self::H8 => "8h",
            Self::H12 => "12h",
            Self::D1 => "1d",
            Self::D3 => "3d",
            Self::W1 => "1w",
            Self::Mo1 => "1M",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = InvalidInterval;

    /// Accepts exchange codes (`1m`, `1M`) and chart-style aliases
    /// (`1min`, `5min`, `1H`, `D`, `W`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        // "1M" is one month; every other code is case-insensitive.
        if trimmed == "1M" {
            return Ok(Self::Mo1);
        }

        let interval = match trimmed.to_lowercase().as_str() {
            "1s" => Self::S1,
            "1m" | "1min" => Self::M1,
            "3m" | "3min" => Self::M3,
            "5m" | "5min" => Self::M5,
            "15m" | "15min" => Self::M15,
            "30m" | "30min" => Self::M30,
            "1h" | "h" => Self::H1,
            "2h" => Self::H2,
            "4h" => Self::H4,
            "6h" => Self::H6,
            "8h" => Self::H8,
            "12h" => Self::H12,
            "1d" | "d" => Self::D1,
            "3d" => Self::D3,
            "1w" | "w" => Self::W1,
            "1mo" | "1mon" => Self::Mo1,
            _ => return Err(InvalidInterval(s.to_string())),
        };

        Ok(interval)
    }
}

/// An interval string the exchange does not support.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported interval: {0:?}")]
pub struct InvalidInterval(pub String);

// =============================================================================
// Subscription Kind
// =============================================================================

/// Exchange channel family a ticker is streamed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SubscriptionKind {
    /// Aggregated trades.
    #[default]
    AggTrade,
    /// Raw trades.
    Trade,
    /// Candle updates for an interval.
    Kline(Interval),
}

impl SubscriptionKind {
    /// Exchange channel name for a ticker, e.g. `btcusdt@aggTrade`.
    #[must_use]
    pub fn channel(&self, ticker: &Ticker) -> String {
        let stream = ticker.stream_name();
        match self {
            Self::AggTrade => format!("{stream}@aggTrade"),
            Self::Trade => format!("{stream}@trade"),
            Self::Kline(interval) => format!("{stream}@kline_{}", interval.as_str()),
        }
    }

    /// Parse a kind name (`aggTrade`, `trade`, `kline_1m`).
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "aggtrade" | "agg_trade" => Some(Self::AggTrade),
            "trade" => Some(Self::Trade),
            _ if lower.starts_with("kline_") => s
                .trim()
                .get("kline_".len()..)
                .and_then(|interval| interval.parse().ok())
                .map(Self::Kline),
            _ => None,
        }
    }
}

// =============================================================================
// Ticks
// =============================================================================

/// One decoded incremental market update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    /// Instrument the update belongs to.
    pub ticker: Ticker,
    /// Last traded (or candle close) price.
    pub price: Decimal,
    /// Quantity associated with the update.
    pub volume: Decimal,
    /// Exchange event time.
    pub event_time: DateTime<Utc>,
}

/// Immutable copy of a ticker's last-known state, handed to sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickSnapshot {
    /// Instrument.
    pub ticker: Ticker,
    /// Class the instrument is streamed under.
    pub security_class: SecurityClass,
    /// Channel family the update arrived on.
    pub kind: SubscriptionKind,
    /// Last price.
    pub price: Decimal,
    /// Last volume.
    pub volume: Decimal,
    /// Time of the update.
    pub event_time: DateTime<Utc>,
}

// =============================================================================
// Bars
// =============================================================================

/// One historical OHLCV candle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bar {
    /// Candle open time.
    pub open_time: DateTime<Utc>,
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Base asset volume.
    pub volume: Decimal,
}
