//! Binance WebSocket Message Types
//!
//! Wire format types for the Binance spot market data stream.
//!
//! # Message Types
//!
//! ## Control
//! - [`ControlMessage`]: `SUBSCRIBE` / `UNSUBSCRIBE` requests
//! - [`ControlReply`]: `{"result": null, "id": 1}` acknowledgements
//! - [`ErrorReply`]: `{"error": {...}, "id": 1}` rejections
//!
//! ## Market Data
//! - [`AggTradeEvent`]: aggregated trades (`e = "aggTrade"`)
//! - [`TradeEvent`]: raw trades (`e = "trade"`)
//! - [`KlineEvent`]: candle updates (`e = "kline"`)
//!
//! # References
//!
//! - [WebSocket Streams](https://developers.binance.com/docs/binance-spot-api-docs/web-socket-streams)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Control Messages
// =============================================================================

/// Subscription control request.
///
/// # Wire Format (JSON)
/// ```json
/// {"method": "SUBSCRIBE", "params": ["btcusdt@aggTrade"], "id": 1}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlMessage<'a> {
    /// `SUBSCRIBE` or `UNSUBSCRIBE`.
    pub method: &'static str,
    /// Stream names.
    pub params: &'a [String],
    /// Request id echoed in the reply.
    pub id: u64,
}

/// Acknowledgement of a control request.
///
/// # Wire Format (JSON)
/// ```json
/// {"result": null, "id": 1}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ControlReply {
    /// `null` for subscribe/unsubscribe.
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Request id.
    #[serde(default)]
    pub id: Option<u64>,
}

/// Rejection of a control request.
///
/// # Wire Format (JSON)
/// ```json
/// {"error": {"code": 2, "msg": "Invalid request: unknown variant"}, "id": 1}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorReply {
    /// Error details.
    pub error: ErrorPayload,
    /// Request id.
    #[serde(default)]
    pub id: Option<u64>,
}

/// Error code and message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorPayload {
    /// Exchange error code.
    #[serde(default)]
    pub code: Option<i64>,
    /// Error description.
    #[serde(default)]
    pub msg: String,
}

/// Combined-stream envelope.
///
/// # Wire Format (JSON)
/// ```json
/// {"stream": "btcusdt@aggTrade", "data": {"e": "aggTrade", ...}}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamEnvelope {
    /// Stream name.
    pub stream: String,
    /// Wrapped event.
    pub data: serde_json::Value,
}

// =============================================================================
// Market Data
// =============================================================================

/// Aggregated trade.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "e": "aggTrade", "E": 1672515782136, "s": "BNBBTC", "a": 12345,
///   "p": "0.001", "q": "100", "f": 100, "l": 105, "T": 1672515782136, "m": true
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AggTradeEvent {
    /// Symbol.
    #[serde(rename = "s")]
    pub symbol: String,
    /// Aggregate trade id.
    #[serde(rename = "a", default)]
    pub agg_trade_id: Option<u64>,
    /// Price.
    #[serde(rename = "p")]
    pub price: Decimal,
    /// Quantity.
    #[serde(rename = "q")]
    pub quantity: Decimal,
    /// Trade time.
    #[serde(rename = "T", with = "chrono::serde::ts_milliseconds")]
    pub trade_time: DateTime<Utc>,
    /// Whether the buyer was the maker.
    #[serde(rename = "m", default)]
    pub buyer_is_maker: bool,
}

/// Raw trade.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "e": "trade", "E": 1672515782136, "s": "BNBBTC", "t": 12345,
///   "p": "0.001", "q": "100", "T": 1672515782136, "m": true
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TradeEvent {
    /// Symbol.
    #[serde(rename = "s")]
    pub symbol: String,
    /// Trade id.
    #[serde(rename = "t", default)]
    pub trade_id: Option<u64>,
    /// Price.
    #[serde(rename = "p")]
    pub price: Decimal,
    /// Quantity.
    #[serde(rename = "q")]
    pub quantity: Decimal,
    /// Trade time.
    #[serde(rename = "T", with = "chrono::serde::ts_milliseconds")]
    pub trade_time: DateTime<Utc>,
    /// Whether the buyer was the maker.
    #[serde(rename = "m", default)]
    pub buyer_is_maker: bool,
}

/// Candle update.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "e": "kline", "E": 1672515782136, "s": "BNBBTC",
///   "k": {"t": 1672515780000, "T": 1672515839999, "i": "1m",
///         "o": "0.0010", "c": "0.0020", "h": "0.0025", "l": "0.0015",
///         "v": "1000", "n": 100, "x": false}
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KlineEvent {
    /// Event time.
    #[serde(rename = "E", with = "chrono::serde::ts_milliseconds")]
    pub event_time: DateTime<Utc>,
    /// Symbol.
    #[serde(rename = "s")]
    pub symbol: String,
    /// Candle.
    #[serde(rename = "k")]
    pub kline: KlinePayload,
}

/// Candle inside a [`KlineEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KlinePayload {
    /// Candle open time.
    #[serde(rename = "t", with = "chrono::serde::ts_milliseconds")]
    pub open_time: DateTime<Utc>,
    /// Interval code.
    #[serde(rename = "i", default)]
    pub interval: String,
    /// Open.
    #[serde(rename = "o", default)]
    pub open: Option<Decimal>,
    /// High.
    #[serde(rename = "h", default)]
    pub high: Option<Decimal>,
    /// Low.
    #[serde(rename = "l", default)]
    pub low: Option<Decimal>,
    /// Close, the live price.
    #[serde(rename = "c")]
    pub close: Decimal,
    /// Base volume so far.
    #[serde(rename = "v")]
    pub volume: Decimal,
    /// Whether the candle is final.
    #[serde(rename = "x", default)]
    pub closed: bool,
}
