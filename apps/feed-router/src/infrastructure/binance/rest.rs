//! Binance REST Klines Client
//!
//! Implements [`HistoricalDataPort`] against `GET /api/v3/klines`.
//!
//! Klines arrive as positional arrays of mixed types:
//! `[open_time, open, high, low, close, volume, close_time, quote_volume, trades, ...]`
//! and are decoded with a sequence visitor.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use rust_decimal::Decimal;
use serde::de::{self, Deserialize, Deserializer, IgnoredAny, SeqAccess, Visitor};

use super::DEFAULT_REST_URL;
use crate::application::ports::{HistoricalDataPort, HistoricalError, HistoryRequest};
use crate::domain::streaming::Bar;

/// Default request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest error body kept in [`HistoricalError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// REST client for historical klines.
#[derive(Clone)]
pub struct BinanceRestClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl fmt::Debug for BinanceRestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinanceRestClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl BinanceRestClient {
    /// Create a client for the public market data host.
    ///
    /// # Errors
    ///
    /// Returns [`HistoricalError::Request`] if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, HistoricalError> {
        Self::with_base_url(DEFAULT_REST_URL, timeout)
    }

    /// Create a client for a custom host.
    ///
    /// # Errors
    ///
    /// Returns [`HistoricalError::Request`] if the HTTP client cannot be built.
    pub fn with_base_url(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, HistoricalError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HistoricalError::Request {
                message: e.to_string(),
            })?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Host requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl HistoricalDataPort for BinanceRestClient {
    async fn fetch_bars(&self, request: &HistoryRequest) -> Result<Vec<Bar>, HistoricalError> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let limit = request.limit.to_string();

        tracing::debug!(
            ticker = %request.ticker,
            interval = %request.interval,
            limit = request.limit,
            "Fetching historical klines"
        );

        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("symbol", request.ticker.as_str()),
                ("interval", request.interval.as_str()),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .map_err(|e| HistoricalError::Request {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                ticker = %request.ticker,
                status = status.as_u16(),
                "Historical request rejected"
            );
            return Err(HistoricalError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        let body = response.bytes().await.map_err(|e| HistoricalError::Request {
            message: e.to_string(),
        })?;

        let rows: Vec<KlineRow> =
            serde_json::from_slice(&body).map_err(|e| HistoricalError::Decode {
                message: e.to_string(),
            })?;

        if rows.is_empty() {
            return Err(HistoricalError::Empty {
                ticker: request.ticker.clone(),
            });
        }

        rows.into_iter().map(Bar::try_from).collect()
    }
}

// =============================================================================
// Wire Format
// =============================================================================

/// One kline row as returned by the exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
struct KlineRow {
    open_time: i64,
    open: String,
    high: String,
    low: String,
    close: String,
    volume: String,
}

impl<'de> Deserialize<'de> for KlineRow {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct KlineRowVisitor;

        impl<'de> Visitor<'de> for KlineRowVisitor {
            type Value = KlineRow;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a kline array with at least 6 elements")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let row = KlineRow {
                    open_time: next_field(&mut seq, "open_time")?,
                    open: next_field(&mut seq, "open")?,
                    high: next_field(&mut seq, "high")?,
                    low: next_field(&mut seq, "low")?,
                    close: next_field(&mut seq, "close")?,
                    volume: next_field(&mut seq, "volume")?,
                };

                // close_time, quote volume, trade count and taker volumes
                while seq.next_element::<IgnoredAny>()?.is_some() {}

                Ok(row)
            }
        }

        deserializer.deserialize_seq(KlineRowVisitor)
    }
}

fn next_field<'de, A, T>(seq: &mut A, field: &'static str) -> Result<T, A::Error>
where
    A: SeqAccess<'de>,
    T: Deserialize<'de>,
{
    seq.next_element()?
        .ok_or_else(|| de::Error::missing_field(field))
}

impl TryFrom<KlineRow> for Bar {
    type Error = HistoricalError;

    fn try_from(row: KlineRow) -> Result<Self, Self::Error> {
        let open_time = DateTime::from_timestamp_millis(row.open_time).ok_or_else(|| {
            HistoricalError::Decode {
                message: format!("invalid open_time millis: {}", row.open_time),
            }
        })?;

        Ok(Self {
            open_time,
            open: parse_decimal("open", &row.open)?,
            high: parse_decimal("high", &row.high)?,
            low: parse_decimal("low", &row.low)?,
            close: parse_decimal("close", &row.close)?,
            volume: parse_decimal("volume", &row.volume)?,
        })
    }
}

fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, HistoricalError> {
    raw.parse().map_err(|e| HistoricalError::Decode {
        message: format!("failed to parse {field} '{raw}': {e}"),
    })
}
