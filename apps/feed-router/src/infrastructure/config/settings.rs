//! Router Configuration Settings
//!
//! Configuration types for the feed router, loaded from environment variables.
//! Every variable is optional; unset or unparsable numeric values fall back
//! to their defaults.

use std::collections::HashMap;
use std::time::Duration;

use crate::application::services::{ConnectionSettings, ReconnectConfig};
use crate::domain::streaming::{Interval, SecurityClass, Ticker};
use crate::infrastructure::binance::{DEFAULT_HTTP_TIMEOUT, DEFAULT_REST_URL, DEFAULT_WS_URL};

/// Exchange endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSettings {
    /// Crypto WebSocket endpoint. `None` makes the class unavailable.
    pub crypto_ws_url: Option<String>,
    /// Equity WebSocket endpoint. `None` makes the class unavailable.
    pub equity_ws_url: Option<String>,
    /// REST host for historical bars.
    pub rest_url: String,
    /// REST request timeout.
    pub http_timeout: Duration,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            crypto_ws_url: Some(DEFAULT_WS_URL.to_string()),
            equity_ws_url: None,
            rest_url: DEFAULT_REST_URL.to_string(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl FeedSettings {
    /// Endpoint map for the configured classes.
    #[must_use]
    pub fn endpoints(&self) -> HashMap<SecurityClass, String> {
        [
            (SecurityClass::Crypto, self.crypto_ws_url.as_ref()),
            (SecurityClass::Equity, self.equity_ws_url.as_ref()),
        ]
        .into_iter()
        .filter_map(|(class, url)| url.map(|url| (class, url.clone())))
        .collect()
    }
}

/// WebSocket connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct WebSocketSettings {
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Connection attempts per handshake before sinks are notified.
    pub max_connect_attempts: u32,
    /// Silence after which a connection is considered dead (0 = disabled).
    pub idle_timeout: Duration,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            max_connect_attempts: 5,
            idle_timeout: Duration::from_secs(45),
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { metrics_port: 9090 }
    }
}

/// Charts the binary loads at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartSettings {
    /// Tickers to chart.
    pub symbols: Vec<Ticker>,
    /// Candle interval of the historical window.
    pub interval: Interval,
    /// Bars in the historical window.
    pub history_limit: u16,
}

impl Default for ChartSettings {
    fn default() -> Self {
        Self {
            symbols: Ticker::parse("BTCUSDT").into_iter().collect(),
            interval: Interval::M1,
            history_limit: 500,
        }
    }
}

/// Complete router configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RouterConfig {
    /// Exchange endpoints.
    pub feed: FeedSettings,
    /// WebSocket connection settings.
    pub websocket: WebSocketSettings,
    /// Server port settings.
    pub server: ServerSettings,
    /// Startup charts.
    pub chart: ChartSettings,
}

impl RouterConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be interpreted or no class has an
    /// endpoint.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// See [`RouterConfig::from_env`].
    pub fn from_lookup(env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let feed_defaults = FeedSettings::default();
        let feed = FeedSettings {
            crypto_ws_url: parse_env_url(
                &env,
                "FEED_ROUTER_CRYPTO_WS_URL",
                feed_defaults.crypto_ws_url,
            ),
            equity_ws_url: parse_env_url(
                &env,
                "FEED_ROUTER_EQUITY_WS_URL",
                feed_defaults.equity_ws_url,
            ),
            rest_url: env("FEED_ROUTER_REST_URL")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(feed_defaults.rest_url),
            http_timeout: parse_env_duration_secs(
                &env,
                "FEED_ROUTER_HTTP_TIMEOUT_SECS",
                feed_defaults.http_timeout,
            ),
        };

        if feed.crypto_ws_url.is_none() && feed.equity_ws_url.is_none() {
            return Err(ConfigError::NoEndpoints);
        }

        let ws_defaults = WebSocketSettings::default();
        let websocket = WebSocketSettings {
            reconnect_delay_initial: parse_env_duration_millis(
                &env,
                "FEED_ROUTER_RECONNECT_DELAY_INITIAL_MS",
                ws_defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_env_duration_secs(
                &env,
                "FEED_ROUTER_RECONNECT_DELAY_MAX_SECS",
                ws_defaults.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: parse_env_f64(
                &env,
                "FEED_ROUTER_RECONNECT_DELAY_MULTIPLIER",
                ws_defaults.reconnect_delay_multiplier,
            ),
            max_connect_attempts: parse_env_u32(
                &env,
                "FEED_ROUTER_MAX_CONNECT_ATTEMPTS",
                ws_defaults.max_connect_attempts,
            )
            .max(1),
            idle_timeout: parse_env_duration_secs(
                &env,
                "FEED_ROUTER_IDLE_TIMEOUT_SECS",
                ws_defaults.idle_timeout,
            ),
        };

        let server = ServerSettings {
            metrics_port: parse_env_u16(
                &env,
                "FEED_ROUTER_METRICS_PORT",
                ServerSettings::default().metrics_port,
            ),
        };

        let chart_defaults = ChartSettings::default();
        let symbols = match env("FEED_ROUTER_SYMBOLS") {
            Some(raw) => parse_symbols(&raw)?,
            None => chart_defaults.symbols,
        };
        let interval = match env("FEED_ROUTER_INTERVAL") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "FEED_ROUTER_INTERVAL".to_string(),
                value: raw,
            })?,
            None => chart_defaults.interval,
        };
        let chart = ChartSettings {
            symbols,
            interval,
            history_limit: parse_env_u16(
                &env,
                "FEED_ROUTER_HISTORY_LIMIT",
                chart_defaults.history_limit,
            ),
        };

        Ok(Self {
            feed,
            websocket,
            server,
            chart,
        })
    }

    /// Connection manager settings derived from this configuration.
    #[must_use]
    pub fn to_connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            endpoints: self.feed.endpoints(),
            backoff: ReconnectConfig {
                initial_delay: self.websocket.reconnect_delay_initial,
                max_delay: self.websocket.reconnect_delay_max,
                multiplier: self.websocket.reconnect_delay_multiplier,
                ..ReconnectConfig::default()
            },
            max_connect_attempts: self.websocket.max_connect_attempts,
            idle_timeout: self.websocket.idle_timeout,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has an unusable value.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Neither security class has an endpoint.
    #[error("no feed endpoint configured for any security class")]
    NoEndpoints,
}

fn parse_symbols(raw: &str) -> Result<Vec<Ticker>, ConfigError> {
    let symbols = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Ticker::parse(s).map_err(|_| ConfigError::InvalidValue {
                key: "FEED_ROUTER_SYMBOLS".to_string(),
                value: s.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if symbols.is_empty() {
        return Err(ConfigError::EmptyValue("FEED_ROUTER_SYMBOLS".to_string()));
    }

    Ok(symbols)
}

/// Set and empty disables; unset keeps the default.
fn parse_env_url(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Option<String>,
) -> Option<String> {
    match env(key) {
        Some(value) if value.trim().is_empty() => None,
        Some(value) => Some(value.trim().to_string()),
        None => default,
    }
}

fn parse_env_u16(env: &impl Fn(&str) -> Option<String>, key: &str, default: u16) -> u16 {
    env(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn parse_env_u32(env: &impl Fn(&str) -> Option<String>, key: &str, default: u32) -> u32 {
    env(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn parse_env_f64(env: &impl Fn(&str) -> Option<String>, key: &str, default: f64) -> f64 {
    env(key)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 1.0)
        .unwrap_or(default)
}

fn parse_env_duration_secs(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    env(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    env(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
