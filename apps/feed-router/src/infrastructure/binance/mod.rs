//! Binance Market Data Adapters
//!
//! - [`BinanceTransport`]: WebSocket live feed
//! - [`BinanceCodec`]: stream frame decoding and control encoding
//! - [`BinanceRestClient`]: historical klines over REST
//!
//! The same wire format serves both security classes; each class is bound
//! to its own endpoint in configuration.

pub mod codec;
pub mod messages;
pub mod rest;
pub mod transport;

pub use codec::BinanceCodec;
pub use rest::{BinanceRestClient, DEFAULT_HTTP_TIMEOUT};
pub use transport::{BinanceTransport, DEFAULT_CONNECT_TIMEOUT};

/// Public market data WebSocket endpoint.
pub const DEFAULT_WS_URL: &str = "wss://data-stream.binance.vision:443/ws";

/// Public market data REST host.
pub const DEFAULT_REST_URL: &str = "https://data-api.binance.vision";
