//! Shared test doubles: an in-memory feed transport and recording sinks.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use feed_router::application::ports::{
    FeedConnection, FeedTransport, InboundFrame, TransportError,
};
use feed_router::{
    Bar, BinanceCodec, ConnectionSettings, FeedRouter, ReconnectConfig, SecurityClass, SinkError,
    TickSink, TickSnapshot, Ticker,
};

pub const CRYPTO_URL: &str = "mock://crypto";
pub const EQUITY_URL: &str = "mock://equity";

/// A control frame the router wrote upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct SentFrame {
    pub class: SecurityClass,
    pub method: String,
    pub params: Vec<String>,
    pub id: u64,
}

#[derive(Default)]
struct TransportState {
    connects: Vec<SecurityClass>,
    failures: HashMap<SecurityClass, u32>,
    inbound: HashMap<SecurityClass, mpsc::UnboundedSender<Result<InboundFrame, TransportError>>>,
}

/// Transport whose connections are channels the test drives directly.
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<TransportState>,
    sent: Arc<Mutex<Vec<SentFrame>>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `count` handshakes for `class`.
    pub fn fail_next(&self, class: SecurityClass, count: u32) {
        self.state.lock().failures.insert(class, count);
    }

    pub fn connect_count(&self, class: SecurityClass) -> usize {
        self.state
            .lock()
            .connects
            .iter()
            .filter(|c| **c == class)
            .count()
    }

    pub fn is_connected(&self, class: SecurityClass) -> bool {
        self.state
            .lock()
            .inbound
            .get(&class)
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Deliver an inbound frame on the current connection.
    pub fn push(&self, class: SecurityClass, frame: &str) {
        self.deliver(class, InboundFrame::Text(frame.to_string()));
    }

    /// Deliver a ping or pong on the current connection.
    pub fn heartbeat(&self, class: SecurityClass) {
        self.deliver(class, InboundFrame::Heartbeat);
    }

    fn deliver(&self, class: SecurityClass, frame: InboundFrame) {
        let state = self.state.lock();
        let tx = state.inbound.get(&class).expect("no connection for class");
        tx.unbounded_send(Ok(frame)).expect("connection closed");
    }

    /// End the current connection's inbound stream.
    pub fn drop_connection(&self, class: SecurityClass) {
        self.state.lock().inbound.remove(&class);
    }

    pub fn sent(&self) -> Vec<SentFrame> {
        self.sent.lock().clone()
    }

    pub fn sent_with(&self, method: &str) -> Vec<SentFrame> {
        self.sent()
            .into_iter()
            .filter(|frame| frame.method == method)
            .collect()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl FeedTransport for MockTransport {
    async fn connect(
        &self,
        class: SecurityClass,
        _url: &str,
    ) -> Result<FeedConnection, TransportError> {
        let mut state = self.state.lock();
        state.connects.push(class);

        if let Some(remaining) = state.failures.get_mut(&class)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(TransportError::Connect {
                message: "connection refused".to_string(),
            });
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded();
        state.inbound.insert(class, inbound_tx);

        let sent = Arc::clone(&self.sent);
        let outbound = futures::sink::unfold((), move |(), frame: String| {
            let sent = Arc::clone(&sent);
            async move {
                let value: Value = serde_json::from_str(&frame).unwrap();
                sent.lock().push(SentFrame {
                    class,
                    method: value["method"].as_str().unwrap().to_string(),
                    params: value["params"]
                        .as_array()
                        .unwrap()
                        .iter()
                        .map(|p| p.as_str().unwrap().to_string())
                        .collect(),
                    id: value["id"].as_u64().unwrap(),
                });
                Ok::<_, TransportError>(())
            }
        });

        Ok(FeedConnection::new(Box::pin(outbound), inbound_rx.boxed()))
    }
}

/// Settings with one crypto endpoint, fast backoff and no idle timeout.
pub fn settings(max_connect_attempts: u32) -> ConnectionSettings {
    ConnectionSettings {
        endpoints: HashMap::from([(SecurityClass::Crypto, CRYPTO_URL.to_string())]),
        backoff: ReconnectConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_retries: None,
        },
        max_connect_attempts,
        idle_timeout: Duration::ZERO,
    }
}

pub fn spawn_router(transport: &Arc<MockTransport>) -> (FeedRouter, CancellationToken) {
    spawn_router_with(transport, settings(3))
}

pub fn spawn_router_with(
    transport: &Arc<MockTransport>,
    settings: ConnectionSettings,
) -> (FeedRouter, CancellationToken) {
    let cancel = CancellationToken::new();
    let (router, _worker) = FeedRouter::spawn(
        Arc::clone(transport) as Arc<dyn FeedTransport>,
        Arc::new(BinanceCodec::new()),
        settings,
        cancel.clone(),
    );
    (router, cancel)
}

/// Poll `condition` until it holds, failing the test after two seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 2s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub fn agg_trade(symbol: &str, price: &str) -> String {
    format!(
        r#"{{"e":"aggTrade","E":1700000000100,"s":"{symbol}","a":1,"p":"{price}","q":"0.5","f":1,"l":1,"T":1700000000000,"m":false}}"#
    )
}

/// Sink that records every callback.
#[derive(Default)]
pub struct RecordingSink {
    ticks: Mutex<Vec<TickSnapshot>>,
    failures: Mutex<Vec<(SecurityClass, String)>>,
    rejections: Mutex<Vec<(Ticker, String)>>,
    bars: Mutex<Vec<Bar>>,
    fail_ticks: bool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A sink whose `on_tick` always errors.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail_ticks: true,
            ..Self::default()
        })
    }

    pub fn ticks(&self) -> Vec<TickSnapshot> {
        self.ticks.lock().clone()
    }

    pub fn prices(&self) -> Vec<Decimal> {
        self.ticks.lock().iter().map(|t| t.price).collect()
    }

    pub fn tick_count(&self) -> usize {
        self.ticks.lock().len()
    }

    pub fn failures(&self) -> Vec<(SecurityClass, String)> {
        self.failures.lock().clone()
    }

    pub fn rejections(&self) -> Vec<(Ticker, String)> {
        self.rejections.lock().clone()
    }

    pub fn bars(&self) -> Vec<Bar> {
        self.bars.lock().clone()
    }
}

impl TickSink for RecordingSink {
    fn on_tick(&self, tick: &TickSnapshot) -> Result<(), SinkError> {
        self.ticks.lock().push(tick.clone());
        if self.fail_ticks {
            return Err(SinkError::rejected("chart closed its canvas"));
        }
        Ok(())
    }

    fn on_connection_failed(&self, class: SecurityClass, reason: &str) {
        self.failures.lock().push((class, reason.to_string()));
    }

    fn on_subscription_rejected(&self, ticker: &Ticker, reason: &str) {
        self.rejections.lock().push((ticker.clone(), reason.to_string()));
    }

    fn on_bars(&self, bars: &[Bar]) -> Result<(), SinkError> {
        self.bars.lock().extend_from_slice(bars);
        Ok(())
    }
}
