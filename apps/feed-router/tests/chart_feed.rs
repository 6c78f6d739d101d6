//! Chart Feed Integration Tests
//!
//! Loads charts through a mocked historical provider and the in-memory
//! transport.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use mockall::mock;
use rust_decimal::Decimal;

use feed_router::{
    Bar, ChartError, ChartFeed, HistoricalDataPort, HistoricalError, HistoryRequest, Interval,
    LoadRequest, RouterError, SecurityClass, SinkError, SinkHandle, Ticker,
};

use common::{MockTransport, RecordingSink, agg_trade, eventually, spawn_router};

mock! {
    pub History {}

    #[async_trait]
    impl HistoricalDataPort for History {
        async fn fetch_bars(&self, request: &HistoryRequest) -> Result<Vec<Bar>, HistoricalError>;
    }
}

fn bar(open_time: i64, close: i64) -> Bar {
    Bar {
        open_time: DateTime::from_timestamp_millis(open_time).unwrap(),
        open: Decimal::from(close - 1),
        high: Decimal::from(close + 1),
        low: Decimal::from(close - 2),
        close: Decimal::from(close),
        volume: Decimal::ONE,
    }
}

fn window() -> Vec<Bar> {
    vec![bar(1_700_000_000_000, 100), bar(1_700_000_060_000, 101)]
}

#[tokio::test]
async fn live_load_delivers_history_then_streams() {
    let transport = MockTransport::new();
    let (router, _cancel) = spawn_router(&transport);
    let mut history = MockHistory::new();
    history
        .expect_fetch_bars()
        .withf(|request| {
            request.ticker.as_str() == "BTCUSDT"
                && request.interval == Interval::M5
                && request.limit == 200
        })
        .times(1)
        .returning(|_| Ok(window()));
    let charts = ChartFeed::new(router, Arc::new(history));
    let sink = RecordingSink::new();
    let handle = SinkHandle::new(&sink);

    let request = LoadRequest::new("btc/usdt", Interval::M5, 200).unwrap().live();
    let summary = charts.load(&handle, &request).await.unwrap();

    assert_eq!(summary.bars, 2);
    assert!(summary.live);
    assert_eq!(sink.bars(), window());

    eventually(|| transport.sent_with("SUBSCRIBE").len() == 1).await;
    assert_eq!(
        transport.sent_with("SUBSCRIBE")[0].params,
        vec!["btcusdt@aggTrade".to_string()]
    );

    transport.push(SecurityClass::Crypto, &agg_trade("BTCUSDT", "102"));
    eventually(|| sink.tick_count() == 1).await;
}

#[tokio::test]
async fn reload_swaps_the_streamed_ticker() {
    let transport = MockTransport::new();
    let (router, _cancel) = spawn_router(&transport);
    let mut history = MockHistory::new();
    history
        .expect_fetch_bars()
        .times(2)
        .returning(|_| Ok(window()));
    let charts = ChartFeed::new(router, Arc::new(history));
    let sink = RecordingSink::new();
    let handle = SinkHandle::new(&sink);

    let first = LoadRequest::new("ETHUSDT", Interval::M1, 50).unwrap().live();
    charts.load(&handle, &first).await.unwrap();
    eventually(|| transport.sent_with("SUBSCRIBE").len() == 1).await;

    let second = LoadRequest::new("BTCUSDT", Interval::M1, 50).unwrap();
    let summary = charts.load(&handle, &second).await.unwrap();
    assert!(!summary.live);

    eventually(|| transport.sent_with("UNSUBSCRIBE").len() == 1).await;
    assert_eq!(
        transport.sent_with("UNSUBSCRIBE")[0].params,
        vec!["ethusdt@aggTrade".to_string()]
    );
    assert_eq!(transport.sent_with("SUBSCRIBE").len(), 1);
    assert_eq!(sink.bars().len(), 4);
}

#[tokio::test]
async fn history_failure_is_reported_and_nothing_streams() {
    let transport = MockTransport::new();
    let (router, _cancel) = spawn_router(&transport);
    let mut history = MockHistory::new();
    history.expect_fetch_bars().times(1).returning(|request| {
        Err(HistoricalError::Empty {
            ticker: request.ticker.clone(),
        })
    });
    let charts = ChartFeed::new(router.clone(), Arc::new(history));
    let sink = RecordingSink::new();

    let request = LoadRequest::new("BTCUSDT", Interval::M1, 10).unwrap().live();
    let error = charts
        .load(&SinkHandle::new(&sink), &request)
        .await
        .unwrap_err();

    assert_eq!(
        error,
        ChartError::History(HistoricalError::Empty {
            ticker: Ticker::parse("BTCUSDT").unwrap()
        })
    );
    assert!(sink.bars().is_empty());
    eventually(|| router.status().commands_processed == 1).await;
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn missing_history_provider_is_a_missing_dependency() {
    let transport = MockTransport::new();
    let (router, _cancel) = spawn_router(&transport);
    let charts = ChartFeed::without_history(router);
    let sink = RecordingSink::new();

    let request = LoadRequest::new("BTCUSDT", Interval::M1, 10).unwrap();
    let error = charts
        .load(&SinkHandle::new(&sink), &request)
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        ChartError::Router(RouterError::MissingDependency(_))
    ));
}

#[tokio::test]
async fn live_load_without_endpoint_fails_before_fetching() {
    let transport = MockTransport::new();
    let (router, _cancel) = spawn_router(&transport);
    let mut history = MockHistory::new();
    history.expect_fetch_bars().times(0);
    let charts = ChartFeed::new(router, Arc::new(history));
    let sink = RecordingSink::new();

    let request = LoadRequest::new("AAPL", Interval::D1, 30)
        .unwrap()
        .with_class(SecurityClass::Equity)
        .live();
    let error = charts
        .load(&SinkHandle::new(&sink), &request)
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        ChartError::Router(RouterError::MissingDependency(_))
    ));
}

#[tokio::test]
async fn dropped_sink_aborts_the_load() {
    let transport = MockTransport::new();
    let (router, _cancel) = spawn_router(&transport);
    let mut history = MockHistory::new();
    history.expect_fetch_bars().times(1).returning(|_| Ok(window()));
    let charts = ChartFeed::new(router, Arc::new(history));

    let sink = RecordingSink::new();
    let handle = SinkHandle::new(&sink);
    drop(sink);

    let request = LoadRequest::new("BTCUSDT", Interval::M1, 10).unwrap().live();
    let error = charts.load(&handle, &request).await.unwrap_err();

    assert_eq!(error, ChartError::Sink(SinkError::Closed));
    assert!(transport.sent_with("SUBSCRIBE").is_empty());
}
