//! Binance REST Klines Integration Tests
//!
//! Runs the REST client against a wiremock server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use chrono::DateTime;
use rust_decimal::Decimal;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use feed_router::{
    BinanceRestClient, HistoricalDataPort, HistoricalError, HistoryRequest, Interval, Ticker,
};

async fn setup() -> (MockServer, BinanceRestClient) {
    let server = MockServer::start().await;
    let client = BinanceRestClient::with_base_url(server.uri(), Duration::from_secs(5)).unwrap();
    (server, client)
}

fn request(limit: u16) -> HistoryRequest {
    HistoryRequest::new(Ticker::parse("BTCUSDT").unwrap(), Interval::H1, limit)
}

fn three_klines() -> serde_json::Value {
    json!([
        [1609459200000_i64,"29000.00","29500.00","28800.00","29200.00","1000.00",1609462799999_i64,"29000000.00",5000,"500.00","14500000.00","0"],
        [1609462800000_i64,"29200.00","30000.00","29100.00","29800.00","1200.00",1609466399999_i64,"35000000.00",6000,"600.00","17400000.00","0"],
        [1609466400000_i64,"29800.00","30500.00","29600.00","30100.00","800.00",1609469999999_i64,"24000000.00",4000,"400.00","12000000.00","0"]
    ])
}

#[tokio::test]
async fn fetch_bars_decodes_window_in_order() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .and(query_param("symbol", "BTCUSDT"))
        .and(query_param("interval", "1h"))
        .and(query_param("limit", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(three_klines()))
        .expect(1)
        .mount(&server)
        .await;

    let bars = client.fetch_bars(&request(3)).await.unwrap();

    assert_eq!(bars.len(), 3);
    assert_eq!(
        bars[0].open_time,
        DateTime::from_timestamp_millis(1_609_459_200_000).unwrap()
    );
    assert_eq!(bars[0].open, "29000.00".parse::<Decimal>().unwrap());
    assert_eq!(bars[0].high, "29500.00".parse::<Decimal>().unwrap());
    assert_eq!(bars[0].low, "28800.00".parse::<Decimal>().unwrap());
    assert_eq!(bars[0].close, "29200.00".parse::<Decimal>().unwrap());
    assert_eq!(bars[0].volume, "1000.00".parse::<Decimal>().unwrap());
    assert!(bars.windows(2).all(|pair| pair[0].open_time < pair[1].open_time));
    assert_eq!(bars[2].close, "30100.00".parse::<Decimal>().unwrap());
}

#[tokio::test]
async fn limit_is_clamped_before_sending() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .and(query_param("limit", "1000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(three_klines()))
        .expect(1)
        .mount(&server)
        .await;

    let bars = client.fetch_bars(&request(5000)).await.unwrap();
    assert_eq!(bars.len(), 3);
}

#[tokio::test]
async fn non_success_status_is_reported() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"code": -1121, "msg": "Invalid symbol."})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let error = client.fetch_bars(&request(10)).await.unwrap_err();

    match error {
        HistoricalError::Status { status, body } => {
            assert_eq!(status, 400);
            assert!(body.contains("Invalid symbol."));
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn server_error_is_not_retried() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let error = client.fetch_bars(&request(10)).await.unwrap_err();
    assert!(matches!(error, HistoricalError::Status { status: 503, .. }));
}

#[tokio::test]
async fn empty_result_is_reported() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let error = client.fetch_bars(&request(10)).await.unwrap_err();

    assert_eq!(
        error,
        HistoricalError::Empty {
            ticker: Ticker::parse("BTCUSDT").unwrap()
        }
    );
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
        .expect(1)
        .mount(&server)
        .await;

    let error = client.fetch_bars(&request(10)).await.unwrap_err();
    assert!(matches!(error, HistoricalError::Decode { .. }));
}

#[tokio::test]
async fn unreachable_host_is_a_request_error() {
    let client =
        BinanceRestClient::with_base_url("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();

    let error = client.fetch_bars(&request(10)).await.unwrap_err();
    assert!(matches!(error, HistoricalError::Request { .. }));
}
