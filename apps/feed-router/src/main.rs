//! Feed Router Binary
//!
//! Loads a historical window for each configured symbol into a logging
//! sink, then streams live ticks until shutdown.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin feed-router
//! ```
//!
//! # Environment Variables
//!
//! - `FEED_ROUTER_CRYPTO_WS_URL`: crypto stream (default: Binance public data stream, empty disables)
//! - `FEED_ROUTER_EQUITY_WS_URL`: equity stream (default: unset, class unavailable)
//! - `FEED_ROUTER_REST_URL`: klines host (default: <https://data-api.binance.vision>)
//! - `FEED_ROUTER_SYMBOLS`: comma-separated tickers (default: BTCUSDT)
//! - `FEED_ROUTER_INTERVAL`: history interval (default: 1m)
//! - `FEED_ROUTER_HISTORY_LIMIT`: bars per window (default: 500)
//! - `FEED_ROUTER_METRICS_PORT`: Prometheus port (default: 9090, 0 disables)
//! - `FEED_ROUTER_RECONNECT_DELAY_INITIAL_MS`, `FEED_ROUTER_RECONNECT_DELAY_MAX_SECS`,
//!   `FEED_ROUTER_RECONNECT_DELAY_MULTIPLIER`, `FEED_ROUTER_MAX_CONNECT_ATTEMPTS`,
//!   `FEED_ROUTER_IDLE_TIMEOUT_SECS`, `FEED_ROUTER_HTTP_TIMEOUT_SECS`: connection tuning
//! - `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`: span export
//! - `RUST_LOG`: Log level (default: `feed_router=info`)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use feed_router::infrastructure::telemetry;
use feed_router::{
    BinanceCodec, BinanceRestClient, BinanceTransport, ChartFeed, FeedRouter, LoadRequest,
    LogSink, RouterConfig, SecurityClass, SinkHandle, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between status log lines.
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init()?;

    tracing::info!("Starting feed router");

    let config = RouterConfig::from_env()?;
    log_config(&config);

    let _metrics_handle = init_metrics(config.server.metrics_port)?;

    let shutdown_token = CancellationToken::new();

    let (router, worker) = FeedRouter::spawn(
        Arc::new(BinanceTransport::new(shutdown_token.clone())),
        Arc::new(BinanceCodec::new()),
        config.to_connection_settings(),
        shutdown_token.clone(),
    );

    let history =
        BinanceRestClient::with_base_url(config.feed.rest_url.clone(), config.feed.http_timeout)
            .context("failed to build REST client")?;
    let charts = ChartFeed::new(router.clone(), Arc::new(history));

    let class = SecurityClass::all()
        .iter()
        .copied()
        .find(|class| router.has_endpoint(*class))
        .context("no security class has a feed endpoint")?;

    let mut sinks = Vec::with_capacity(config.chart.symbols.len());
    for ticker in &config.chart.symbols {
        let sink = Arc::new(LogSink::new(format!("{ticker} {}", config.chart.interval)));
        let handle = SinkHandle::new(&sink);
        let request = LoadRequest::new(
            ticker.as_str(),
            config.chart.interval,
            config.chart.history_limit,
        )?
        .with_class(class)
        .live();

        match charts.load(&handle, &request).await {
            Ok(summary) => {
                tracing::info!(chart = sink.label(), bars = summary.bars, "Chart ready");
            }
            Err(e) => {
                tracing::error!(chart = sink.label(), error = %e, "Chart load failed");
            }
        }
        sinks.push(sink);
    }

    tokio::spawn(report_status(router.clone(), shutdown_token.clone()));

    tracing::info!(charts = sinks.len(), "Feed router ready");

    await_shutdown(shutdown_token).await;

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, worker).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Router worker panicked"),
        Err(_) => tracing::warn!("Router worker did not stop in time"),
    }

    for sink in &sinks {
        tracing::info!(
            chart = sink.label(),
            ticks = sink.ticks_received(),
            last_price = ?sink.last_price(),
            "Chart closed"
        );
    }

    tracing::info!("Feed router stopped");
    Ok(())
}

/// Periodically log the router's counters.
async fn report_status(router: FeedRouter, shutdown_token: CancellationToken) {
    let mut ticker = tokio::time::interval(STATUS_INTERVAL);
    ticker.tick().await;

    loop {
        tokio::select! {
            () = shutdown_token.cancelled() => return,
            _ = ticker.tick() => {
                let status = router.status();
                tracing::info!(
                    connections = ?status.connections,
                    frames = status.frames_received,
                    ticks = status.ticks_dispatched,
                    decode_errors = status.decode_errors,
                    sink_failures = status.sink_failures,
                    reconnects = status.reconnects,
                    last_error = ?status.last_error,
                    "Router status"
                );
            }
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &RouterConfig) {
    tracing::info!(
        symbols = ?config.chart.symbols,
        interval = %config.chart.interval,
        history_limit = config.chart.history_limit,
        metrics_port = config.server.metrics_port,
        "Configuration loaded"
    );
    tracing::debug!(
        crypto_ws_url = ?config.feed.crypto_ws_url,
        equity_ws_url = ?config.feed.equity_ws_url,
        rest_url = %config.feed.rest_url,
        "Feed endpoints"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT), then cancel the token.
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
