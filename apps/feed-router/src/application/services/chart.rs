//! Chart Feed
//!
//! The chart load use case: swap what a sink is streaming, hand it a
//! historical window, then optionally stream live ticks on top.

use std::sync::Arc;

use crate::application::ports::{
    HistoricalDataPort, HistoricalError, HistoryRequest, SinkError, SinkHandle,
};
use crate::application::services::router::{FeedRouter, RouterError};
use crate::domain::streaming::{Interval, SecurityClass, SubscriptionKind, Ticker};

/// What to load into a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    /// Instrument.
    pub ticker: Ticker,
    /// Class the instrument trades under.
    pub class: SecurityClass,
    /// Candle interval of the historical window.
    pub interval: Interval,
    /// Number of bars, clamped to `1..=1000`.
    pub limit: u16,
    /// Stream live ticks after the history is delivered.
    pub live: bool,
    /// Channel family for live ticks.
    pub kind: SubscriptionKind,
}

impl LoadRequest {
    /// A crypto request for `limit` bars of `interval`, without live ticks.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidTicker`] if the ticker normalizes to
    /// nothing.
    pub fn new(ticker: &str, interval: Interval, limit: u16) -> Result<Self, RouterError> {
        Ok(Self {
            ticker: Ticker::parse(ticker)?,
            class: SecurityClass::Crypto,
            interval,
            limit,
            live: false,
            kind: SubscriptionKind::default(),
        })
    }

    /// Stream live ticks after loading.
    #[must_use]
    pub const fn live(mut self) -> Self {
        self.live = true;
        self
    }

    /// Set the security class.
    #[must_use]
    pub const fn with_class(mut self, class: SecurityClass) -> Self {
        self.class = class;
        self
    }

    /// Set the live channel family.
    #[must_use]
    pub const fn with_kind(mut self, kind: SubscriptionKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Chart load failure. The sink is left unsubscribed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChartError {
    /// Router rejected a command or a dependency is missing.
    #[error(transparent)]
    Router(#[from] RouterError),

    /// The historical fetch failed.
    #[error(transparent)]
    History(#[from] HistoricalError),

    /// The sink refused the bars.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Outcome of a successful load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    /// Bars handed to the sink.
    pub bars: usize,
    /// Whether live streaming was requested.
    pub live: bool,
}

/// Loads history and live ticks into sinks. Shared by every chart.
#[derive(Clone)]
pub struct ChartFeed {
    router: FeedRouter,
    history: Option<Arc<dyn HistoricalDataPort>>,
}

impl ChartFeed {
    /// Create a feed backed by a historical data provider.
    #[must_use]
    pub fn new(router: FeedRouter, history: Arc<dyn HistoricalDataPort>) -> Self {
        Self {
            router,
            history: Some(history),
        }
    }

    /// Create a feed with no historical provider; every load fails with
    /// [`RouterError::MissingDependency`].
    #[must_use]
    pub const fn without_history(router: FeedRouter) -> Self {
        Self {
            router,
            history: None,
        }
    }

    /// The router behind this feed.
    #[must_use]
    pub const fn router(&self) -> &FeedRouter {
        &self.router
    }

    /// Load a chart.
    ///
    /// Unsubscribes the sink from whatever it was streaming, fetches the
    /// historical window, hands it to [`on_bars`], then subscribes the sink
    /// when `live` is set.
    ///
    /// [`on_bars`]: crate::application::ports::TickSink::on_bars
    ///
    /// # Errors
    ///
    /// - [`ChartError::Router`] for a missing provider or endpoint, or a
    ///   stopped worker
    /// - [`ChartError::History`] for non-success or empty responses
    /// - [`ChartError::Sink`] if the sink refuses the bars
    pub async fn load(
        &self,
        sink: &SinkHandle,
        request: &LoadRequest,
    ) -> Result<LoadSummary, ChartError> {
        let history = self.history.as_ref().ok_or_else(|| {
            RouterError::MissingDependency("no historical data provider configured".to_string())
        })?;
        if request.live && !self.router.has_endpoint(request.class) {
            return Err(RouterError::MissingDependency(format!(
                "no feed endpoint configured for {}",
                request.class
            ))
            .into());
        }

        self.router.unsubscribe(sink)?;

        let window = HistoryRequest::new(request.ticker.clone(), request.interval, request.limit);
        let bars = history.fetch_bars(&window).await.inspect_err(|e| {
            tracing::warn!(
                ticker = %request.ticker,
                interval = %request.interval,
                error = %e,
                "Historical fetch failed"
            );
        })?;

        let Some(target) = sink.upgrade() else {
            return Err(SinkError::Closed.into());
        };
        target.on_bars(&bars)?;

        tracing::info!(
            ticker = %request.ticker,
            interval = %request.interval,
            bars = bars.len(),
            live = request.live,
            "Chart loaded"
        );

        if request.live {
            self.router.subscribe_with(
                sink,
                request.ticker.as_str(),
                request.class,
                request.kind,
            )?;
        }

        Ok(LoadSummary {
            bars: bars.len(),
            live: request.live,
        })
    }
}

impl std::fmt::Debug for ChartFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChartFeed")
            .field("router", &self.router)
            .field("has_history", &self.history.is_some())
            .finish()
    }
}
