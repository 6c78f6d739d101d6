//! Tick Dispatcher
//!
//! Decodes inbound frames and fans ticks out to every sink registered for
//! the ticker, in subscription order. Runs synchronously on the worker.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::application::ports::{DecodeError, FeedCodec, FeedEvent, SinkError, SinkHandle};
use crate::domain::streaming::{SecurityClass, Ticker};
use crate::domain::subscription::{SinkId, SubscriptionRegistry};
use crate::infrastructure::metrics::{self, SinkFailure};

/// A frame that produced no delivery.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The frame was malformed.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The tick's ticker has no subscribers on this class.
    #[error("no subscribers for {ticker} on {class}")]
    UnknownTicker {
        /// Ticker from the tick.
        ticker: Ticker,
        /// Class the frame arrived on.
        class: SecurityClass,
    },
}

/// What a successfully handled frame did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A tick was delivered.
    Delivered(DeliveryReport),
    /// A control request was acknowledged.
    Ack {
        /// Request id.
        id: Option<u64>,
    },
    /// A control request was rejected upstream.
    UpstreamError {
        /// Exchange error message.
        message: String,
    },
    /// Event type the router does not handle.
    Ignored,
}

/// Result of fanning one tick out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Sinks that accepted the tick.
    pub delivered: u64,
    /// Sinks that errored or panicked.
    pub failed: u64,
    /// Sinks whose owner dropped them; they should be unsubscribed.
    pub dropped_sinks: Vec<SinkId>,
}

/// Decoder and fan-out for inbound frames.
pub struct TickDispatcher {
    codec: Arc<dyn FeedCodec>,
}

impl TickDispatcher {
    /// Create a dispatcher for a wire format.
    #[must_use]
    pub fn new(codec: Arc<dyn FeedCodec>) -> Self {
        Self { codec }
    }

    /// Handle one inbound frame received on `class`'s connection.
    ///
    /// Updates the ticker's last-known state before delivering. A sink
    /// failure is logged and does not stop delivery to the others.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] for malformed frames and unknown tickers.
    /// Neither is fatal.
    pub fn on_event(
        &self,
        class: SecurityClass,
        frame: &str,
        registry: &mut SubscriptionRegistry,
        sinks: &HashMap<SinkId, SinkHandle>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let Some(event) = self.codec.decode(frame)? else {
            return Ok(DispatchOutcome::Ignored);
        };

        let tick = match event {
            FeedEvent::Tick(tick) => tick,
            FeedEvent::Ack { id } => return Ok(DispatchOutcome::Ack { id }),
            FeedEvent::UpstreamError { code, message, id } => {
                tracing::warn!(
                    class = %class,
                    ?code,
                    ?id,
                    message = %message,
                    "Upstream rejected request"
                );
                return Ok(DispatchOutcome::UpstreamError { message });
            }
        };

        let state = match registry.get_mut(&tick.ticker) {
            Some(state) if state.security_class() == class => state,
            _ => {
                return Err(DispatchError::UnknownTicker {
                    ticker: tick.ticker,
                    class,
                });
            }
        };

        let snapshot = state.apply(&tick);
        let mut report = DeliveryReport::default();

        for sink_id in state.sinks() {
            let Some(sink) = sinks.get(sink_id).and_then(SinkHandle::upgrade) else {
                report.dropped_sinks.push(*sink_id);
                continue;
            };

            match catch_unwind(AssertUnwindSafe(|| sink.on_tick(&snapshot))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(error)) => {
                    report.failed += 1;
                    metrics::record_sink_failure(SinkFailure::Error);
                    log_sink_error(*sink_id, &snapshot.ticker, &error);
                }
                Err(panic) => {
                    report.failed += 1;
                    metrics::record_sink_failure(SinkFailure::Panic);
                    tracing::error!(
                        sink = sink_id.get(),
                        ticker = %snapshot.ticker,
                        panic = panic_message(panic.as_ref()),
                        "Sink panicked in on_tick"
                    );
                }
            }
        }

        Ok(DispatchOutcome::Delivered(report))
    }
}

impl std::fmt::Debug for TickDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickDispatcher").finish_non_exhaustive()
    }
}

fn log_sink_error(sink: SinkId, ticker: &Ticker, error: &SinkError) {
    tracing::warn!(sink = sink.get(), ticker = %ticker, error = %error, "Sink rejected tick");
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
