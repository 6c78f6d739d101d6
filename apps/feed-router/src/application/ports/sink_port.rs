//! Tick Sink Port
//!
//! Interface the router calls into for every delivery. Sinks are owned by
//! the caller; the router only holds a [`Weak`] reference through a
//! [`SinkHandle`].

use std::fmt;
use std::sync::{Arc, Weak};

use crate::domain::streaming::{Bar, SecurityClass, TickSnapshot, Ticker};
use crate::domain::subscription::SinkId;

/// Error a sink reports from a callback. Logged by the router, never
/// propagated to other sinks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// The sink refused the update.
    #[error("sink rejected update: {message}")]
    Rejected {
        /// Error details.
        message: String,
    },

    /// The sink is shutting down and no longer accepts updates.
    #[error("sink closed")]
    Closed,
}

impl SinkError {
    /// Create a rejection with a message.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }
}

/// Consumer of live ticks, typically a chart.
///
/// Callbacks run synchronously on the router worker; a slow sink delays
/// delivery to every other sink, so implementations should hand work off
/// rather than block.
pub trait TickSink: Send + Sync {
    /// Called for every tick of a subscribed ticker.
    ///
    /// # Errors
    ///
    /// Any error is logged and counted; delivery to other sinks continues.
    fn on_tick(&self, tick: &TickSnapshot) -> Result<(), SinkError>;

    /// Called when the connection for a class could not be established
    /// within the retry budget. The sink's subscriptions for that class
    /// have been dropped.
    fn on_connection_failed(&self, class: SecurityClass, reason: &str);

    /// Called when a subscribe was refused by the worker, for example because
    /// the ticker already streams under another class. Nothing was
    /// registered for the sink.
    fn on_subscription_rejected(&self, ticker: &Ticker, reason: &str) {
        let _ = (ticker, reason);
    }

    /// Called with a historical window loaded through `ChartFeed`.
    ///
    /// # Errors
    ///
    /// Returned errors abort the load.
    fn on_bars(&self, bars: &[Bar]) -> Result<(), SinkError> {
        let _ = bars;
        Ok(())
    }
}

/// Equality-comparable, non-owning reference to a sink.
///
/// The [`SinkId`] is the address of the sink's allocation, so every handle
/// built from the same `Arc` is equal to every other. The [`Weak`] keeps the
/// allocation reserved, which means an id cannot be reused while a handle to
/// it is still registered.
#[derive(Clone)]
pub struct SinkHandle {
    id: SinkId,
    sink: Weak<dyn TickSink>,
}

impl SinkHandle {
    /// Create a handle for a sink.
    #[must_use]
    pub fn new<S: TickSink + 'static>(sink: &Arc<S>) -> Self {
        let sink: Arc<dyn TickSink> = sink.clone();
        Self::from_dyn(&sink)
    }

    /// Create a handle from an already type-erased sink.
    #[must_use]
    pub fn from_dyn(sink: &Arc<dyn TickSink>) -> Self {
        let address = Arc::as_ptr(sink).cast::<()>().addr();
        Self {
            id: SinkId::from(address as u64),
            sink: Arc::downgrade(sink),
        }
    }

    /// Sink identity.
    #[must_use]
    pub const fn id(&self) -> SinkId {
        self.id
    }

    /// Resolve the sink, or `None` once its owner dropped it.
    #[must_use]
    pub fn upgrade(&self) -> Option<Arc<dyn TickSink>> {
        self.sink.upgrade()
    }

    /// Whether the owner dropped the sink.
    #[must_use]
    pub fn is_dropped(&self) -> bool {
        self.sink.strong_count() == 0
    }
}

impl PartialEq for SinkHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SinkHandle {}

impl fmt::Debug for SinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkHandle")
            .field("id", &self.id.get())
            .field("alive", &!self.is_dropped())
            .finish()
    }
}
