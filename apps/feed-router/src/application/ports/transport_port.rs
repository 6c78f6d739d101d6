//! Feed Transport Port (Driven Port)
//!
//! Interface for opening a live feed connection. A connection is a pair of
//! an outbound text sink and an inbound frame stream; the router owns both
//! halves for the life of the connection.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Sink;
use futures::stream::BoxStream;

use crate::domain::streaming::SecurityClass;

/// Outbound half: control messages as text frames.
pub type OutboundSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// One item read from a live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Feed data.
    Text(String),
    /// A ping or pong. Proves the connection is alive and carries no data.
    Heartbeat,
}

/// Inbound half: frames until the connection closes.
///
/// The stream ending, or yielding an error, means the connection dropped.
pub type InboundStream = BoxStream<'static, Result<InboundFrame, TransportError>>;

/// An established live feed connection.
pub struct FeedConnection {
    /// Outbound half.
    pub outbound: OutboundSink,
    /// Inbound half.
    pub inbound: InboundStream,
}

impl FeedConnection {
    /// Bundle the two halves.
    #[must_use]
    pub fn new(outbound: OutboundSink, inbound: InboundStream) -> Self {
        Self { outbound, inbound }
    }
}

impl std::fmt::Debug for FeedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedConnection").finish_non_exhaustive()
    }
}

/// Transport failure. Retried with backoff by the connection manager.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Handshake failed.
    #[error("connect failed: {message}")]
    Connect {
        /// Error details.
        message: String,
    },

    /// Writing a frame failed.
    #[error("send failed: {message}")]
    Send {
        /// Error details.
        message: String,
    },

    /// Reading a frame failed.
    #[error("receive failed: {message}")]
    Receive {
        /// Error details.
        message: String,
    },

    /// No inbound frame or heartbeat within the idle timeout.
    #[error("no data received for {0:?}")]
    Idle(Duration),

    /// The connection was closed.
    #[error("connection closed")]
    Closed,
}

/// Port for opening live feed connections.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    /// Perform the handshake with the feed endpoint of a class.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] when the handshake fails.
    async fn connect(
        &self,
        class: SecurityClass,
        url: &str,
    ) -> Result<FeedConnection, TransportError>;
}
