//! Connection Manager
//!
//! Owns at most one live feed connection per security class.
//!
//! # State Machine
//!
//! ```text
//! Disconnected ──ensure──▶ Connecting ──handshake ok──▶ Open
//!      ▲                       │                         │
//!      └──── budget spent ─────┘◀──── drop (tickers left)┘
//! ```
//!
//! Handshakes run as futures polled from [`ConnectionManager::next_event`],
//! so a pending handshake never blocks inbound traffic on other classes.
//! Every connection carries a generation; frames and close events from a
//! superseded generation are discarded.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{AbortHandle, Abortable, BoxFuture};
use futures::stream::{self, BoxStream, FuturesUnordered, SelectAll};
use futures::{FutureExt, SinkExt, StreamExt};

use crate::application::ports::{
    ControlMethod, ControlRequest, FeedCodec, FeedConnection, FeedTransport, InboundFrame,
    InboundStream, OutboundSink, TransportError,
};
use crate::application::services::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::services::status::{ConnectionState, RouterStatus};
use crate::domain::streaming::SecurityClass;
use crate::domain::subscription::Subscription;
use crate::infrastructure::metrics;

/// Connection settings shared by every class.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Feed endpoint per class. A class without one cannot be connected.
    pub endpoints: HashMap<SecurityClass, String>,
    /// Backoff between connection attempts.
    pub backoff: ReconnectConfig,
    /// Connection attempts per handshake before giving up.
    pub max_connect_attempts: u32,
    /// Silence after which a connection is treated as dropped. Zero disables.
    pub idle_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            endpoints: HashMap::new(),
            backoff: ReconnectConfig::default(),
            max_connect_attempts: 5,
            idle_timeout: Duration::from_secs(45),
        }
    }
}

/// No endpoint is configured for a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no feed endpoint configured for {0}")]
pub struct MissingEndpoint(pub SecurityClass);

/// Something the worker must react to.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// Handshake completed; the class is `Open`.
    Opened {
        /// Class.
        class: SecurityClass,
        /// Attempts the handshake took.
        attempts: u32,
    },
    /// Handshake gave up; the class is `Disconnected`.
    Failed {
        /// Class.
        class: SecurityClass,
        /// Last transport error.
        error: TransportError,
        /// Attempts made.
        attempts: u32,
    },
    /// Inbound text frame on an open connection.
    Frame {
        /// Class.
        class: SecurityClass,
        /// Raw frame.
        frame: String,
    },
    /// An open connection went away; the class is `Disconnected`.
    Dropped {
        /// Class.
        class: SecurityClass,
        /// Cause, or `None` on a clean close.
        error: Option<TransportError>,
    },
}

enum Slot {
    Connecting {
        generation: u64,
    },
    Open {
        generation: u64,
        outbound: OutboundSink,
        abort: AbortHandle,
    },
}

impl Slot {
    const fn generation(&self) -> u64 {
        match self {
            Self::Connecting { generation } | Self::Open { generation, .. } => *generation,
        }
    }
}

struct HandshakeOutcome {
    class: SecurityClass,
    generation: u64,
    attempts: u32,
    result: Result<FeedConnection, TransportError>,
}

struct Inbound {
    class: SecurityClass,
    generation: u64,
    /// `None` once the stream ended.
    frame: Option<Result<InboundFrame, TransportError>>,
}

enum Polled {
    Handshake(HandshakeOutcome),
    Inbound(Inbound),
}

/// Per-class connection owner. Driven exclusively by the router worker.
pub struct ConnectionManager {
    transport: Arc<dyn FeedTransport>,
    codec: Arc<dyn FeedCodec>,
    settings: ConnectionSettings,
    status: Arc<RouterStatus>,
    slots: HashMap<SecurityClass, Slot>,
    handshakes: FuturesUnordered<BoxFuture<'static, HandshakeOutcome>>,
    inbound: SelectAll<BoxStream<'static, Inbound>>,
    next_generation: u64,
    next_request_id: u64,
}

impl ConnectionManager {
    /// Create a manager with no connections.
    #[must_use]
    pub fn new(
        transport: Arc<dyn FeedTransport>,
        codec: Arc<dyn FeedCodec>,
        settings: ConnectionSettings,
        status: Arc<RouterStatus>,
    ) -> Self {
        Self {
            transport,
            codec,
            settings,
            status,
            slots: HashMap::new(),
            handshakes: FuturesUnordered::new(),
            inbound: SelectAll::new(),
            next_generation: 0,
            next_request_id: 1,
        }
    }

    /// Whether a class can be connected at all.
    #[must_use]
    pub fn has_endpoint(&self, class: SecurityClass) -> bool {
        self.settings.endpoints.contains_key(&class)
    }

    /// Current state of a class.
    #[must_use]
    pub fn state(&self, class: SecurityClass) -> ConnectionState {
        match self.slots.get(&class) {
            None => ConnectionState::Disconnected,
            Some(Slot::Connecting { .. }) => ConnectionState::Connecting,
            Some(Slot::Open { .. }) => ConnectionState::Open,
        }
    }

    /// Make sure a class is connected or connecting. Idempotent.
    ///
    /// Starts a handshake when the class is `Disconnected`; the caller
    /// learns the outcome from [`next_event`](Self::next_event).
    ///
    /// # Errors
    ///
    /// Returns [`MissingEndpoint`] when no endpoint is configured.
    pub fn ensure_connection(
        &mut self,
        class: SecurityClass,
    ) -> Result<ConnectionState, MissingEndpoint> {
        match self.state(class) {
            ConnectionState::Disconnected => {
                self.start_handshake(class, false)?;
                Ok(ConnectionState::Connecting)
            }
            state => Ok(state),
        }
    }

    /// Start a handshake after a drop, waiting one backoff step first.
    ///
    /// # Errors
    ///
    /// Returns [`MissingEndpoint`] when no endpoint is configured.
    pub fn reconnect(&mut self, class: SecurityClass) -> Result<(), MissingEndpoint> {
        if self.state(class) != ConnectionState::Disconnected {
            return Ok(());
        }
        metrics::record_reconnect(class);
        self.status.increment_reconnects();
        self.start_handshake(class, true)
    }

    fn start_handshake(
        &mut self,
        class: SecurityClass,
        after_drop: bool,
    ) -> Result<(), MissingEndpoint> {
        let url = self
            .settings
            .endpoints
            .get(&class)
            .cloned()
            .ok_or(MissingEndpoint(class))?;

        self.next_generation += 1;
        let generation = self.next_generation;
        self.slots.insert(class, Slot::Connecting { generation });
        self.set_state(class, ConnectionState::Connecting);

        tracing::info!(class = %class, url = %url, generation, "Connecting to feed");

        let backoff = self
            .settings
            .backoff
            .clone()
            .with_max_attempts(self.settings.max_connect_attempts);
        self.handshakes.push(
            handshake(Arc::clone(&self.transport), class, url, generation, backoff, after_drop)
                .boxed(),
        );
        Ok(())
    }

    /// Send a control request for `subscriptions` on an open connection.
    ///
    /// On failure the connection is torn down and the class becomes
    /// `Disconnected`; the caller decides whether to reconnect.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] if the class is not open, or the
    /// send error.
    pub async fn send(
        &mut self,
        class: SecurityClass,
        method: ControlMethod,
        subscriptions: &[Subscription],
    ) -> Result<u64, TransportError> {
        if subscriptions.is_empty() {
            return Ok(0);
        }

        let Some(Slot::Open { outbound, .. }) = self.slots.get_mut(&class) else {
            return Err(TransportError::Closed);
        };

        let id = self.next_request_id;
        self.next_request_id += 1;
        let request = ControlRequest {
            method,
            channels: subscriptions.iter().map(Subscription::channel).collect(),
            id,
        };
        let frame = self
            .codec
            .encode_control(&request)
            .map_err(|e| TransportError::Send {
                message: e.to_string(),
            })?;

        tracing::debug!(
            class = %class,
            method = method.as_str(),
            channels = ?request.channels,
            id,
            "Sending control request"
        );

        let sent = outbound.send(frame).await;
        if let Err(e) = sent {
            tracing::warn!(class = %class, error = %e, "Control request failed");
            self.teardown(class);
            return Err(e);
        }

        Ok(id)
    }

    /// Wait for the next handshake outcome, frame, or drop.
    ///
    /// Pending forever while nothing is connected or connecting. Cancel
    /// safe: dropping the future loses no event.
    pub async fn next_event(&mut self) -> ConnectionEvent {
        loop {
            let polled = tokio::select! {
                Some(outcome) = self.handshakes.next(), if !self.handshakes.is_empty() => {
                    Polled::Handshake(outcome)
                }
                Some(inbound) = self.inbound.next(), if !self.inbound.is_empty() => {
                    Polled::Inbound(inbound)
                }
                else => std::future::pending().await,
            };

            let event = match polled {
                Polled::Handshake(outcome) => self.on_handshake(outcome),
                Polled::Inbound(inbound) => self.on_inbound(inbound),
            };

            if let Some(event) = event {
                return event;
            }
        }
    }

    fn on_handshake(&mut self, outcome: HandshakeOutcome) -> Option<ConnectionEvent> {
        let HandshakeOutcome {
            class,
            generation,
            attempts,
            result,
        } = outcome;

        if !matches!(
            self.slots.get(&class),
            Some(Slot::Connecting { generation: g }) if *g == generation
        ) {
            tracing::debug!(class = %class, generation, "Discarding superseded handshake");
            return None;
        }

        match result {
            Ok(connection) => {
                self.open(class, generation, connection);
                tracing::info!(class = %class, generation, attempts, "Feed connected");
                Some(ConnectionEvent::Opened { class, attempts })
            }
            Err(error) => {
                self.slots.remove(&class);
                self.set_state(class, ConnectionState::Disconnected);
                self.status.set_error(format!("{class}: {error}"));
                Some(ConnectionEvent::Failed {
                    class,
                    error,
                    attempts,
                })
            }
        }
    }

    fn on_inbound(&mut self, inbound: Inbound) -> Option<ConnectionEvent> {
        let Inbound {
            class,
            generation,
            frame,
        } = inbound;

        if self.slots.get(&class).map(Slot::generation) != Some(generation) {
            return None;
        }

        match frame {
            Some(Ok(InboundFrame::Text(frame))) => Some(ConnectionEvent::Frame { class, frame }),
            Some(Ok(InboundFrame::Heartbeat)) => None,
            Some(Err(error)) => {
                tracing::warn!(class = %class, error = %error, "Feed connection dropped");
                self.status.set_error(format!("{class}: {error}"));
                self.teardown(class);
                Some(ConnectionEvent::Dropped {
                    class,
                    error: Some(error),
                })
            }
            None => {
                tracing::warn!(class = %class, "Feed connection closed");
                self.teardown(class);
                Some(ConnectionEvent::Dropped { class, error: None })
            }
        }
    }

    fn open(&mut self, class: SecurityClass, generation: u64, connection: FeedConnection) {
        let FeedConnection { outbound, inbound } = connection;
        let (abort, registration) = AbortHandle::new_pair();

        let inbound = with_idle_timeout(inbound, self.settings.idle_timeout);
        let frames = Abortable::new(inbound, registration)
            .map(move |frame| Inbound {
                class,
                generation,
                frame: Some(frame),
            })
            .chain(stream::once(async move {
                Inbound {
                    class,
                    generation,
                    frame: None,
                }
            }));

        self.inbound.push(frames.boxed());
        self.slots.insert(
            class,
            Slot::Open {
                generation,
                outbound,
                abort,
            },
        );
        self.set_state(class, ConnectionState::Open);
    }

    /// Close a class's connection, or abandon its handshake.
    pub fn close(&mut self, class: SecurityClass) {
        if self.slots.contains_key(&class) {
            tracing::info!(class = %class, "Closing feed connection");
            self.teardown(class);
        }
    }

    /// Close every connection.
    pub fn close_all(&mut self) {
        let classes: Vec<SecurityClass> = self.slots.keys().copied().collect();
        for class in classes {
            self.close(class);
        }
    }

    fn teardown(&mut self, class: SecurityClass) {
        if let Some(Slot::Open { abort, .. }) = self.slots.remove(&class) {
            abort.abort();
        }
        self.set_state(class, ConnectionState::Disconnected);
    }

    fn set_state(&self, class: SecurityClass, state: ConnectionState) {
        self.status.set_connection_state(class, state);
        metrics::set_connection_state(class, state);
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("slots", &self.slots.len())
            .field("handshakes", &self.handshakes.len())
            .field("next_request_id", &self.next_request_id)
            .finish_non_exhaustive()
    }
}

async fn handshake(
    transport: Arc<dyn FeedTransport>,
    class: SecurityClass,
    url: String,
    generation: u64,
    backoff: ReconnectConfig,
    after_drop: bool,
) -> HandshakeOutcome {
    let mut policy = ReconnectPolicy::new(backoff);
    if after_drop {
        tokio::time::sleep(policy.reconnect_delay()).await;
    }

    let mut attempts = 0;

    loop {
        attempts += 1;
        match transport.connect(class, &url).await {
            Ok(connection) => {
                return HandshakeOutcome {
                    class,
                    generation,
                    attempts,
                    result: Ok(connection),
                };
            }
            Err(error) => match policy.next_delay() {
                Some(delay) => {
                    tracing::warn!(
                        class = %class,
                        attempt = attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "Connect failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    tracing::error!(
                        class = %class,
                        attempts,
                        error = %error,
                        "Connect failed, giving up"
                    );
                    return HandshakeOutcome {
                        class,
                        generation,
                        attempts,
                        result: Err(error),
                    };
                }
            },
        }
    }
}

/// End the stream with [`TransportError::Idle`] after `idle` of silence.
/// Heartbeats count as traffic.
fn with_idle_timeout(inbound: InboundStream, idle: Duration) -> InboundStream {
    if idle.is_zero() {
        return inbound;
    }

    stream::unfold(Some(inbound), move |state| async move {
        let mut inbound = state?;
        match tokio::time::timeout(idle, inbound.next()).await {
            Ok(Some(item)) => Some((item, Some(inbound))),
            Ok(None) => None,
            Err(_) => Some((Err(TransportError::Idle(idle)), None)),
        }
    })
    .boxed()
}
