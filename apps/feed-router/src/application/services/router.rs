//! Feed Router
//!
//! The caller-facing [`FeedRouter`] handle and the single [`RouterWorker`]
//! task behind it.
//!
//! # Concurrency
//!
//! Callers on any thread only enqueue commands and read [`RouterStatus`].
//! The worker owns the registry, the sink table and every connection, and
//! multiplexes the command queue, pending handshakes and inbound frames
//! with `tokio::select!`.
//!
//! A command that needs a class connection which is still connecting is
//! parked: the queue stops draining until the handshake resolves, so
//! commands always complete in enqueue order. Inbound frames keep flowing
//! while a command is parked.

use std::collections::{HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{ControlMethod, FeedCodec, FeedTransport, SinkHandle};
use crate::application::services::command::{Command, CommandQueue, CommandReceiver};
use crate::application::services::connection::{
    ConnectionEvent, ConnectionManager, ConnectionSettings,
};
use crate::application::services::dispatcher::{
    DispatchError, DispatchOutcome, TickDispatcher, panic_message,
};
use crate::application::services::status::{ConnectionState, RouterStatus, StatusSnapshot};
use crate::domain::streaming::{InvalidTicker, SecurityClass, SubscriptionKind, Ticker};
use crate::domain::subscription::{ClassConflict, SinkId, Subscription, SubscriptionRegistry};
use crate::infrastructure::metrics;

// =============================================================================
// Errors
// =============================================================================

/// Errors surfaced to router callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouterError {
    /// The ticker is empty after normalization.
    #[error(transparent)]
    InvalidTicker(#[from] InvalidTicker),

    /// A required transport, endpoint or provider is not configured.
    #[error("missing dependency: {0}")]
    MissingDependency(String),

    /// The worker has exited; the command was not enqueued.
    #[error("router worker stopped, {0} command rejected")]
    WorkerStopped(&'static str),
}

// =============================================================================
// Handle
// =============================================================================

/// Thread-safe handle to a running router. Cheap to clone.
///
/// # Example
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use feed_router::application::ports::{FeedCodec, FeedTransport, SinkHandle, TickSink};
/// # use feed_router::application::services::{ConnectionSettings, FeedRouter};
/// # use feed_router::domain::streaming::SecurityClass;
/// # use tokio_util::sync::CancellationToken;
/// # async fn demo(
/// #     transport: Arc<dyn FeedTransport>,
/// #     codec: Arc<dyn FeedCodec>,
/// #     chart: Arc<dyn TickSink>,
/// # ) -> Result<(), feed_router::application::services::RouterError> {
/// let (router, _worker) = FeedRouter::spawn(
///     transport,
///     codec,
///     ConnectionSettings::default(),
///     CancellationToken::new(),
/// );
///
/// let handle = SinkHandle::from_dyn(&chart);
/// router.subscribe(&handle, "BTC-USDT", SecurityClass::Crypto)?;
/// router.unsubscribe(&handle)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FeedRouter {
    queue: CommandQueue,
    status: Arc<RouterStatus>,
    available: Arc<HashSet<SecurityClass>>,
    cancel: CancellationToken,
}

impl FeedRouter {
    /// Start a worker on the current Tokio runtime.
    ///
    /// The worker stops when `cancel` fires or every handle is dropped.
    #[must_use]
    pub fn spawn(
        transport: Arc<dyn FeedTransport>,
        codec: Arc<dyn FeedCodec>,
        settings: ConnectionSettings,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (router, worker) = Self::new(transport, codec, settings, cancel);
        (router, tokio::spawn(worker.run()))
    }

    /// Create a handle and its worker without spawning it.
    #[must_use]
    pub fn new(
        transport: Arc<dyn FeedTransport>,
        codec: Arc<dyn FeedCodec>,
        settings: ConnectionSettings,
        cancel: CancellationToken,
    ) -> (Self, RouterWorker) {
        let (queue, commands) = CommandQueue::new();
        let status = Arc::new(RouterStatus::new());
        let available: HashSet<SecurityClass> = settings.endpoints.keys().copied().collect();

        let worker = RouterWorker {
            commands,
            connections: ConnectionManager::new(
                transport,
                Arc::clone(&codec),
                settings,
                Arc::clone(&status),
            ),
            registry: SubscriptionRegistry::new(),
            dispatcher: TickDispatcher::new(codec),
            sinks: HashMap::new(),
            parked: None,
            status: Arc::clone(&status),
            cancel: cancel.clone(),
        };

        let router = Self {
            queue,
            status,
            available: Arc::new(available),
            cancel,
        };

        (router, worker)
    }

    /// Subscribe a sink to a ticker's aggregate trades.
    ///
    /// Returns the normalized ticker.
    ///
    /// # Errors
    ///
    /// See [`subscribe_with`](Self::subscribe_with).
    pub fn subscribe(
        &self,
        sink: &SinkHandle,
        ticker: &str,
        class: SecurityClass,
    ) -> Result<Ticker, RouterError> {
        self.subscribe_with(sink, ticker, class, SubscriptionKind::default())
    }

    /// Subscribe a sink to a ticker on a channel family.
    ///
    /// `kind` only takes effect when the ticker has no subscribers yet.
    ///
    /// # Errors
    ///
    /// - [`RouterError::InvalidTicker`] if the ticker normalizes to nothing
    /// - [`RouterError::MissingDependency`] if the class has no endpoint
    /// - [`RouterError::WorkerStopped`] if the worker has exited
    pub fn subscribe_with(
        &self,
        sink: &SinkHandle,
        ticker: &str,
        class: SecurityClass,
        kind: SubscriptionKind,
    ) -> Result<Ticker, RouterError> {
        let ticker = Ticker::parse(ticker)?;
        self.require_endpoint(class)?;

        self.queue.enqueue(Command::Subscribe {
            sink: sink.clone(),
            ticker: ticker.clone(),
            class,
            kind,
        })?;
        Ok(ticker)
    }

    /// Remove a sink from every ticker it is subscribed to.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::WorkerStopped`] if the worker has exited.
    pub fn unsubscribe(&self, sink: &SinkHandle) -> Result<(), RouterError> {
        self.unsubscribe_id(sink.id())
    }

    /// Remove a sink by id.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::WorkerStopped`] if the worker has exited.
    pub fn unsubscribe_id(&self, sink: SinkId) -> Result<(), RouterError> {
        self.queue.enqueue(Command::Unsubscribe(sink))
    }

    /// Open a class's connection ahead of any subscription.
    ///
    /// # Errors
    ///
    /// - [`RouterError::MissingDependency`] if the class has no endpoint
    /// - [`RouterError::WorkerStopped`] if the worker has exited
    pub fn connect(&self, class: SecurityClass) -> Result<(), RouterError> {
        self.require_endpoint(class)?;
        self.queue.enqueue(Command::Connect(class))
    }

    /// Whether a class has a feed endpoint configured.
    #[must_use]
    pub fn has_endpoint(&self, class: SecurityClass) -> bool {
        self.available.contains(&class)
    }

    /// Current state of a class's connection.
    #[must_use]
    pub fn connection_state(&self, class: SecurityClass) -> ConnectionState {
        self.status.connection_state(class)
    }

    /// Copy of the router's counters and connection states.
    #[must_use]
    pub fn status(&self) -> StatusSnapshot {
        self.status.snapshot()
    }

    /// Stop the worker and close every connection.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn require_endpoint(&self, class: SecurityClass) -> Result<(), RouterError> {
        if self.has_endpoint(class) {
            Ok(())
        } else {
            Err(RouterError::MissingDependency(format!(
                "no feed endpoint configured for {class}"
            )))
        }
    }
}

// =============================================================================
// Worker
// =============================================================================

/// The single task that owns all router state.
pub struct RouterWorker {
    commands: CommandReceiver,
    connections: ConnectionManager,
    registry: SubscriptionRegistry,
    dispatcher: TickDispatcher,
    sinks: HashMap<SinkId, SinkHandle>,
    parked: Option<Command>,
    status: Arc<RouterStatus>,
    cancel: CancellationToken,
}

impl RouterWorker {
    /// Run until cancelled or every handle is dropped.
    pub async fn run(mut self) {
        tracing::info!("Router worker started");

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!("Router worker cancelled");
                    break;
                }
                event = self.connections.next_event() => {
                    self.on_connection_event(event).await;
                }
                command = self.commands.recv(), if self.parked.is_none() => {
                    let Some(command) = command else {
                        tracing::info!("All router handles dropped");
                        break;
                    };
                    metrics::record_command(command.name());
                    self.status.increment_commands();
                    self.execute(command).await;
                }
            }
        }

        self.connections.close_all();
        tracing::info!("Router worker stopped");
    }

    async fn execute(&mut self, command: Command) {
        if let Command::Subscribe {
            sink,
            ticker,
            class,
            ..
        } = &command
            && let Err(conflict) = self.registry.check_class(ticker, *class)
        {
            self.reject_conflict(sink, &conflict);
            return;
        }

        if let Some(class) = command.required_class() {
            match self.connections.ensure_connection(class) {
                Ok(ConnectionState::Open) => {}
                Ok(_) => {
                    tracing::debug!(
                        class = %class,
                        command = command.name(),
                        "Parking command until connected"
                    );
                    self.parked = Some(command);
                    return;
                }
                Err(missing) => {
                    self.reject(command, &missing.to_string());
                    return;
                }
            }
        }

        match command {
            Command::Connect(_) => {}
            Command::Subscribe {
                sink,
                ticker,
                class,
                kind,
            } => self.subscribe(sink, ticker, class, kind).await,
            Command::Unsubscribe(sink) => self.unsubscribe(sink).await,
        }

        self.publish_registry_size();
    }

    async fn subscribe(
        &mut self,
        sink: SinkHandle,
        ticker: Ticker,
        class: SecurityClass,
        kind: SubscriptionKind,
    ) {
        let sink_id = sink.id();
        match self.registry.subscribe(sink_id, ticker.clone(), class, kind) {
            Ok(changes) => {
                self.sinks.insert(sink_id, sink);
                tracing::debug!(
                    sink = sink_id.get(),
                    ticker = %ticker,
                    class = %class,
                    "Sink subscribed"
                );
                self.send_control(class, ControlMethod::Subscribe, &changes.subscribe)
                    .await;
            }
            Err(conflict) => self.reject_conflict(&sink, &conflict),
        }
    }

    async fn unsubscribe(&mut self, sink: SinkId) {
        let changes = self.registry.unsubscribe(sink);
        self.sinks.remove(&sink);
        tracing::debug!(sink = sink.get(), "Sink unsubscribed");

        // Dispatch is synchronous, so no undelivered ticks are buffered per
        // ticker. Frames still in flight for these tickers now decode as
        // unknown and are dropped.
        for (class, changes) in changes {
            if self.connections.state(class) == ConnectionState::Open {
                self.send_control(class, ControlMethod::Unsubscribe, &changes.unsubscribe)
                    .await;
            } else {
                tracing::debug!(
                    class = %class,
                    "Connection not open, skipping upstream unsubscribe"
                );
            }
        }
    }

    async fn send_control(
        &mut self,
        class: SecurityClass,
        method: ControlMethod,
        subscriptions: &[Subscription],
    ) {
        if subscriptions.is_empty() {
            return;
        }
        if let Err(error) = self.connections.send(class, method, subscriptions).await {
            tracing::warn!(
                class = %class,
                method = method.as_str(),
                error = %error,
                "Control request not sent"
            );
            self.on_dropped(class);
        }
    }

    async fn on_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Opened { class, attempts } => {
                let replay = self.registry.subscriptions_for(class);
                if !replay.is_empty() {
                    tracing::info!(
                        class = %class,
                        count = replay.len(),
                        attempts,
                        "Replaying subscriptions"
                    );
                }
                self.send_control(class, ControlMethod::Subscribe, &replay)
                    .await;

                if self.parked.as_ref().and_then(Command::required_class) == Some(class)
                    && let Some(command) = self.parked.take()
                {
                    self.execute(command).await;
                }
            }
            ConnectionEvent::Failed {
                class,
                error,
                attempts,
            } => {
                metrics::record_handshake_failure(class);
                self.status.increment_handshake_failures();
                let reason = format!("connection failed after {attempts} attempts: {error}");
                self.fail_class(class, &reason);
            }
            ConnectionEvent::Frame { class, frame } => self.on_frame(class, &frame).await,
            ConnectionEvent::Dropped { class, .. } => self.on_dropped(class),
        }
    }

    async fn on_frame(&mut self, class: SecurityClass, frame: &str) {
        self.status.increment_frames();
        metrics::record_frame_received(class);
        let started = Instant::now();

        match self
            .dispatcher
            .on_event(class, frame, &mut self.registry, &self.sinks)
        {
            Ok(DispatchOutcome::Delivered(report)) => {
                self.status.add_ticks_dispatched(report.delivered);
                metrics::record_ticks_dispatched(class, report.delivered);
                if report.failed > 0 {
                    self.status.add_sink_failures(report.failed);
                }
                for sink in report.dropped_sinks {
                    tracing::debug!(sink = sink.get(), "Pruning dropped sink");
                    self.unsubscribe(sink).await;
                    self.publish_registry_size();
                }
            }
            Ok(DispatchOutcome::Ack { id }) => {
                tracing::debug!(class = %class, ?id, "Control request acknowledged");
            }
            Ok(DispatchOutcome::UpstreamError { message }) => {
                self.status.set_error(format!("{class}: {message}"));
            }
            Ok(DispatchOutcome::Ignored) => {}
            Err(DispatchError::Decode(error)) => {
                self.status.increment_decode_errors();
                metrics::record_decode_error(class);
                tracing::warn!(
                    class = %class,
                    error = %error,
                    frame = %truncate(frame, 200),
                    "Discarding undecodable frame"
                );
            }
            Err(DispatchError::UnknownTicker { ticker, .. }) => {
                self.status.increment_unknown_ticker();
                metrics::record_unknown_ticker(class);
                tracing::trace!(
                    class = %class,
                    ticker = %ticker,
                    "Dropping tick for unsubscribed ticker"
                );
            }
        }

        metrics::record_dispatch_duration(class, started.elapsed());
    }

    fn on_dropped(&mut self, class: SecurityClass) {
        if !self.registry.has_class(class) {
            tracing::info!(class = %class, "No subscriptions left, staying disconnected");
            return;
        }

        tracing::info!(class = %class, "Reconnecting feed");
        if let Err(missing) = self.connections.reconnect(class) {
            self.fail_class(class, &missing.to_string());
        }
    }

    /// Give up on a class: notify and drop every sink subscribed under it,
    /// plus a parked command waiting on it.
    fn fail_class(&mut self, class: SecurityClass, reason: &str) {
        tracing::error!(class = %class, reason, "Dropping subscriptions for class");

        let mut notified = HashSet::new();
        for state in self.registry.remove_class(class) {
            for sink in state.sinks() {
                if notified.insert(*sink)
                    && let Some(handle) = self.sinks.get(sink)
                {
                    notify_connection_failed(handle, class, reason);
                }
            }
        }
        self.sinks.retain(|id, _| self.registry.contains_sink(*id));

        if self.parked.as_ref().and_then(Command::required_class) == Some(class)
            && let Some(command) = self.parked.take()
        {
            let already_notified = matches!(
                &command,
                Command::Subscribe { sink, .. } if notified.contains(&sink.id())
            );
            if !already_notified {
                self.reject(command, reason);
            }
        }

        self.publish_registry_size();
    }

    fn reject(&self, command: Command, reason: &str) {
        match command {
            Command::Subscribe { sink, class, .. } => {
                tracing::warn!(sink = sink.id().get(), class = %class, reason, "Subscribe failed");
                notify_connection_failed(&sink, class, reason);
            }
            other => {
                tracing::warn!(command = other.name(), reason, "Command failed");
            }
        }
    }

    fn reject_conflict(&self, sink: &SinkHandle, conflict: &ClassConflict) {
        let reason = conflict.to_string();
        tracing::warn!(sink = sink.id().get(), reason = %reason, "Subscription rejected");
        self.status.set_error(reason.clone());
        notify_subscription_rejected(sink, &conflict.ticker, &reason);
    }

    fn publish_registry_size(&self) {
        let stats = self.registry.stats();
        self.status
            .set_registry_size(stats.ticker_count, stats.sink_count);
        metrics::set_registry_size(stats.ticker_count, stats.sink_count);
    }
}

impl std::fmt::Debug for RouterWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterWorker")
            .field("connections", &self.connections)
            .field("registry", &self.registry.stats())
            .field("parked", &self.parked.as_ref().map(Command::name))
            .finish_non_exhaustive()
    }
}

fn notify_connection_failed(sink: &SinkHandle, class: SecurityClass, reason: &str) {
    let Some(target) = sink.upgrade() else {
        return;
    };
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| {
        target.on_connection_failed(class, reason);
    })) {
        metrics::record_sink_failure(metrics::SinkFailure::Panic);
        tracing::error!(
            sink = sink.id().get(),
            panic = panic_message(panic.as_ref()),
            "Sink panicked in on_connection_failed"
        );
    }
}

fn notify_subscription_rejected(sink: &SinkHandle, ticker: &Ticker, reason: &str) {
    let Some(target) = sink.upgrade() else {
        return;
    };
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| {
        target.on_subscription_rejected(ticker, reason);
    })) {
        metrics::record_sink_failure(metrics::SinkFailure::Panic);
        tracing::error!(
            sink = sink.id().get(),
            panic = panic_message(panic.as_ref()),
            "Sink panicked in on_subscription_rejected"
        );
    }
}

fn truncate(frame: &str, max: usize) -> &str {
    match frame.char_indices().nth(max) {
        Some((end, _)) => &frame[..end],
        None => frame,
    }
}
