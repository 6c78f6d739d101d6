//! Command Queue
//!
//! Hand-off between arbitrary caller threads and the single router
//! worker. Commands are executed strictly in enqueue order.

use tokio::sync::mpsc;

use crate::application::ports::SinkHandle;
use crate::application::services::router::RouterError;
use crate::domain::streaming::{SecurityClass, SubscriptionKind, Ticker};
use crate::domain::subscription::SinkId;

/// A request for the router worker. Immutable once enqueued.
#[derive(Debug, Clone)]
pub enum Command {
    /// Make sure a class's connection is open.
    Connect(SecurityClass),
    /// Add a sink to a ticker.
    Subscribe {
        /// Sink to deliver to.
        sink: SinkHandle,
        /// Normalized ticker.
        ticker: Ticker,
        /// Class the ticker trades under.
        class: SecurityClass,
        /// Channel family, used only when the ticker is new.
        kind: SubscriptionKind,
    },
    /// Remove a sink from every ticker it holds.
    Unsubscribe(SinkId),
}

impl Command {
    /// Class whose connection must be open before the command can run.
    #[must_use]
    pub const fn required_class(&self) -> Option<SecurityClass> {
        match self {
            Self::Connect(class) | Self::Subscribe { class, .. } => Some(*class),
            Self::Unsubscribe(_) => None,
        }
    }

    /// Short name for logs and metric labels.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe(_) => "unsubscribe",
        }
    }
}

/// Receiving half, owned by the worker.
pub type CommandReceiver = mpsc::UnboundedReceiver<Command>;

/// Sending half. Cheap to clone; callable from any thread.
#[derive(Debug, Clone)]
pub struct CommandQueue {
    tx: mpsc::UnboundedSender<Command>,
}

impl CommandQueue {
    /// Create a queue and its receiving half.
    #[must_use]
    pub fn new() -> (Self, CommandReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Enqueue a command without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::WorkerStopped`] once the worker has exited.
    pub fn enqueue(&self, command: Command) -> Result<(), RouterError> {
        self.tx
            .send(command)
            .map_err(|rejected| RouterError::WorkerStopped(rejected.0.name()))
    }

    /// Whether the worker has exited.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_drain_in_fifo_order() {
        let (queue, mut rx) = CommandQueue::new();

        queue.enqueue(Command::Connect(SecurityClass::Crypto)).unwrap();
        queue.enqueue(Command::Unsubscribe(SinkId::from(7))).unwrap();
        queue.enqueue(Command::Connect(SecurityClass::Equity)).unwrap();

        assert!(matches!(rx.try_recv(), Ok(Command::Connect(SecurityClass::Crypto))));
        assert!(matches!(rx.try_recv(), Ok(Command::Unsubscribe(id)) if id == SinkId::from(7)));
        assert!(matches!(rx.try_recv(), Ok(Command::Connect(SecurityClass::Equity))));
    }

    #[test]
    fn enqueue_after_worker_stopped_fails() {
        let (queue, rx) = CommandQueue::new();
        drop(rx);

        let err = queue.enqueue(Command::Connect(SecurityClass::Crypto)).unwrap_err();

        assert!(matches!(err, RouterError::WorkerStopped("connect")));
        assert!(queue.is_closed());
    }

    #[test]
    fn unsubscribe_needs_no_connection() {
        assert_eq!(Command::Unsubscribe(SinkId::from(1)).required_class(), None);
        assert_eq!(
            Command::Connect(SecurityClass::Equity).required_class(),
            Some(SecurityClass::Equity)
        );
    }
}
