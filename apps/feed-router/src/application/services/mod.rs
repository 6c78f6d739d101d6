//! Application Services
//!
//! Services that drive the router and coordinate between ports.
//!
//! - [`FeedRouter`] / [`RouterWorker`]: command hand-off and the worker loop
//! - [`ConnectionManager`]: per-class connection lifecycle
//! - [`TickDispatcher`]: decode and fan-out of inbound frames
//! - [`ChartFeed`]: historical load followed by live streaming

mod chart;
mod command;
mod connection;
mod dispatcher;
mod reconnect;
mod router;
mod status;

pub use chart::{ChartError, ChartFeed, LoadRequest, LoadSummary};
pub use command::{Command, CommandQueue, CommandReceiver};
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionSettings, MissingEndpoint};
pub use dispatcher::{DeliveryReport, DispatchError, DispatchOutcome, TickDispatcher};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use router::{FeedRouter, RouterError, RouterWorker};
pub use status::{ConnectionState, RouterStatus, StatusSnapshot};
