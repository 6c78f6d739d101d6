//! Application Ports (Driver and Driven)
//!
//! Ports define the contracts between the router core and the outside
//! world. Infrastructure adapters implement the driven ports; chart code
//! implements [`TickSink`].
//!
//! ## Driven Ports (Outbound)
//!
//! - [`FeedTransport`]: opens one live feed connection per security class
//! - [`FeedCodec`]: decodes inbound frames and encodes control requests
//! - [`HistoricalDataPort`]: fetches a bounded window of past bars
//!
//! ## Callback Port
//!
//! - [`TickSink`]: receives tick snapshots, bars and connection failures

mod codec_port;
mod history_port;
mod sink_port;
mod transport_port;

pub use codec_port::{
    ControlMethod, ControlRequest, DecodeError, EncodeError, FeedCodec, FeedEvent,
};
pub use history_port::{HistoricalDataPort, HistoricalError, HistoryRequest, MAX_HISTORY_LIMIT};
pub use sink_port::{SinkError, SinkHandle, TickSink};
pub use transport_port::{
    FeedConnection, FeedTransport, InboundFrame, InboundStream, OutboundSink, TransportError,
};
