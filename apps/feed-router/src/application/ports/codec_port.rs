//! Feed Codec Port
//!
//! Translates between exchange wire frames and router events. Kept apart
//! from the transport so the dispatcher and connection manager stay
//! exchange-agnostic.

use crate::domain::streaming::Tick;

/// Upstream subscription verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMethod {
    /// Start streaming channels.
    Subscribe,
    /// Stop streaming channels.
    Unsubscribe,
}

impl ControlMethod {
    /// Wire verb.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
        }
    }
}

/// Outbound control request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRequest {
    /// Verb.
    pub method: ControlMethod,
    /// Channel names, e.g. `btcusdt@aggTrade`.
    pub channels: Vec<String>,
    /// Request id, monotonically increasing per router.
    pub id: u64,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// Market update.
    Tick(Tick),
    /// Control request acknowledged.
    Ack {
        /// Id of the acknowledged request.
        id: Option<u64>,
    },
    /// Control request rejected upstream.
    UpstreamError {
        /// Exchange error code.
        code: Option<i64>,
        /// Exchange error message.
        message: String,
        /// Id of the rejected request.
        id: Option<u64>,
    },
}

/// Malformed inbound frame. Discarded and logged, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(String),

    /// Valid JSON but not an object.
    #[error("expected JSON object, got: {0}")]
    NotAnObject(String),

    /// A required field is absent.
    #[error("missing field {field} in {event} event")]
    MissingField {
        /// Event type.
        event: String,
        /// Field name.
        field: &'static str,
    },

    /// The payload does not match the event's schema.
    #[error("malformed {event} event: {message}")]
    Schema {
        /// Event type.
        event: String,
        /// Deserializer message.
        message: String,
    },

    /// A field has the wrong type or an unparsable value.
    #[error("invalid field {field}: {value}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Control request could not be encoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to encode control request: {0}")]
pub struct EncodeError(pub String);

/// Exchange wire format.
pub trait FeedCodec: Send + Sync {
    /// Decode one inbound text frame.
    ///
    /// Returns `Ok(None)` for well-formed frames of an event type the
    /// router does not handle.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] for malformed frames.
    fn decode(&self, frame: &str) -> Result<Option<FeedEvent>, DecodeError>;

    /// Encode an outbound control request.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] if serialization fails.
    fn encode_control(&self, request: &ControlRequest) -> Result<String, EncodeError>;
}
