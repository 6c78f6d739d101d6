//! Binance Stream Codec
//!
//! Decodes spot market data frames into [`FeedEvent`]s and encodes
//! subscription control requests.
//!
//! Frames are JSON objects tagged by `e`. Frames from the combined-stream
//! endpoint arrive wrapped in `{"stream": ..., "data": {...}}` and are
//! unwrapped first. Control replies carry no `e` and are recognized by
//! their `result` / `error` keys.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::messages::{
    AggTradeEvent, ControlMessage, ControlReply, ErrorReply, KlineEvent, StreamEnvelope,
    TradeEvent,
};
use crate::application::ports::{
    ControlRequest, DecodeError, EncodeError, FeedCodec, FeedEvent,
};
use crate::domain::streaming::{Tick, Ticker};

/// JSON codec for the Binance spot stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct BinanceCodec;

impl BinanceCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn decode_object(object: Map<String, Value>) -> Result<Option<FeedEvent>, DecodeError> {
        if object.contains_key("stream") && object.contains_key("data") {
            let envelope: StreamEnvelope = from_object(object, "envelope")?;
            return match envelope.data {
                Value::Object(inner) => Self::decode_object(inner),
                other => Err(DecodeError::NotAnObject(preview(&other.to_string()))),
            };
        }

        let event_type = match object.get("e") {
            Some(Value::String(e)) => Some(e.clone()),
            Some(other) => {
                return Err(DecodeError::InvalidField {
                    field: "e",
                    value: other.to_string(),
                });
            }
            None => None,
        };

        match event_type.as_deref() {
            Some("aggTrade") => {
                let event: AggTradeEvent = from_object(object, "aggTrade")?;
                Ok(Some(FeedEvent::Tick(Tick {
                    ticker: parse_symbol(&event.symbol)?,
                    price: event.price,
                    volume: event.quantity,
                    event_time: event.trade_time,
                })))
            }
            Some("trade") => {
                let event: TradeEvent = from_object(object, "trade")?;
                Ok(Some(FeedEvent::Tick(Tick {
                    ticker: parse_symbol(&event.symbol)?,
                    price: event.price,
                    volume: event.quantity,
                    event_time: event.trade_time,
                })))
            }
            Some("kline") => {
                let event: KlineEvent = from_object(object, "kline")?;
                Ok(Some(FeedEvent::Tick(Tick {
                    ticker: parse_symbol(&event.symbol)?,
                    price: event.kline.close,
                    volume: event.kline.volume,
                    event_time: event.event_time,
                })))
            }
            Some(_) => Ok(None),
            None if object.contains_key("error") => {
                let reply: ErrorReply = from_object(object, "error")?;
                Ok(Some(FeedEvent::UpstreamError {
                    code: reply.error.code,
                    message: reply.error.msg,
                    id: reply.id,
                }))
            }
            None if object.contains_key("result") => {
                let reply: ControlReply = from_object(object, "result")?;
                Ok(Some(FeedEvent::Ack { id: reply.id }))
            }
            None => Err(DecodeError::MissingField {
                event: "unknown".to_string(),
                field: "e",
            }),
        }
    }
}

impl FeedCodec for BinanceCodec {
    fn decode(&self, frame: &str) -> Result<Option<FeedEvent>, DecodeError> {
        let value: Value =
            serde_json::from_str(frame.trim()).map_err(|e| DecodeError::Json(e.to_string()))?;

        match value {
            Value::Object(object) => Self::decode_object(object),
            other => Err(DecodeError::NotAnObject(preview(&other.to_string()))),
        }
    }

    fn encode_control(&self, request: &ControlRequest) -> Result<String, EncodeError> {
        let message = ControlMessage {
            method: request.method.as_str(),
            params: &request.channels,
            id: request.id,
        };
        serde_json::to_string(&message).map_err(|e| EncodeError(e.to_string()))
    }
}

fn from_object<T: DeserializeOwned>(
    object: Map<String, Value>,
    event: &str,
) -> Result<T, DecodeError> {
    serde_json::from_value(Value::Object(object)).map_err(|e| DecodeError::Schema {
        event: event.to_string(),
        message: e.to_string(),
    })
}

fn parse_symbol(symbol: &str) -> Result<Ticker, DecodeError> {
    Ticker::parse(symbol).map_err(|_| DecodeError::InvalidField {
        field: "s",
        value: symbol.to_string(),
    })
}

fn preview(text: &str) -> String {
    text.chars().take(50).collect()
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use test_case::test_case;

    use super::*;
    use crate::application::ports::ControlMethod;

    fn dec(raw: &str) -> Decimal {
        raw.parse().unwrap()
    }

    fn tick(frame: &str) -> Tick {
        match BinanceCodec::new().decode(frame).unwrap() {
            Some(FeedEvent::Tick(tick)) => tick,
            other => panic!("expected tick, got {other:?}"),
        }
    }

    #[test]
    fn decode_agg_trade() {
        let t = tick(
            r#"{"e":"aggTrade","E":1700000000100,"s":"BTCUSDT","a":1,"p":"43250.10","q":"0.015","f":1,"l":2,"T":1700000000000,"m":false}"#,
        );

        assert_eq!(t.ticker.as_str(), "BTCUSDT");
        assert_eq!(t.price, dec("43250.10"));
        assert_eq!(t.volume, dec("0.015"));
        assert_eq!(t.event_time.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn decode_trade() {
        let t = tick(
            r#"{"e":"trade","E":1700000000100,"s":"ETHUSDT","t":9,"p":"2250.5","q":"1.2","T":1700000000050,"m":true}"#,
        );

        assert_eq!(t.ticker.as_str(), "ETHUSDT");
        assert_eq!(t.price, dec("2250.5"));
        assert_eq!(t.event_time.timestamp_millis(), 1_700_000_000_050);
    }

    #[test]
    fn decode_kline_uses_close_and_event_time() {
        let t = tick(
            r#"{"e":"kline","E":1700000000999,"s":"BTCUSDT","k":{"t":1700000000000,"T":1700000059999,"i":"1m","o":"1","c":"43000.5","h":"2","l":"0.5","v":"12.5","n":3,"x":false}}"#,
        );

        assert_eq!(t.price, dec("43000.5"));
        assert_eq!(t.volume, dec("12.5"));
        assert_eq!(t.event_time.timestamp_millis(), 1_700_000_000_999);
    }

    #[test]
    fn decode_unwraps_combined_stream_envelope() {
        let t = tick(
            r#"{"stream":"btcusdt@aggTrade","data":{"e":"aggTrade","s":"BTCUSDT","p":"1.5","q":"2","T":1700000000000}}"#,
        );

        assert_eq!(t.ticker.as_str(), "BTCUSDT");
        assert_eq!(t.price, dec("1.5"));
    }

    #[test]
    fn decode_ack() {
        let event = BinanceCodec::new()
            .decode(r#"{"result":null,"id":4}"#)
            .unwrap();
        assert_eq!(event, Some(FeedEvent::Ack { id: Some(4) }));
    }

    #[test]
    fn decode_upstream_error() {
        let event = BinanceCodec::new()
            .decode(r#"{"error":{"code":2,"msg":"Invalid request"},"id":5}"#)
            .unwrap();
        assert_eq!(
            event,
            Some(FeedEvent::UpstreamError {
                code: Some(2),
                message: "Invalid request".to_string(),
                id: Some(5),
            })
        );
    }

    #[test_case(r#"{"e":"depthUpdate","s":"BTCUSDT"}"# ; "depth update")]
    #[test_case(r#"{"e":"24hrTicker","s":"BTCUSDT"}"# ; "ticker")]
    #[test_case(r#"{"e":"bookTicker"}"# ; "book ticker")]
    fn unhandled_event_types_are_ignored(frame: &str) {
        assert_eq!(BinanceCodec::new().decode(frame).unwrap(), None);
    }

    #[test_case("not json" ; "garbage")]
    #[test_case("[1,2,3]" ; "array")]
    #[test_case("42" ; "number")]
    #[test_case(r#"{"s":"BTCUSDT","p":"1"}"# ; "missing event type")]
    #[test_case(r#"{"e":7}"# ; "numeric event type")]
    #[test_case(r#"{"e":"aggTrade","s":"BTCUSDT","q":"1","T":1}"# ; "missing price")]
    #[test_case(r#"{"e":"aggTrade","s":"BTCUSDT","p":"abc","q":"1","T":1}"# ; "bad price")]
    #[test_case(r#"{"e":"trade","s":"---","p":"1","q":"1","T":1}"# ; "empty symbol")]
    #[test_case(r#"{"e":"kline","E":1,"s":"BTCUSDT"}"# ; "kline without candle")]
    fn malformed_frames_are_errors(frame: &str) {
        assert!(BinanceCodec::new().decode(frame).is_err());
    }

    #[test]
    fn encode_subscribe() {
        let frame = BinanceCodec::new()
            .encode_control(&ControlRequest {
                method: ControlMethod::Subscribe,
                channels: vec!["btcusdt@aggTrade".to_string()],
                id: 1,
            })
            .unwrap();

        assert_eq!(
            frame,
            r#"{"method":"SUBSCRIBE","params":["btcusdt@aggTrade"],"id":1}"#
        );
    }

    #[test]
    fn encode_unsubscribe() {
        let frame = BinanceCodec::new()
            .encode_control(&ControlRequest {
                method: ControlMethod::Unsubscribe,
                channels: vec!["ethusdt@kline_1m".to_string(), "ethusdt@trade".to_string()],
                id: 12,
            })
            .unwrap();

        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["method"], "UNSUBSCRIBE");
        assert_eq!(value["params"][1], "ethusdt@trade");
        assert_eq!(value["id"], 12);
    }
}
