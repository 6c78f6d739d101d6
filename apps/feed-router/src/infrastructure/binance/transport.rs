//! Binance WebSocket Transport
//!
//! Opens a WebSocket per security class and bridges it onto the
//! [`FeedTransport`] port. Each connection gets a pump task that owns the
//! socket: it forwards control frames written to the outbound half,
//! answers server pings, and pushes text frames to the inbound half.
//! Pings and pongs are passed on as heartbeats so a quiet stream is not
//! mistaken for a dead one.
//!
//! The pump exits when the router drops either half, the server closes,
//! a socket error occurs, or the shutdown token fires. Exiting drops the
//! inbound sender, which the router observes as the stream ending.

use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{FeedConnection, FeedTransport, InboundFrame, TransportError};
use crate::domain::streaming::SecurityClass;

/// Outbound control frames buffered per connection.
const OUTBOUND_BUFFER: usize = 64;

/// Default handshake timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket transport for Binance market streams.
#[derive(Debug, Clone)]
pub struct BinanceTransport {
    connect_timeout: Duration,
    cancel: CancellationToken,
}

impl BinanceTransport {
    /// Create a transport whose connections stop when `cancel` fires.
    #[must_use]
    pub const fn new(cancel: CancellationToken) -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            cancel,
        }
    }

    /// Override the handshake timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl FeedTransport for BinanceTransport {
    async fn connect(
        &self,
        class: SecurityClass,
        url: &str,
    ) -> Result<FeedConnection, TransportError> {
        tracing::info!(class = %class, url = %url, "Connecting to market stream");

        let (ws_stream, _response) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(url))
                .await
                .map_err(|_| TransportError::Connect {
                    message: format!("handshake timed out after {:?}", self.connect_timeout),
                })?
                .map_err(|e| TransportError::Connect {
                    message: e.to_string(),
                })?;

        let (outbound_tx, outbound_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
        let (inbound_tx, inbound_rx) = mpsc::unbounded::<Result<InboundFrame, TransportError>>();

        tokio::spawn(pump(
            class,
            ws_stream,
            outbound_rx,
            inbound_tx,
            self.cancel.child_token(),
        ));

        let outbound = outbound_tx.sink_map_err(|e| TransportError::Send {
            message: e.to_string(),
        });

        Ok(FeedConnection::new(Box::pin(outbound), inbound_rx.boxed()))
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn pump(
    class: SecurityClass,
    ws_stream: WsStream,
    mut outbound_rx: mpsc::Receiver<String>,
    inbound_tx: mpsc::UnboundedSender<Result<InboundFrame, TransportError>>,
    cancel: CancellationToken,
) {
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                break;
            }
            frame = outbound_rx.next() => {
                let Some(frame) = frame else {
                    tracing::debug!(class = %class, "Outbound half dropped, closing socket");
                    let _ = write.send(Message::Close(None)).await;
                    break;
                };
                if let Err(e) = write.send(Message::Text(frame.into())).await {
                    let _ = inbound_tx.unbounded_send(Err(TransportError::Send {
                        message: e.to_string(),
                    }));
                    break;
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let frame = InboundFrame::Text(text.as_str().to_owned());
                        if inbound_tx.unbounded_send(Ok(frame)).is_err() {
                            tracing::debug!(class = %class, "Inbound half dropped, closing socket");
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            let _ = inbound_tx.unbounded_send(Err(TransportError::Send {
                                message: e.to_string(),
                            }));
                            break;
                        }
                        if inbound_tx.unbounded_send(Ok(InboundFrame::Heartbeat)).is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        if inbound_tx.unbounded_send(Ok(InboundFrame::Heartbeat)).is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(class = %class, frame = ?frame, "Server sent close frame");
                        let _ = inbound_tx.unbounded_send(Err(TransportError::Closed));
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary and raw frames carry no market data
                    }
                    Some(Err(e)) => {
                        let _ = inbound_tx.unbounded_send(Err(TransportError::Receive {
                            message: e.to_string(),
                        }));
                        break;
                    }
                    None => {
                        tracing::info!(class = %class, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }
}
