//! Transport layer for the client
//!
//! The client core never touches a socket directly. It talks to a
//! [`Transport`] that dials an address and yields a sending half plus a
//! stream of [`TransportEvent`]s, so tests can swap the WebSocket out for an
//! in-memory pair.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};
use url::Url;

use crate::error::{ClientError, ClientResult};

/// What the read pump reports back to the client core.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A complete text frame arrived
    Message(String),
    /// The socket reported an error; a `Closed` event follows
    Error(String),
    /// The connection is gone. Code 1000 is a deliberate close, 1005 a close
    /// frame without a status, 1006 an abnormal drop.
    Closed { code: u16, reason: String },
}

/// Sending half of an established connection
#[async_trait]
pub trait TransportSink: Send {
    async fn send(&mut self, text: String) -> ClientResult<()>;
    async fn close(&mut self, code: u16, reason: &str) -> ClientResult<()>;
}

/// An established connection: a sink for outgoing frames and the event
/// stream produced by its read pump. The pump always terminates the stream
/// with exactly one [`TransportEvent::Closed`].
pub struct TransportConnection {
    pub sink: Box<dyn TransportSink>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Dials one connection per call
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, url: &Url) -> ClientResult<TransportConnection>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport, the default
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, url: &Url) -> ClientResult<TransportConnection> {
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        debug!("connected to {}", url);

        let (sink, read) = stream.split();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(read_pump(read, events_tx));

        Ok(TransportConnection {
            sink: Box::new(WsSink(sink)),
            events: events_rx,
        })
    }
}

async fn read_pump(
    mut read: futures::stream::SplitStream<WsStream>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let mut code: u16 = 1006;
    let mut reason = String::new();

    loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => {
                trace!("frame in: {}", text);
                if events.send(TransportEvent::Message(text.to_string())).is_err() {
                    return;
                }
            }
            Some(Ok(Message::Binary(bytes))) => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                if events.send(TransportEvent::Message(text)).is_err() {
                    return;
                }
            }
            Some(Ok(Message::Close(frame))) => {
                if let Some(frame) = frame {
                    code = u16::from(frame.code);
                    reason = frame.reason.to_string();
                } else {
                    code = 1005;
                }
                break;
            }
            // Pings are answered by the protocol layer.
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                let _ = events.send(TransportEvent::Error(e.to_string()));
                break;
            }
            None => break,
        }
    }

    debug!("socket closed with code {}", code);
    let _ = events.send(TransportEvent::Closed { code, reason });
}

struct WsSink(futures::stream::SplitSink<WsStream, Message>);

#[async_trait]
impl TransportSink for WsSink {
    async fn send(&mut self, text: String) -> ClientResult<()> {
        self.0
            .send(Message::text(text))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    async fn close(&mut self, code: u16, reason: &str) -> ClientResult<()> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: Utf8Bytes::from(reason.to_string()),
        };
        self.0
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }
}
