//! Shared fixtures for the end-to-end suite: loopback servers, connected
//! clients, and a raw WebSocket for frames the typed client refuses to send.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use wsrpc_client::{Client, ClientEvent, ClientResult};
use wsrpc_proto::Params;
use wsrpc_server::Server;

pub type RawSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}

/// Server on an OS-assigned loopback port.
pub async fn bind_server() -> Server {
    Server::builder()
        .with_bind_address(([127, 0, 0, 1], 0).into())
        .bind()
        .await
        .expect("failed to bind loopback server")
}

pub fn ws_url(addr: SocketAddr, path: &str) -> String {
    format!("ws://{addr}{path}")
}

/// Connected client with reconnection off. Most tests want a connection
/// that stays where it was put.
pub async fn connect_client(addr: SocketAddr, path: &str) -> ClientResult<Client> {
    Client::builder()
        .with_reconnect(false)
        .connect(&ws_url(addr, path))
        .await
}

/// Raw socket for hand-built payloads.
pub async fn raw_socket(addr: SocketAddr, path: &str) -> RawSocket {
    let (socket, _) = tokio_tungstenite::connect_async(ws_url(addr, path))
        .await
        .expect("raw websocket connect failed");
    socket
}

/// Sends one text frame without waiting for anything back.
pub async fn raw_send(socket: &mut RawSocket, payload: &str) {
    socket
        .send(Message::text(payload.to_string()))
        .await
        .expect("raw send failed");
}

/// Sends one text frame and waits for the next text frame back.
pub async fn raw_request(socket: &mut RawSocket, payload: &str) -> Value {
    raw_send(socket, payload).await;
    raw_next(socket).await.expect("no reply to raw request")
}

/// Next decodable text frame, if one arrives within two seconds.
pub async fn raw_next(socket: &mut RawSocket) -> Option<Value> {
    let replies = async {
        while let Some(frame) = socket.next().await {
            match frame {
                Ok(Message::Text(text)) => return serde_json::from_str(text.as_str()).ok(),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
        None
    };
    tokio::time::timeout(Duration::from_secs(2), replies)
        .await
        .ok()
        .flatten()
}

/// Receives from an event channel with a deadline, `None` on timeout.
pub async fn recv_within<T>(rx: &mut mpsc::UnboundedReceiver<T>, deadline: Duration) -> Option<T> {
    tokio::time::timeout(deadline, rx.recv()).await.ok().flatten()
}

/// Polls `check` until it holds or two seconds pass.
pub async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Next pushed notification on a client event channel, skipping lifecycle
/// events along the way.
pub async fn next_notification(
    rx: &mut mpsc::UnboundedReceiver<ClientEvent>,
) -> Option<(String, Params)> {
    loop {
        match recv_within(rx, Duration::from_secs(2)).await? {
            ClientEvent::Notification { name, params } => return Some((name, params)),
            _ => continue,
        }
    }
}
