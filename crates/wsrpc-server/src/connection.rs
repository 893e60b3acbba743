//! Connection lifecycle
//!
//! One task per accepted socket. The upgrade request names the namespace
//! (URL path) and optionally pins the socket id (`socket_id` query
//! parameter). Outbound traffic goes through a writer task fed by an
//! unbounded channel, so event fan-out never blocks on a slow peer inside
//! the registry lock.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::dispatch::Dispatcher;
use crate::error::{ServerError, ServerResult};
use crate::registry::{Registry, SocketCommand};
use crate::server::ServerEvent;

#[derive(Clone)]
pub(crate) struct ConnectionContext {
    pub registry: Arc<Registry>,
    pub dispatcher: Arc<Dispatcher>,
    pub events: mpsc::UnboundedSender<ServerEvent>,
}

/// Runs one connection to completion: handshake, admission, sequential
/// dispatch of inbound frames, removal on disconnect.
pub(crate) async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: ConnectionContext,
) -> ServerResult<()> {
    let mut uri = String::from("/");
    let ws = tokio_tungstenite::accept_hdr_async(stream, |request: &Request, response: Response| {
        uri = request.uri().to_string();
        Ok(response)
    })
    .await
    .map_err(|e| ServerError::Handshake(e.to_string()))?;

    let (namespace, socket_id) = identify(&uri);
    let (mut sink, mut stream) = ws.split();
    let (sender, mut commands) = mpsc::unbounded_channel();

    let writer = tokio::spawn(async move {
        while let Some(command) = commands.recv().await {
            match command {
                SocketCommand::Send(text) => {
                    if sink.send(Message::text(text)).await.is_err() {
                        break;
                    }
                }
                SocketCommand::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    ctx.registry.add_client(&namespace, &socket_id, sender.clone()).await;
    let _ = ctx.events.send(ServerEvent::Connection {
        socket_id: socket_id.clone(),
        namespace: namespace.clone(),
    });
    info!("client {} connected to {} ({})", socket_id, namespace, peer);

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if let Some(reply) = ctx
                    .dispatcher
                    .handle_payload(text.as_str(), &socket_id, &namespace)
                    .await
                    && sender.send(SocketCommand::Send(reply)).is_err()
                {
                    break;
                }
            }
            Ok(Message::Binary(bytes)) => {
                let text = String::from_utf8_lossy(&bytes);
                if let Some(reply) = ctx
                    .dispatcher
                    .handle_payload(&text, &socket_id, &namespace)
                    .await
                    && sender.send(SocketCommand::Send(reply)).is_err()
                {
                    break;
                }
            }
            Ok(Message::Close(frame)) => {
                debug!("client {} sent close: {:?}", socket_id, frame);
                break;
            }
            // Ping/pong are answered by the protocol layer.
            Ok(_) => {}
            Err(e) => {
                let _ = ctx.events.send(ServerEvent::SocketError {
                    socket_id: socket_id.clone(),
                    error: e.to_string(),
                });
                warn!("socket {} errored: {}", socket_id, e);
                break;
            }
        }
    }

    ctx.registry.remove_client(&namespace, &socket_id).await;
    let _ = ctx.events.send(ServerEvent::Disconnection {
        socket_id: socket_id.clone(),
        namespace: namespace.clone(),
    });
    info!("client {} disconnected from {}", socket_id, namespace);

    drop(sender);
    let _ = writer.await;
    Ok(())
}

/// Namespace path and socket id from the upgrade request URI. A missing or
/// empty `socket_id` parameter gets a generated UUID.
fn identify(uri: &str) -> (String, String) {
    let parsed = Url::parse(&format!("ws://localhost{uri}")).ok();
    let namespace = parsed
        .as_ref()
        .map(|url| url.path().to_string())
        .unwrap_or_else(|| "/".to_string());
    let socket_id = parsed
        .as_ref()
        .and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key == "socket_id")
                .map(|(_, value)| value.into_owned())
        })
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    (namespace, socket_id)
}
