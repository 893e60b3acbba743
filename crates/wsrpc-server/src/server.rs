//! Server root
//!
//! Binds a TCP listener, upgrades each connection to WebSocket, and routes
//! it into its namespace. The [`Server`] value is the application's handle:
//! registration and emission on the root namespace directly, on any other
//! namespace through [`Server::of`].

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, info, warn};

use wsrpc_proto::{Codec, JsonCodec, Params};

use crate::connection::{ConnectionContext, serve_connection};
use crate::dispatch::Dispatcher;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerResult, MethodHandler, SocketId};
use crate::namespace::NamespaceHandle;
use crate::registry::{Registry, SocketCommand, SocketInfo, Visibility};

/// Lifecycle notifications delivered on the server event channel.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// The listener is bound and accepting.
    Listening(SocketAddr),
    /// A socket finished its handshake and joined a namespace.
    Connection { socket_id: SocketId, namespace: String },
    /// A socket left, cleanly or not.
    Disconnection { socket_id: SocketId, namespace: String },
    /// A read error on one socket. The socket is dropped afterwards.
    SocketError { socket_id: SocketId, error: String },
    /// The accept loop hit an error but keeps running.
    Error(String),
    /// `close()` ran.
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

pub struct ServerBuilder {
    config: ServerConfig,
    codec: Arc<dyn Codec>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self {
            config: ServerConfig::default(),
            codec: Arc::new(JsonCodec),
        }
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_bind_address(mut self, address: SocketAddr) -> Self {
        self.config.bind_address = address;
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Binds the listener and starts the accept loop. Bind to port 0 to let
    /// the OS pick; the chosen port is available via
    /// [`Server::local_addr`].
    pub async fn bind(self) -> ServerResult<Server> {
        let listener = TcpListener::bind(self.config.bind_address).await?;
        let local_addr = listener.local_addr()?;

        let registry = Arc::new(Registry::new());
        let dispatcher = Arc::new(Dispatcher::new(registry.clone(), self.codec.clone()));
        let shutdown = Arc::new(Notify::new());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let ctx = ConnectionContext {
            registry: registry.clone(),
            dispatcher,
            events: events_tx.clone(),
        };
        let stop = shutdown.clone();
        let accept_events = events_tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.notified() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            debug!("accepted tcp connection from {}", peer);
                            let ctx = ctx.clone();
                            tokio::spawn(async move {
                                if let Err(e) = serve_connection(stream, peer, ctx).await {
                                    warn!("connection from {} failed: {}", peer, e);
                                }
                            });
                        }
                        Err(e) => {
                            warn!("accept failed: {}", e);
                            let _ = accept_events.send(ServerEvent::Error(e.to_string()));
                        }
                    },
                }
            }
            debug!("accept loop stopped");
        });

        let _ = events_tx.send(ServerEvent::Listening(local_addr));
        info!("listening on {}", local_addr);

        Ok(Server {
            registry,
            codec: self.codec,
            local_addr,
            shutdown,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        })
    }
}

pub struct Server {
    registry: Arc<Registry>,
    codec: Arc<dyn Codec>,
    local_addr: SocketAddr,
    shutdown: Arc<Notify>,
    events_tx: mpsc::UnboundedSender<ServerEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<ServerEvent>>>,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// The address the listener actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle to a namespace, created lazily on first use. `of("/")` is the
    /// root namespace the plain registration methods operate on.
    pub fn of(&self, path: &str) -> NamespaceHandle {
        NamespaceHandle::new(path, self.registry.clone(), self.codec.clone())
    }

    /// Registers a method on the root namespace.
    pub async fn register(&self, name: &str, handler: impl MethodHandler + 'static) {
        self.of("/").register(name, handler).await;
    }

    /// Registers an async closure as a method on the root namespace.
    pub async fn register_fn<F, Fut>(&self, name: &str, f: F)
    where
        F: Fn(Option<Params>, SocketId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.of("/").register_fn(name, f).await;
    }

    /// Installs the authentication handler, i.e. the method behind
    /// `rpc.login`, on the root namespace. A result of exactly `true` marks
    /// the calling socket authenticated.
    pub async fn set_auth(&self, handler: impl MethodHandler + 'static) {
        self.register("rpc.login", handler).await;
    }

    /// [`set_auth`](Self::set_auth) for plain async closures.
    pub async fn set_auth_fn<F, Fut>(&self, f: F)
    where
        F: Fn(Option<Params>, SocketId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register_fn("rpc.login", f).await;
    }

    /// Declares an event on the root namespace.
    pub async fn event(&self, name: &str) -> ServerResult<()> {
        self.of("/").event(name).await
    }

    /// Emits an event on the root namespace.
    pub async fn emit(&self, event: &str, params: Params) -> ServerResult<usize> {
        self.of("/").emit(event, params).await
    }

    pub async fn set_method_visibility(
        &self,
        name: &str,
        visibility: Visibility,
    ) -> ServerResult<()> {
        self.of("/").set_method_visibility(name, visibility).await
    }

    pub async fn set_event_visibility(
        &self,
        name: &str,
        visibility: Visibility,
    ) -> ServerResult<()> {
        self.of("/").set_event_visibility(name, visibility).await
    }

    /// Registered event names in a namespace, empty when the namespace does
    /// not exist.
    pub async fn event_list(&self, path: &str) -> Vec<String> {
        self.registry.event_names(path).await
    }

    /// Callable method names in a namespace, `__listMethods` included.
    pub async fn method_list(&self, path: &str) -> Vec<String> {
        self.registry.method_names(path).await
    }

    /// Socket ids connected to a namespace.
    pub async fn clients(&self, path: &str) -> Vec<SocketId> {
        self.registry.client_ids(path).await
    }

    /// Connected sockets of a namespace with their authentication state.
    pub async fn connected(&self, path: &str) -> Vec<SocketInfo> {
        self.registry.clients_info(path).await
    }

    /// Force-closes every socket in the namespace and deletes it. Later
    /// traffic on the path starts from a fresh, empty namespace.
    pub async fn close_namespace(&self, path: &str) {
        for sender in self.registry.close_namespace(path).await {
            let _ = sender.send(SocketCommand::Close);
        }
        info!("namespace {} closed", path);
    }

    /// Stops the accept loop and closes every connected socket.
    pub async fn close(&self) {
        self.shutdown.notify_one();
        for sender in self.registry.all_client_senders().await {
            let _ = sender.send(SocketCommand::Close);
        }
        let _ = self.events_tx.send(ServerEvent::Closed);
        info!("server closed");
    }

    /// Takes the lifecycle event receiver. Single consumer; a second take
    /// fails.
    pub fn events(&self) -> ServerResult<mpsc::UnboundedReceiver<ServerEvent>> {
        self.events_rx.lock().take().ok_or(ServerError::EventsTaken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn bind_reports_the_chosen_port() {
        let server = Server::builder()
            .with_bind_address(([127, 0, 0, 1], 0).into())
            .bind()
            .await
            .unwrap();
        assert_ne!(server.local_addr().port(), 0);

        let mut events = server.events().unwrap();
        let Some(ServerEvent::Listening(addr)) = events.recv().await else {
            panic!("expected a listening event first");
        };
        assert_eq!(addr, server.local_addr());
        assert!(matches!(server.events(), Err(ServerError::EventsTaken)));

        server.close().await;
        loop {
            match events.recv().await {
                Some(ServerEvent::Closed) => break,
                Some(_) => continue,
                None => panic!("event channel died before close"),
            }
        }
    }

    #[tokio::test]
    async fn root_registrations_land_in_the_root_namespace() {
        let server = Server::builder()
            .with_bind_address(([127, 0, 0, 1], 0).into())
            .bind()
            .await
            .unwrap();

        server
            .register_fn("ping", |_, _| async move { Ok(json!("pong")) })
            .await;
        server.set_auth_fn(|_, _| async move { Ok(json!(true)) }).await;
        server.event("tick").await.unwrap();

        assert_eq!(
            server.method_list("/").await,
            vec!["__listMethods", "ping", "rpc.login"]
        );
        assert_eq!(server.event_list("/").await, vec!["tick"]);

        // Other namespaces are isolated.
        assert_eq!(server.method_list("/other").await, vec!["__listMethods"]);
        assert!(server.event_list("/other").await.is_empty());
        server.close().await;
    }

    #[tokio::test]
    async fn closing_a_namespace_resets_it() {
        let server = Server::builder()
            .with_bind_address(([127, 0, 0, 1], 0).into())
            .bind()
            .await
            .unwrap();

        server.of("/chat").event("message").await.unwrap();
        server.close_namespace("/chat").await;
        assert!(server.event_list("/chat").await.is_empty());
        // The path is reusable with a clean slate.
        server.of("/chat").event("message").await.unwrap();
        server.close().await;
    }
}
