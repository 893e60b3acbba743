//! Namespace handles
//!
//! A [`NamespaceHandle`] is a cheap, cloneable view onto one path of the
//! registry. Everything the server root exposes for `/` is available here for
//! any other path, so handlers can hold a handle and emit events without
//! touching the server itself.

use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use wsrpc_proto::{Codec, Params, ServerPush};

use crate::error::ServerResult;
use crate::handler::{FunctionHandler, HandlerResult, MethodHandler, SocketId};
use crate::registry::{Registry, SocketCommand, SocketInfo, Visibility};

#[derive(Clone)]
pub struct NamespaceHandle {
    path: String,
    registry: Arc<Registry>,
    codec: Arc<dyn Codec>,
}

impl NamespaceHandle {
    pub(crate) fn new(path: impl Into<String>, registry: Arc<Registry>, codec: Arc<dyn Codec>) -> Self {
        Self {
            path: path.into(),
            registry,
            codec,
        }
    }

    /// The namespace path, `/` for the root.
    pub fn name(&self) -> &str {
        &self.path
    }

    /// Registers a method. A second registration under the same name replaces
    /// the first and resets its visibility to public.
    pub async fn register(&self, name: &str, handler: impl MethodHandler + 'static) {
        self.registry
            .register_method(&self.path, name, Arc::new(handler))
            .await;
    }

    /// [`register`](Self::register) for plain async closures.
    pub async fn register_fn<F, Fut>(&self, name: &str, f: F)
    where
        F: Fn(Option<Params>, SocketId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(name, FunctionHandler::new(f)).await;
    }

    /// Declares an event clients may subscribe to. Event names are unique
    /// within a namespace.
    pub async fn event(&self, name: &str) -> ServerResult<()> {
        self.registry.register_event(&self.path, name).await
    }

    /// Emits an event to its subscribers, returning how many sockets the
    /// frame was handed to. Sockets that never subscribed see nothing.
    pub async fn emit(&self, event: &str, params: Params) -> ServerResult<usize> {
        let push = serde_json::to_value(ServerPush::new(event, params))?;
        let wire = self.codec.encode(&push)?;
        let senders = self.registry.subscriber_senders(&self.path, event).await?;

        let mut delivered = 0;
        for sender in senders {
            if sender.send(SocketCommand::Send(wire.clone())).is_ok() {
                delivered += 1;
            }
        }
        debug!("event {}{} delivered to {} subscribers", self.path, event, delivered);
        Ok(delivered)
    }

    pub async fn event_list(&self) -> Vec<String> {
        self.registry.event_names(&self.path).await
    }

    /// Ids of the sockets currently connected to this namespace.
    pub async fn clients(&self) -> Vec<SocketId> {
        self.registry.client_ids(&self.path).await
    }

    /// Connected sockets with their authentication state.
    pub async fn connected(&self) -> Vec<SocketInfo> {
        self.registry.clients_info(&self.path).await
    }

    pub async fn set_method_visibility(
        &self,
        name: &str,
        visibility: Visibility,
    ) -> ServerResult<()> {
        self.registry
            .set_method_visibility(&self.path, name, visibility)
            .await
    }

    pub async fn set_event_visibility(
        &self,
        name: &str,
        visibility: Visibility,
    ) -> ServerResult<()> {
        self.registry
            .set_event_visibility(&self.path, name, visibility)
            .await
    }
}
