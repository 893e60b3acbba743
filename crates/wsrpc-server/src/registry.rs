//! Namespace registry
//!
//! All server state lives here: per-namespace method tables, event tables
//! with their subscriber lists, and the connected clients. Namespaces come
//! into existence the first time something touches them, whether that is a
//! registration or a connecting socket.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{RwLock, mpsc};
use tracing::debug;

use crate::error::{ServerError, ServerResult};
use crate::handler::{MethodHandler, SocketId};

/// Who may call a method or subscribe to an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    /// Open to every connected socket
    #[default]
    Public,
    /// Requires the socket to have authenticated through `rpc.login`
    Protected,
}

/// One connected client as the rest of the server sees it
#[derive(Debug, Clone)]
pub struct SocketInfo {
    pub id: SocketId,
    pub authenticated: bool,
}

/// Commands consumed by a connection's writer task
#[derive(Debug, Clone)]
pub(crate) enum SocketCommand {
    Send(String),
    Close,
}

pub(crate) type CommandSender = mpsc::UnboundedSender<SocketCommand>;

struct MethodEntry {
    handler: Arc<dyn MethodHandler>,
    visibility: Visibility,
}

struct EventEntry {
    subscribers: Vec<SocketId>,
    visibility: Visibility,
}

struct ClientHandle {
    sender: CommandSender,
    authenticated: bool,
}

#[derive(Default)]
struct Namespace {
    methods: HashMap<String, MethodEntry>,
    events: HashMap<String, EventEntry>,
    clients: HashMap<SocketId, ClientHandle>,
}

/// How a batch of subscription requests ended
pub(crate) enum SubscribeOutcome {
    /// A protected event was hit without authentication. The whole call
    /// fails, but names processed before the protected one stay subscribed.
    Forbidden,
    /// Per-event status strings, `"ok"` on success
    Statuses(HashMap<String, String>),
}

#[derive(Default)]
pub struct Registry {
    namespaces: RwLock<HashMap<String, Namespace>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a method, overwriting any previous handler under the same
    /// name. Overwriting resets the visibility to public.
    pub(crate) async fn register_method(
        &self,
        path: &str,
        name: &str,
        handler: Arc<dyn MethodHandler>,
    ) {
        let mut namespaces = self.namespaces.write().await;
        let namespace = namespaces.entry(path.to_string()).or_default();
        namespace.methods.insert(
            name.to_string(),
            MethodEntry {
                handler,
                visibility: Visibility::Public,
            },
        );
        debug!("registered method {}{}", path, name);
    }

    pub(crate) async fn set_method_visibility(
        &self,
        path: &str,
        name: &str,
        visibility: Visibility,
    ) -> ServerResult<()> {
        let mut namespaces = self.namespaces.write().await;
        let entry = namespaces
            .get_mut(path)
            .and_then(|ns| ns.methods.get_mut(name))
            .ok_or_else(|| ServerError::UnknownMethod {
                namespace: path.to_string(),
                name: name.to_string(),
            })?;
        entry.visibility = visibility;
        Ok(())
    }

    /// Declares an event. Fails if the namespace already carries one with
    /// the same name.
    pub(crate) async fn register_event(&self, path: &str, name: &str) -> ServerResult<()> {
        let mut namespaces = self.namespaces.write().await;
        let namespace = namespaces.entry(path.to_string()).or_default();
        if namespace.events.contains_key(name) {
            return Err(ServerError::DuplicateEvent {
                namespace: path.to_string(),
                name: name.to_string(),
            });
        }
        namespace.events.insert(
            name.to_string(),
            EventEntry {
                subscribers: Vec::new(),
                visibility: Visibility::Public,
            },
        );
        debug!("registered event {}{}", path, name);
        Ok(())
    }

    pub(crate) async fn set_event_visibility(
        &self,
        path: &str,
        name: &str,
        visibility: Visibility,
    ) -> ServerResult<()> {
        let mut namespaces = self.namespaces.write().await;
        let entry = namespaces
            .get_mut(path)
            .and_then(|ns| ns.events.get_mut(name))
            .ok_or_else(|| ServerError::UnknownEvent {
                namespace: path.to_string(),
                name: name.to_string(),
            })?;
        entry.visibility = visibility;
        Ok(())
    }

    /// Admits a connection into a namespace. A reconnecting socket reusing
    /// its id replaces the stale handle and starts unauthenticated.
    pub(crate) async fn add_client(&self, path: &str, socket_id: &str, sender: CommandSender) {
        let mut namespaces = self.namespaces.write().await;
        let namespace = namespaces.entry(path.to_string()).or_default();
        namespace.clients.insert(
            socket_id.to_string(),
            ClientHandle {
                sender,
                authenticated: false,
            },
        );
        debug!("client {} joined {}", socket_id, path);
    }

    /// Drops a client and prunes it from every subscriber list. A no-op when
    /// the namespace is already gone.
    pub(crate) async fn remove_client(&self, path: &str, socket_id: &str) {
        let mut namespaces = self.namespaces.write().await;
        if let Some(namespace) = namespaces.get_mut(path) {
            namespace.clients.remove(socket_id);
            for entry in namespace.events.values_mut() {
                entry.subscribers.retain(|id| id != socket_id);
            }
            debug!("client {} left {}", socket_id, path);
        }
    }

    pub(crate) async fn authenticate(&self, path: &str, socket_id: &str) {
        let mut namespaces = self.namespaces.write().await;
        if let Some(client) = namespaces
            .get_mut(path)
            .and_then(|ns| ns.clients.get_mut(socket_id))
        {
            client.authenticated = true;
            debug!("client {} authenticated on {}", socket_id, path);
        }
    }

    pub(crate) async fn client_authenticated(&self, path: &str, socket_id: &str) -> bool {
        let namespaces = self.namespaces.read().await;
        namespaces
            .get(path)
            .and_then(|ns| ns.clients.get(socket_id))
            .map(|client| client.authenticated)
            .unwrap_or(false)
    }

    pub(crate) async fn lookup_method(
        &self,
        path: &str,
        name: &str,
    ) -> Option<(Arc<dyn MethodHandler>, Visibility)> {
        let namespaces = self.namespaces.read().await;
        namespaces
            .get(path)
            .and_then(|ns| ns.methods.get(name))
            .map(|entry| (entry.handler.clone(), entry.visibility))
    }

    /// Subscribes one socket to each named event, in order, under a single
    /// lock. Hitting a protected event without authentication aborts the
    /// remainder of the batch.
    pub(crate) async fn subscribe(
        &self,
        path: &str,
        socket_id: &str,
        names: &[String],
    ) -> SubscribeOutcome {
        let mut namespaces = self.namespaces.write().await;
        let namespace = namespaces.entry(path.to_string()).or_default();
        let authenticated = namespace
            .clients
            .get(socket_id)
            .map(|client| client.authenticated)
            .unwrap_or(false);

        let mut statuses = HashMap::new();
        for name in names {
            let Some(entry) = namespace.events.get_mut(name) else {
                statuses.insert(name.clone(), "provided event invalid".to_string());
                continue;
            };
            if entry.visibility == Visibility::Protected && !authenticated {
                return SubscribeOutcome::Forbidden;
            }
            if entry.subscribers.iter().any(|id| id == socket_id) {
                statuses.insert(
                    name.clone(),
                    "socket has already been subscribed to event".to_string(),
                );
                continue;
            }
            entry.subscribers.push(socket_id.to_string());
            statuses.insert(name.clone(), "ok".to_string());
        }
        debug!("client {} subscriptions on {}: {:?}", socket_id, path, statuses);
        SubscribeOutcome::Statuses(statuses)
    }

    /// Unsubscribes one socket from each named event. Unlike subscription
    /// there is no visibility gate on the way out.
    pub(crate) async fn unsubscribe(
        &self,
        path: &str,
        socket_id: &str,
        names: &[String],
    ) -> HashMap<String, String> {
        let mut namespaces = self.namespaces.write().await;
        let namespace = namespaces.entry(path.to_string()).or_default();

        let mut statuses = HashMap::new();
        for name in names {
            let Some(entry) = namespace.events.get_mut(name) else {
                statuses.insert(name.clone(), "provided event invalid".to_string());
                continue;
            };
            let Some(position) = entry.subscribers.iter().position(|id| id == socket_id) else {
                statuses.insert(name.clone(), "not subscribed".to_string());
                continue;
            };
            entry.subscribers.remove(position);
            statuses.insert(name.clone(), "ok".to_string());
        }
        statuses
    }

    /// Every callable method name in the namespace, introspection included.
    pub(crate) async fn method_names(&self, path: &str) -> Vec<String> {
        let namespaces = self.namespaces.read().await;
        let mut names = vec!["__listMethods".to_string()];
        if let Some(namespace) = namespaces.get(path) {
            let mut registered: Vec<String> = namespace
                .methods
                .keys()
                .filter(|name| name.as_str() != "__listMethods")
                .cloned()
                .collect();
            registered.sort();
            names.extend(registered);
        }
        names
    }

    pub(crate) async fn event_names(&self, path: &str) -> Vec<String> {
        let namespaces = self.namespaces.read().await;
        match namespaces.get(path) {
            Some(namespace) => {
                let mut names: Vec<String> = namespace.events.keys().cloned().collect();
                names.sort();
                names
            }
            None => Vec::new(),
        }
    }

    pub(crate) async fn client_ids(&self, path: &str) -> Vec<SocketId> {
        let namespaces = self.namespaces.read().await;
        match namespaces.get(path) {
            Some(namespace) => namespace.clients.keys().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub(crate) async fn clients_info(&self, path: &str) -> Vec<SocketInfo> {
        let namespaces = self.namespaces.read().await;
        match namespaces.get(path) {
            Some(namespace) => namespace
                .clients
                .iter()
                .map(|(id, client)| SocketInfo {
                    id: id.clone(),
                    authenticated: client.authenticated,
                })
                .collect(),
            None => Vec::new(),
        }
    }

    /// Senders for every socket subscribed to `name`. The event must exist.
    pub(crate) async fn subscriber_senders(
        &self,
        path: &str,
        name: &str,
    ) -> ServerResult<Vec<CommandSender>> {
        let namespaces = self.namespaces.read().await;
        let namespace = namespaces.get(path).ok_or_else(|| ServerError::UnknownEvent {
            namespace: path.to_string(),
            name: name.to_string(),
        })?;
        let entry = namespace
            .events
            .get(name)
            .ok_or_else(|| ServerError::UnknownEvent {
                namespace: path.to_string(),
                name: name.to_string(),
            })?;
        Ok(entry
            .subscribers
            .iter()
            .filter_map(|id| namespace.clients.get(id))
            .map(|client| client.sender.clone())
            .collect())
    }

    /// Removes a namespace wholesale, handing back the senders of its
    /// clients so the caller can close them.
    pub(crate) async fn close_namespace(&self, path: &str) -> Vec<CommandSender> {
        let mut namespaces = self.namespaces.write().await;
        match namespaces.remove(path) {
            Some(namespace) => {
                debug!("namespace {} closed", path);
                namespace
                    .clients
                    .into_values()
                    .map(|client| client.sender)
                    .collect()
            }
            None => Vec::new(),
        }
    }

    pub(crate) async fn all_client_senders(&self) -> Vec<CommandSender> {
        let namespaces = self.namespaces.read().await;
        namespaces
            .values()
            .flat_map(|ns| ns.clients.values().map(|client| client.sender.clone()))
            .collect()
    }

    /// Serializable view for tests and diagnostics.
    #[allow(dead_code)]
    pub(crate) async fn snapshot(&self, path: &str) -> Value {
        let namespaces = self.namespaces.read().await;
        match namespaces.get(path) {
            Some(ns) => serde_json::json!({
                "methods": ns.methods.keys().collect::<Vec<_>>(),
                "events": ns.events.keys().collect::<Vec<_>>(),
                "clients": ns.clients.keys().collect::<Vec<_>>(),
            }),
            None => Value::Null,
        }
    }
}
