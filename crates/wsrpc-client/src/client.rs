//! WebSocket JSON-RPC client
//!
//! One [`Client`] owns one logical connection. Calls are correlated by
//! generated numeric ids through an in-flight table; server pushes surface on
//! a separate [`ClientEvent`] stream. After an abnormal disconnection the
//! client redials on its own, following its [`ClientConfig`] policy, failing
//! every in-flight call in between.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::{Notify, mpsc, oneshot};
use tracing::{debug, warn};
use url::Url;

use wsrpc_proto::{Codec, ErrorObject, JsonCodec, Notification, Params, Request};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::pending::PendingCalls;
use crate::transport::{Transport, TransportEvent, TransportSink, WsTransport};

/// Lifecycle of the underlying connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and no attempt in progress
    Disconnected,
    /// A dial is in flight
    Connecting,
    /// Connected; calls go through
    Open,
    /// Waiting out the interval before the next redial
    Reconnecting,
    /// Gone for good, with the final close code. A deliberate close reports
    /// 1000; exhausted retries report the code of the last disconnection.
    Closed(u16),
}

/// What the client surfaces to the application
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Connection established (also after a successful reconnect)
    Open,
    /// Connection lost, with the close code and reason
    Close { code: u16, reason: String },
    /// Transport or reconnect failure; the connection may still recover
    Error(String),
    /// Server-initiated event
    Notification { name: String, params: Params },
}

/// Produces correlation ids for outgoing requests
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> u64;
}

/// Monotonic ids starting at 1, the default
#[derive(Debug, Default)]
pub struct SequentialIds(AtomicU64);

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

struct ClientShared {
    url: Url,
    codec: Arc<dyn Codec>,
    transport: Arc<dyn Transport>,
    config: RwLock<ClientConfig>,
    state: RwLock<ConnectionState>,
    pending: PendingCalls,
    ids: Box<dyn IdGenerator>,
    sink: tokio::sync::Mutex<Option<Box<dyn TransportSink>>>,
    events_tx: mpsc::UnboundedSender<ClientEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<ClientEvent>>>,
    attempts: AtomicU32,
    connect_now: Notify,
}

impl ClientShared {
    fn emit(&self, event: ClientEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Dials once. `Ok(Some(events))` on success, `Ok(None)` when another
    /// task already holds or is establishing the connection.
    async fn try_open(&self) -> ClientResult<Option<mpsc::UnboundedReceiver<TransportEvent>>> {
        {
            let mut state = self.state.write();
            if matches!(
                *state,
                ConnectionState::Connecting | ConnectionState::Open
            ) {
                return Ok(None);
            }
            *state = ConnectionState::Connecting;
        }

        let connection = match self.transport.connect(&self.url).await {
            Ok(connection) => connection,
            Err(e) => {
                *self.state.write() = ConnectionState::Disconnected;
                return Err(e);
            }
        };

        *self.sink.lock().await = Some(connection.sink);
        *self.state.write() = ConnectionState::Open;
        self.attempts.store(0, Ordering::Relaxed);
        debug!("connection open");
        self.emit(ClientEvent::Open);
        Ok(Some(connection.events))
    }
}

/// JSON-RPC 2.0 client over WebSocket
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientShared>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Dials the configured address unless a connection is already open or
    /// being established. During a reconnect wait this skips the remaining
    /// delay instead of dialing a second time.
    pub async fn connect(&self) -> ClientResult<()> {
        {
            let state = *self.inner.state.read();
            match state {
                ConnectionState::Open | ConnectionState::Connecting => return Ok(()),
                ConnectionState::Reconnecting => {
                    self.inner.connect_now.notify_one();
                    return Ok(());
                }
                ConnectionState::Disconnected | ConnectionState::Closed(_) => {}
            }
        }

        if let Some(events) = self.inner.try_open().await? {
            tokio::spawn(drive(self.inner.clone(), events));
        }
        Ok(())
    }

    /// Calls `method` and waits for the reply, however long it takes.
    pub async fn call(&self, method: &str, params: Option<Params>) -> ClientResult<Value> {
        let (_, rx) = self.send_request(method, params).await?;
        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(ClientError::ConnectionClosed),
        }
    }

    /// Calls `method` with a reply deadline. On timeout the in-flight entry
    /// is dropped, so a reply arriving later is discarded.
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Option<Params>,
        deadline: Duration,
    ) -> ClientResult<Value> {
        let (id, rx) = self.send_request(method, params).await?;
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => {
                self.inner.pending.remove(id);
                Err(ClientError::ReplyTimeout)
            }
        }
    }

    /// Sends a notification. No id, no reply, no delivery guarantee beyond
    /// the socket accepting the frame.
    pub async fn notify(&self, method: &str, params: Option<Params>) -> ClientResult<()> {
        if self.state() != ConnectionState::Open {
            return Err(ClientError::NotReady);
        }
        let note = Notification::new(method, params);
        let wire = self.inner.codec.encode(&serde_json::to_value(&note)?)?;
        self.send_text(wire).await
    }

    /// Subscribes to one event, failing unless the server answers `"ok"`.
    pub async fn subscribe(&self, event: &str) -> ClientResult<()> {
        let statuses = self.subscribe_many(&[event]).await?;
        match statuses.get(event).map(String::as_str) {
            Some("ok") => Ok(()),
            status => Err(ClientError::Subscribe {
                event: event.to_string(),
                status: status.unwrap_or("missing status").to_string(),
            }),
        }
    }

    /// Subscribes to several events at once, returning the per-event status
    /// map as the server reported it.
    pub async fn subscribe_many(&self, events: &[&str]) -> ClientResult<HashMap<String, String>> {
        let params = Params::Array(events.iter().map(|e| Value::String((*e).to_string())).collect());
        let result = self.call("rpc.on", Some(params)).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Unsubscribes from one event, failing unless the server answers `"ok"`.
    pub async fn unsubscribe(&self, event: &str) -> ClientResult<()> {
        let statuses = self.unsubscribe_many(&[event]).await?;
        match statuses.get(event).map(String::as_str) {
            Some("ok") => Ok(()),
            status => Err(ClientError::Unsubscribe {
                event: event.to_string(),
                status: status.unwrap_or("missing status").to_string(),
            }),
        }
    }

    /// Unsubscribes from several events at once.
    pub async fn unsubscribe_many(&self, events: &[&str]) -> ClientResult<HashMap<String, String>> {
        let params = Params::Array(events.iter().map(|e| Value::String((*e).to_string())).collect());
        let result = self.call("rpc.off", Some(params)).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Authenticates this connection through `rpc.login`. Any falsy result
    /// counts as a rejection.
    pub async fn login(&self, params: Params) -> ClientResult<Value> {
        let result = self.call("rpc.login", Some(params)).await?;
        if is_falsy(&result) {
            return Err(ClientError::AuthenticationFailed);
        }
        Ok(result)
    }

    /// Names of the methods registered on the server side of this namespace.
    pub async fn list_methods(&self) -> ClientResult<Vec<String>> {
        let result = self.call("__listMethods", None).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Closes the connection with code 1000, which suppresses reconnection.
    pub async fn close(&self) -> ClientResult<()> {
        self.close_with(1000, "").await
    }

    /// Closes with an explicit code. Codes other than 1000 are treated like
    /// any other disconnection, so the client will redial if configured to.
    pub async fn close_with(&self, code: u16, reason: &str) -> ClientResult<()> {
        let mut sink = self.inner.sink.lock().await;
        match sink.as_mut() {
            Some(sink) => sink.close(code, reason).await,
            None => Ok(()),
        }
    }

    /// Takes the event stream. It can be taken exactly once.
    pub fn events(&self) -> ClientResult<mpsc::UnboundedReceiver<ClientEvent>> {
        self.inner
            .events_rx
            .lock()
            .take()
            .ok_or(ClientError::EventsTaken)
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.read()
    }

    pub fn config(&self) -> ClientConfig {
        self.inner.config.read().clone()
    }

    /// Turns automatic reconnection on or off for future disconnections.
    pub fn set_reconnect(&self, reconnect: bool) {
        self.inner.config.write().reconnect = reconnect;
    }

    pub fn set_reconnect_interval(&self, interval: Duration) {
        self.inner.config.write().reconnect_interval = interval;
    }

    pub fn set_max_reconnects(&self, max_reconnects: u32) {
        self.inner.config.write().max_reconnects = max_reconnects;
    }

    async fn send_request(
        &self,
        method: &str,
        params: Option<Params>,
    ) -> ClientResult<(u64, oneshot::Receiver<ClientResult<Value>>)> {
        if self.state() != ConnectionState::Open {
            return Err(ClientError::NotReady);
        }

        let id = self.inner.ids.next_id();
        let request = Request::new(method, params, id);
        let wire = self.inner.codec.encode(&serde_json::to_value(&request)?)?;

        // Registered before the frame goes out, so the reply cannot race the
        // table entry.
        let rx = self.inner.pending.insert(id);
        if let Err(e) = self.send_text(wire).await {
            self.inner.pending.remove(id);
            return Err(e);
        }
        Ok((id, rx))
    }

    async fn send_text(&self, text: String) -> ClientResult<()> {
        let mut sink = self.inner.sink.lock().await;
        match sink.as_mut() {
            Some(sink) => sink.send(text).await,
            None => Err(ClientError::NotReady),
        }
    }
}

/// Owns one established connection and the reconnect loop that follows it.
async fn drive(shared: Arc<ClientShared>, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
    loop {
        let (code, reason) = pump(&shared, &mut events).await;
        debug!("connection lost: code={} reason={:?}", code, reason);

        *shared.state.write() = ConnectionState::Disconnected;
        shared.sink.lock().await.take();
        shared.emit(ClientEvent::Close { code, reason });
        shared.pending.fail_all(|| ClientError::ConnectionClosed);

        if code == 1000 {
            *shared.state.write() = ConnectionState::Closed(code);
            return;
        }

        loop {
            let failed_so_far = shared.attempts.load(Ordering::Relaxed);
            let config = shared.config.read().clone();
            if !config.should_retry(failed_so_far) {
                *shared.state.write() = ConnectionState::Closed(code);
                return;
            }

            *shared.state.write() = ConnectionState::Reconnecting;
            debug!(
                "reconnect attempt {} in {:?}",
                failed_so_far + 1,
                config.reconnect_interval
            );
            tokio::select! {
                _ = tokio::time::sleep(config.reconnect_interval) => {}
                _ = shared.connect_now.notified() => {}
            }

            match shared.try_open().await {
                Ok(Some(new_events)) => {
                    events = new_events;
                    break;
                }
                // Another task took the connection over.
                Ok(None) => return,
                Err(e) => {
                    shared.attempts.fetch_add(1, Ordering::Relaxed);
                    warn!("reconnect failed: {}", e);
                    shared.emit(ClientEvent::Error(e.to_string()));
                }
            }
        }
    }
}

/// Forwards frames until the transport reports the connection gone.
async fn pump(
    shared: &ClientShared,
    events: &mut mpsc::UnboundedReceiver<TransportEvent>,
) -> (u16, String) {
    loop {
        match events.recv().await {
            Some(TransportEvent::Message(text)) => handle_frame(shared, &text),
            Some(TransportEvent::Error(e)) => {
                warn!("socket error: {}", e);
                shared.emit(ClientEvent::Error(e));
            }
            Some(TransportEvent::Closed { code, reason }) => return (code, reason),
            None => return (1006, String::new()),
        }
    }
}

fn handle_frame(shared: &ClientShared, text: &str) {
    let value = match shared.codec.decode(text) {
        Ok(value) => value,
        Err(e) => {
            // Frames that do not decode are dropped without killing the
            // connection.
            debug!("dropping undecodable frame: {}", e);
            return;
        }
    };
    let Some(obj) = value.as_object() else { return };

    // Server push: {notification, params}.
    if let Some(Value::String(name)) = obj.get("notification")
        && !name.is_empty()
    {
        let params = obj
            .get("params")
            .cloned()
            .and_then(Params::from_value)
            .unwrap_or_else(Params::empty);
        shared.emit(ClientEvent::Notification {
            name: name.clone(),
            params,
        });
        return;
    }

    // Reply to one of our calls.
    if let Some(id) = obj.get("id").and_then(Value::as_u64)
        && let Some(tx) = shared.pending.remove(id)
    {
        let has_result = obj.contains_key("result");
        let has_error = obj.contains_key("error");
        let outcome = if has_result == has_error {
            Err(ClientError::MalformedResponse)
        } else if has_error {
            match serde_json::from_value::<ErrorObject>(obj["error"].clone()) {
                Ok(error) => Err(ClientError::Rpc(error)),
                Err(_) => Err(ClientError::MalformedResponse),
            }
        } else {
            Ok(obj["result"].clone())
        };
        let _ = tx.send(outcome);
        return;
    }

    // Unknown or missing id: treat a method-shaped frame as a notification.
    if let Some(Value::String(method)) = obj.get("method")
        && !method.is_empty()
    {
        let params = obj
            .get("params")
            .cloned()
            .and_then(Params::from_value)
            .unwrap_or_else(Params::empty);
        shared.emit(ClientEvent::Notification {
            name: method.clone(),
            params,
        });
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Builder for creating clients
pub struct ClientBuilder {
    config: ClientConfig,
    codec: Arc<dyn Codec>,
    transport: Arc<dyn Transport>,
    ids: Box<dyn IdGenerator>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            codec: Arc::new(JsonCodec),
            transport: Arc::new(WsTransport),
            ids: Box::new(SequentialIds::default()),
        }
    }

    /// Replace the whole reconnect policy at once
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_reconnect(mut self, reconnect: bool) -> Self {
        self.config.reconnect = reconnect;
        self
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.config.reconnect_interval = interval;
        self
    }

    pub fn with_max_reconnects(mut self, max_reconnects: u32) -> Self {
        self.config.max_reconnects = max_reconnects;
        self
    }

    pub fn with_codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    pub fn with_id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    /// Builds the client without dialing.
    pub fn build(self, url: &str) -> ClientResult<Client> {
        let url = Url::parse(url)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(ClientShared {
            url,
            codec: self.codec,
            transport: self.transport,
            config: RwLock::new(self.config),
            state: RwLock::new(ConnectionState::Disconnected),
            pending: PendingCalls::new(),
            ids: self.ids,
            sink: tokio::sync::Mutex::new(None),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            attempts: AtomicU32::new(0),
            connect_now: Notify::new(),
        });
        Ok(Client { inner })
    }

    /// Builds the client and dials immediately.
    pub async fn connect(self, url: &str) -> ClientResult<Client> {
        let client = self.build(url)?;
        client.connect().await?;
        Ok(client)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
