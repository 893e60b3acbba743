//! Request dispatch
//!
//! Turns one incoming frame into at most one outgoing frame. Validation
//! failures always produce an error response; a handler outcome is only
//! reported back when the request carried a usable id. Ids follow loose
//! truthiness: `0`, `""`, `false` and `null` count as absent, so calls made
//! with such ids behave like notifications once they reach a handler.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use wsrpc_proto::{Codec, ErrorCode, ErrorObject, Params, ResponseEnvelope};

use crate::registry::{Registry, SubscribeOutcome, Visibility};

pub(crate) struct Dispatcher {
    registry: Arc<Registry>,
    codec: Arc<dyn Codec>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, codec: Arc<dyn Codec>) -> Self {
        Self { registry, codec }
    }

    /// Processes one frame for one socket. `None` means nothing goes back.
    pub async fn handle_payload(
        &self,
        text: &str,
        socket_id: &str,
        path: &str,
    ) -> Option<String> {
        let payload = match self.codec.decode(text) {
            Ok(payload) => payload,
            Err(e) => {
                let reply = ResponseEnvelope::error(
                    ErrorObject::with_data(ErrorCode::ParseError, e.to_string()),
                    Value::Null,
                );
                return self.encode(&reply);
            }
        };

        if let Value::Array(items) = payload {
            if items.is_empty() {
                let reply = ResponseEnvelope::error(
                    ErrorObject::with_data(ErrorCode::InvalidRequest, "Invalid array"),
                    Value::Null,
                );
                return self.encode(&reply);
            }
            let mut replies = Vec::new();
            for item in &items {
                if let Some(reply) = self.run_single(item, socket_id, path).await {
                    replies.push(reply);
                }
            }
            if replies.is_empty() {
                return None;
            }
            return self.encode(&replies);
        }

        match self.run_single(&payload, socket_id, path).await {
            Some(reply) => self.encode(&reply),
            None => None,
        }
    }

    /// Validates and runs one request. `None` suppresses the response.
    async fn run_single(
        &self,
        message: &Value,
        socket_id: &str,
        path: &str,
    ) -> Option<ResponseEnvelope> {
        let Some(obj) = message.as_object() else {
            return Some(ResponseEnvelope::error(
                ErrorObject::new(ErrorCode::InvalidRequest),
                Value::Null,
            ));
        };
        let id = effective_id(obj.get("id"));

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            return Some(ResponseEnvelope::error(
                ErrorObject::with_data(ErrorCode::InvalidRequest, "Invalid JSON RPC version"),
                id,
            ));
        }

        let method_member = obj.get("method");
        if !is_truthy(method_member) {
            return Some(ResponseEnvelope::error(
                ErrorObject::with_data(ErrorCode::InvalidParams, "Method not specified"),
                id,
            ));
        }
        let method = match method_member {
            Some(Value::String(name)) => name.as_str(),
            _ => {
                return Some(ResponseEnvelope::error(
                    ErrorObject::with_data(ErrorCode::InvalidRequest, "Invalid method name"),
                    id,
                ));
            }
        };

        let params = match obj.get("params") {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) => Some(Params::Array(items.clone())),
            Some(Value::Object(map)) => {
                Some(Params::Object(map.clone().into_iter().collect()))
            }
            Some(_) => {
                return Some(ResponseEnvelope::error(
                    ErrorObject::new(ErrorCode::InvalidRequest),
                    id,
                ));
            }
        };

        match method {
            "rpc.on" => Some(self.subscribe(params, socket_id, path, id).await),
            "rpc.off" => Some(self.unsubscribe(params, socket_id, path, id).await),
            _ => {
                if method == "rpc.login" && params.is_none() {
                    return Some(ResponseEnvelope::error(
                        ErrorObject::new(ErrorCode::ParamsNotFound),
                        id,
                    ));
                }
                if method == "__listMethods" {
                    if id.is_null() {
                        return None;
                    }
                    let names = self.registry.method_names(path).await;
                    return Some(ResponseEnvelope::success(
                        serde_json::json!(names),
                        id,
                    ));
                }
                self.call_method(method, params, socket_id, path, id).await
            }
        }
    }

    async fn call_method(
        &self,
        method: &str,
        params: Option<Params>,
        socket_id: &str,
        path: &str,
        id: Value,
    ) -> Option<ResponseEnvelope> {
        let Some((handler, visibility)) = self.registry.lookup_method(path, method).await else {
            return Some(ResponseEnvelope::error(
                ErrorObject::new(ErrorCode::MethodNotFound),
                id,
            ));
        };
        if visibility == Visibility::Protected
            && !self.registry.client_authenticated(path, socket_id).await
        {
            return Some(ResponseEnvelope::error(
                ErrorObject::new(ErrorCode::MethodForbidden),
                id,
            ));
        }

        match handler.handle(params, socket_id.to_string()).await {
            Err(e) => {
                // Without an id the failure is swallowed; there is nobody
                // waiting for it.
                if id.is_null() {
                    debug!("handler {}{} failed on notification: {}", path, method, e);
                    return None;
                }
                Some(ResponseEnvelope::error(e.into_error_object(), id))
            }
            Ok(result) => {
                if id.is_null() {
                    return None;
                }
                // The auth flip requires a strict boolean true, and only for
                // calls that actually get a response.
                if method == "rpc.login" && result == Value::Bool(true) {
                    self.registry.authenticate(path, socket_id).await;
                }
                Some(ResponseEnvelope::success(result, id))
            }
        }
    }

    async fn subscribe(
        &self,
        params: Option<Params>,
        socket_id: &str,
        path: &str,
        id: Value,
    ) -> ResponseEnvelope {
        let Some(Params::Array(items)) = params else {
            return ResponseEnvelope::error(ErrorObject::new(ErrorCode::EventNotProvided), id);
        };
        let names: Vec<String> = items.iter().map(event_key).collect();
        match self.registry.subscribe(path, socket_id, &names).await {
            SubscribeOutcome::Forbidden => {
                ResponseEnvelope::error(ErrorObject::new(ErrorCode::EventForbidden), id)
            }
            SubscribeOutcome::Statuses(statuses) => {
                ResponseEnvelope::success(serde_json::json!(statuses), id)
            }
        }
    }

    async fn unsubscribe(
        &self,
        params: Option<Params>,
        socket_id: &str,
        path: &str,
        id: Value,
    ) -> ResponseEnvelope {
        let Some(Params::Array(items)) = params else {
            return ResponseEnvelope::error(ErrorObject::new(ErrorCode::EventNotProvided), id);
        };
        let names: Vec<String> = items.iter().map(event_key).collect();
        let statuses = self.registry.unsubscribe(path, socket_id, &names).await;
        ResponseEnvelope::success(serde_json::json!(statuses), id)
    }

    fn encode<T: Serialize>(&self, reply: &T) -> Option<String> {
        let value = match serde_json::to_value(reply) {
            Ok(value) => value,
            Err(e) => {
                error!("response serialization failed: {}", e);
                return None;
            }
        };
        match self.codec.encode(&value) {
            Ok(text) => Some(text),
            Err(e) => {
                error!("response encoding failed: {}", e);
                None
            }
        }
    }
}

/// Loose truthiness over JSON values, matching how ids and method names are
/// screened.
fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// The id a response will carry: the request id when truthy, `null`
/// otherwise.
fn effective_id(id: Option<&Value>) -> Value {
    match id {
        Some(value) if is_truthy(Some(value)) => value.clone(),
        _ => Value::Null,
    }
}

/// Key for subscription status maps. Non-string entries keep their JSON
/// rendering.
fn event_key(value: &Value) -> String {
    match value {
        Value::String(name) => name.clone(),
        other => other.to_string(),
    }
}
