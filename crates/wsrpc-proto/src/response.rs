use crate::error::ErrorObject;
use crate::request::Params;
use crate::types::ProtocolVersion;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Successful reply. `id` echoes the request id verbatim, so it stays a raw
/// value rather than a [`crate::RequestId`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "jsonrpc")]
    pub version: ProtocolVersion,
    pub result: Value,
    pub id: Value,
}

impl Response {
    pub fn new(result: Value, id: Value) -> Self {
        Self {
            version: ProtocolVersion::V2,
            result,
            id,
        }
    }
}

/// Failed reply. `id` is `null` when the request id could not be read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "jsonrpc")]
    pub version: ProtocolVersion,
    pub error: ErrorObject,
    pub id: Value,
}

impl ErrorResponse {
    pub fn new(error: ErrorObject, id: Value) -> Self {
        Self {
            version: ProtocolVersion::V2,
            error,
            id,
        }
    }
}

/// Either side of a reply. Untagged so the wire carries exactly one of
/// `result` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseEnvelope {
    Success(Response),
    Error(ErrorResponse),
}

impl ResponseEnvelope {
    pub fn success(result: Value, id: Value) -> Self {
        ResponseEnvelope::Success(Response::new(result, id))
    }

    pub fn error(error: ErrorObject, id: Value) -> Self {
        ResponseEnvelope::Error(ErrorResponse::new(error, id))
    }

    pub fn id(&self) -> &Value {
        match self {
            ResponseEnvelope::Success(r) => &r.id,
            ResponseEnvelope::Error(r) => &r.id,
        }
    }
}

/// Server-to-client event frame: `{notification, params}`. Carries no id and
/// expects no reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerPush {
    pub notification: String,
    pub params: Params,
}

impl ServerPush {
    pub fn new(notification: impl Into<String>, params: Params) -> Self {
        Self {
            notification: notification.into(),
            params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    #[test]
    fn success_wire_shape() {
        let wire = serde_json::to_value(Response::new(json!("pong"), json!(3))).unwrap();
        assert_eq!(wire, json!({"jsonrpc": "2.0", "result": "pong", "id": 3}));
    }

    #[test]
    fn error_wire_shape() {
        let wire = serde_json::to_value(ErrorResponse::new(
            ErrorObject::new(ErrorCode::MethodNotFound),
            Value::Null,
        ))
        .unwrap();
        assert_eq!(
            wire,
            json!({
                "jsonrpc": "2.0",
                "error": {"code": -32601, "message": "Method not found"},
                "id": null
            })
        );
    }

    #[test]
    fn envelope_distinguishes_sides() {
        let ok: ResponseEnvelope =
            serde_json::from_value(json!({"jsonrpc": "2.0", "result": 1, "id": 1})).unwrap();
        assert!(matches!(ok, ResponseEnvelope::Success(_)));

        let err: ResponseEnvelope = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "error": {"code": -32700, "message": "Parse error"},
            "id": null
        }))
        .unwrap();
        assert!(matches!(err, ResponseEnvelope::Error(_)));
    }

    #[test]
    fn push_wire_shape() {
        let push = ServerPush::new("tick", Params::Array(vec![json!(42)]));
        let wire = serde_json::to_value(&push).unwrap();
        assert_eq!(wire, json!({"notification": "tick", "params": [42]}));
    }
}
