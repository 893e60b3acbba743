use crate::types::{ProtocolVersion, RequestId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Call parameters. JSON-RPC allows positional (array) or named (object)
/// parameters; anything else is rejected at validation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Params {
    Array(Vec<Value>),
    Object(HashMap<String, Value>),
}

impl Params {
    /// Empty positional parameters (`[]`).
    pub fn empty() -> Self {
        Params::Array(Vec::new())
    }

    /// Named-parameter lookup. `None` for positional params.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Params::Object(map) => map.get(key),
            Params::Array(_) => None,
        }
    }

    /// Positional lookup. `None` for named params.
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        match self {
            Params::Array(items) => items.get(index),
            Params::Object(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Params::Array(items) => items.len(),
            Params::Object(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_value(&self) -> Value {
        match self {
            Params::Array(items) => Value::Array(items.clone()),
            Params::Object(map) => {
                Value::Object(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            }
        }
    }

    /// Reads params out of a raw value. Only arrays and objects qualify.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Array(items) => Some(Params::Array(items)),
            Value::Object(map) => Some(Params::Object(map.into_iter().collect())),
            _ => None,
        }
    }
}

impl From<Vec<Value>> for Params {
    fn from(items: Vec<Value>) -> Self {
        Params::Array(items)
    }
}

impl From<HashMap<String, Value>> for Params {
    fn from(map: HashMap<String, Value>) -> Self {
        Params::Object(map)
    }
}

/// A call that expects a response, correlated by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "jsonrpc")]
    pub version: ProtocolVersion,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
    pub id: RequestId,
}

impl Request {
    pub fn new(method: impl Into<String>, params: Option<Params>, id: impl Into<RequestId>) -> Self {
        Self {
            version: ProtocolVersion::V2,
            method: method.into(),
            params,
            id: id.into(),
        }
    }
}

/// A call with no `id`; the receiver must not answer it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "jsonrpc")]
    pub version: ProtocolVersion,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Option<Params>) -> Self {
        Self {
            version: ProtocolVersion::V2,
            method: method.into(),
            params,
        }
    }
}
