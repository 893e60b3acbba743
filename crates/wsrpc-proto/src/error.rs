use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The fixed error-code table. Consumers cannot extend it beyond attaching
/// `data` to an [`ErrorObject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    ParamsNotFound,
    MethodForbidden,
    EventForbidden,
    EventNotProvided,
}

impl ErrorCode {
    pub fn code(&self) -> i64 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
            ErrorCode::ParamsNotFound => -32604,
            ErrorCode::MethodForbidden => -32605,
            ErrorCode::EventForbidden => -32606,
            ErrorCode::EventNotProvided => -32000,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::ParseError => "Parse error",
            ErrorCode::InvalidRequest => "Invalid Request",
            ErrorCode::MethodNotFound => "Method not found",
            ErrorCode::InvalidParams => "Invalid params",
            ErrorCode::InternalError => "Internal error",
            ErrorCode::ParamsNotFound => "Params not found",
            ErrorCode::MethodForbidden => "Method forbidden",
            ErrorCode::EventForbidden => "Event forbidden",
            ErrorCode::EventNotProvided => "Event not provided",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

/// JSON-RPC error member: `{code, message, data?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    /// Error with the canonical message for `code` and no detail.
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code: code.code(),
            message: code.message().to_string(),
            data: None,
        }
    }

    /// Error with the canonical message for `code`, carrying extra detail.
    pub fn with_data(code: ErrorCode, data: impl Into<Value>) -> Self {
        Self {
            code: code.code(),
            message: code.message().to_string(),
            data: Some(data.into()),
        }
    }

    /// Arbitrary error object, used when a handler shapes its own error.
    pub fn custom(code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            code,
            message: message.into(),
            data,
        }
    }
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorObject {}
