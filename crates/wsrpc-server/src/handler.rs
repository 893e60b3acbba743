//! Method handler trait and adapters

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use thiserror::Error;
use wsrpc_proto::{ErrorObject, Params};

/// Identifies one connected socket for the lifetime of its connection
pub type SocketId = String;

/// What a method handler hands back to the dispatcher
pub type HandlerResult = Result<Value, HandlerError>;

/// A handler failure on its way into a JSON-RPC error response
#[derive(Error, Debug)]
pub enum HandlerError {
    /// A fully shaped error object, relayed as is
    #[error("{0}")]
    Rpc(ErrorObject),

    /// A labelled failure; becomes code -32000 with the label as message
    /// and the detail as `data`
    #[error("{label}: {detail}")]
    Failure { label: String, detail: String },
}

impl HandlerError {
    pub fn failure(label: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Failure {
            label: label.into(),
            detail: detail.into(),
        }
    }

    pub fn rpc(error: ErrorObject) -> Self {
        Self::Rpc(error)
    }

    pub(crate) fn into_error_object(self) -> ErrorObject {
        match self {
            Self::Rpc(error) => error,
            Self::Failure { label, detail } => {
                ErrorObject::custom(-32000, label, Some(Value::String(detail)))
            }
        }
    }
}

impl From<ErrorObject> for HandlerError {
    fn from(error: ErrorObject) -> Self {
        Self::Rpc(error)
    }
}

/// Trait for handling JSON-RPC method calls
///
/// Handlers receive the decoded params as the caller sent them and the id of
/// the socket making the call, so per-connection state can key off it.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn handle(&self, params: Option<Params>, socket_id: SocketId) -> HandlerResult;
}

/// A closure-based handler
pub struct FunctionHandler<F>(F);

impl<F> FunctionHandler<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> MethodHandler for FunctionHandler<F>
where
    F: Fn(Option<Params>, SocketId) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn handle(&self, params: Option<Params>, socket_id: SocketId) -> HandlerResult {
        (self.0)(params, socket_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn function_handler_passes_arguments_through() {
        let handler = FunctionHandler::new(|params: Option<Params>, socket_id: SocketId| async move {
            Ok(json!({"params": params.map(|p| p.to_value()), "socket": socket_id}))
        });

        let result = handler
            .handle(Some(Params::Array(vec![json!(1)])), "s1".to_string())
            .await
            .unwrap();
        assert_eq!(result["params"], json!([1]));
        assert_eq!(result["socket"], "s1");
    }

    #[test]
    fn failure_becomes_dash_32000() {
        let object = HandlerError::failure("Error", "boom").into_error_object();
        assert_eq!(object.code, -32000);
        assert_eq!(object.message, "Error");
        assert_eq!(object.data, Some(json!("boom")));
    }

    #[test]
    fn rpc_errors_are_relayed_verbatim() {
        let source = ErrorObject::custom(-32050, "quota exceeded", None);
        let object = HandlerError::rpc(source).into_error_object();
        assert_eq!(object.code, -32050);
        assert_eq!(object.message, "quota exceeded");
    }
}
