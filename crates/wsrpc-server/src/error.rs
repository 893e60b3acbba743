//! Error types for server operations

use thiserror::Error;
use wsrpc_proto::CodecError;

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

/// Failures surfaced by the server API. Per-request failures never appear
/// here; those travel back to the calling peer as JSON-RPC error responses.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Binding or socket I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Event registered twice in the same namespace
    #[error("event '{name}' already registered in namespace {namespace}")]
    DuplicateEvent { namespace: String, name: String },

    /// Event name not known to the namespace
    #[error("no event '{name}' in namespace {namespace}")]
    UnknownEvent { namespace: String, name: String },

    /// Method name not known to the namespace
    #[error("no method '{name}' in namespace {namespace}")]
    UnknownMethod { namespace: String, name: String },

    /// The event receiver was already handed out
    #[error("event stream already taken")]
    EventsTaken,

    /// WebSocket upgrade failed on an incoming connection
    #[error("websocket handshake failed: {0}")]
    Handshake(String),

    /// Wire text could not be encoded or decoded
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// JSON (de)serialization outside the codec boundary
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
