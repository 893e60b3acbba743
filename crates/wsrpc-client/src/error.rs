//! Error types for client operations

use thiserror::Error;
use wsrpc_proto::{CodecError, ErrorObject};

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Everything a call, subscription or connection attempt can fail with
#[derive(Error, Debug)]
pub enum ClientError {
    /// Call attempted while the connection is not open
    #[error("socket not ready")]
    NotReady,

    /// No reply arrived within the per-call deadline
    #[error("reply timeout")]
    ReplyTimeout,

    /// Reply carried both `result` and `error`, or neither
    #[error("Server response malformed. Response must include either \"result\" or \"error\", but not both.")]
    MalformedResponse,

    /// Connection dropped while the call was in flight
    #[error("connection closed before a reply arrived")]
    ConnectionClosed,

    /// `rpc.login` returned a falsy result
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Server declined a subscription
    #[error("subscribing to {event} failed: {status}")]
    Subscribe { event: String, status: String },

    /// Server declined an unsubscription
    #[error("unsubscribing from {event} failed: {status}")]
    Unsubscribe { event: String, status: String },

    /// Server answered the call with a JSON-RPC error object
    #[error("server error: {0}")]
    Rpc(ErrorObject),

    /// Transport-level failure (handshake, socket I/O)
    #[error("transport error: {0}")]
    Transport(String),

    /// Wire text could not be encoded or decoded
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Server address could not be parsed
    #[error("invalid server address: {0}")]
    Address(#[from] url::ParseError),

    /// JSON (de)serialization outside the codec boundary
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The event receiver was already handed out
    #[error("event stream already taken")]
    EventsTaken,
}

impl ClientError {
    /// Error code of the server-side error, if this is one
    pub fn rpc_code(&self) -> Option<i64> {
        match self {
            Self::Rpc(err) => Some(err.code),
            _ => None,
        }
    }

    /// True when retrying the call after a reconnect could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotReady | Self::ReplyTimeout | Self::ConnectionClosed | Self::Transport(_)
        )
    }
}
