//! Wire-level building blocks for JSON-RPC 2.0 over a message-oriented
//! transport.
//!
//! This crate defines the envelopes both peers exchange (requests,
//! notifications, responses, server pushes), the fixed error-code table, and
//! the [`Codec`] boundary that turns structured values into wire payloads.
//! It contains no I/O; the client and server crates compose these types with
//! an actual transport.

pub mod codec;
pub mod error;
pub mod request;
pub mod response;
pub mod types;

pub use codec::{Codec, CodecError, JsonCodec};
pub use error::{ErrorCode, ErrorObject};
pub use request::{Notification, Params, Request};
pub use response::{ErrorResponse, Response, ResponseEnvelope, ServerPush};
pub use types::{ProtocolVersion, RequestId};

/// JSON-RPC protocol version string used in all envelopes.
pub const JSONRPC_VERSION: &str = "2.0";
