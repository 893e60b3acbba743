//! # WebSocket JSON-RPC Server
//!
//! A JSON-RPC 2.0 server multiplexing WebSocket connections across
//! namespaces. Each namespace carries its own methods, events, and
//! connected sockets; methods and events may be marked protected, gated on
//! a per-socket authentication flag flipped by `rpc.login`. Events fan out
//! to subscribed sockets only.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wsrpc_server::Server;
//! use wsrpc_proto::Params;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::builder()
//!         .with_bind_address(([127, 0, 0, 1], 8080).into())
//!         .bind()
//!         .await?;
//!
//!     server
//!         .register_fn("add", |params, _socket| async move {
//!             let params = params.unwrap_or_else(Params::empty);
//!             let a = params.get_index(0).and_then(|v| v.as_i64()).unwrap_or(0);
//!             let b = params.get_index(1).and_then(|v| v.as_i64()).unwrap_or(0);
//!             Ok(json!(a + b))
//!         })
//!         .await;
//!
//!     server.event("tick").await?;
//!     server.emit("tick", Params::Array(vec![json!(1)])).await?;
//!
//!     // The accept loop runs in the background until close().
//!     futures::future::pending::<()>().await;
//!     Ok(())
//! }
//! ```

mod connection;
mod dispatch;
pub mod error;
pub mod handler;
pub mod namespace;
pub mod registry;
pub mod server;

// Re-export main types
pub use error::{ServerError, ServerResult};
pub use handler::{FunctionHandler, HandlerError, HandlerResult, MethodHandler, SocketId};
pub use namespace::NamespaceHandle;
pub use registry::{Registry, SocketInfo, Visibility};
pub use server::{Server, ServerBuilder, ServerConfig, ServerEvent};

// Re-export wire types for convenience
pub use wsrpc_proto::{ErrorObject, Params};
