//! # WebSocket JSON-RPC Client
//!
//! A JSON-RPC 2.0 client speaking over a persistent WebSocket connection.
//! Calls are correlated by id through an in-flight table, server pushes
//! arrive on an event stream, and abnormal disconnections trigger automatic
//! reconnection with a configurable cap and interval.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wsrpc_client::{Client, ClientEvent};
//! use wsrpc_proto::Params;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder().connect("ws://localhost:8080/api").await?;
//!
//!     let sum = client
//!         .call("add", Some(Params::Array(vec![json!(1), json!(2)])))
//!         .await?;
//!     println!("1 + 2 = {}", sum);
//!
//!     client.subscribe("alerts").await?;
//!     let mut events = client.events()?;
//!     while let Some(event) = events.recv().await {
//!         if let ClientEvent::Notification { name, params } = event {
//!             println!("{name}: {params:?}");
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
mod pending;
pub mod transport;

// Re-export main types
pub use client::{Client, ClientBuilder, ClientEvent, ConnectionState, IdGenerator, SequentialIds};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};

// Re-export transport types
pub use transport::{Transport, TransportConnection, TransportEvent, TransportSink, WsTransport};

// Re-export wire types for convenience
pub use wsrpc_proto::{ErrorObject, Params};
