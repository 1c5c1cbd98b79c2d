//! ocrpc Core - RPC correlation and connection lifecycle over a pub/sub bus.
//!
//! The message bus between the backend and game servers only offers
//! at-least-once, unordered `publish(topic, message)`. This crate layers
//! call/response semantics on top of it:
//!
//! - correlation ids minted per outstanding call, resolved exactly once
//!   by a matching `response`, a deadline, or a disconnect
//! - a pool of connected peers (keyed by job id) that calls can target
//! - fan-out calls to every connected peer, aggregated into one result
//!
//! It has **no HTTP framework dependency** by default. The inbound webhook
//! and the Open Cloud publisher live in `ocrpc-server`.
//!
//! # Feature Flags
//!
//! - `axum` - Enables `IntoResponse` impl on `RpcError` for use in axum handlers.
//!
//! # Example
//!
//! ```ignore
//! use ocrpc_core::{RpcConfig, RpcService, handler_fn};
//!
//! let service = RpcService::new(bus, RpcConfig::default());
//! service
//!     .register_handler("Ping", handler_fn(|_| async { Ok(serde_json::json!("pong")) }), None)
//!     .await?;
//!
//! // Every message delivered by the webhook goes through here:
//! let ack = service.handle_rpc_body(body).await?;
//! ```

pub mod bus;
pub mod config;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod pending;
pub mod pool;
pub mod service;

// Convenience re-exports
pub use bus::{MemoryBus, MessageBus, Published, TransportError};
pub use config::RpcConfig;
pub use connection::{CallResult, Connection, ConnectionConfig, NoAnswer};
pub use envelope::{Ack, AckStatus, CorrelationId, Envelope, EnvelopeKind, Outbound, PeerId};
pub use error::RpcError;
pub use handler::{handler_fn, HandlerTable, MethodHandler};
pub use pool::{ConnectionPool, PeerInfo};
pub use service::{CallReply, FanOutResult, PeerResponse, RpcService};
