//! Core error type for the RPC engine.
//!
//! `RpcError` is returned synchronously to the immediate caller of every
//! engine operation. Nothing is retried internally. When the `axum` feature
//! is enabled, it also implements `IntoResponse` so the webhook can return
//! it directly.

use crate::bus::TransportError;
use crate::envelope::{CorrelationId, PeerId};

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Registration conflict. A programming error; fail at startup.
    #[error("Handler for method '{0}' is already registered")]
    DuplicateHandler(String),

    #[error("No handler registered for method '{0}'")]
    UnknownMethod(String),

    #[error("Peer '{0}' is not connected")]
    UnknownPeer(PeerId),

    /// Stale, duplicate or late response.
    #[error("Invalid or unknown response ID '{0}'")]
    UnknownCorrelationId(CorrelationId),

    #[error("Connection to '{0}' is not active")]
    ConnectionInactive(PeerId),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Handler for '{method}' failed: {message}")]
    HandlerFailed { method: String, message: String },
}

// Application-defined error codes (JSON-RPC server range: -32000 to -32099)
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_REQUEST: i64 = -32600;
pub const INTERNAL_ERROR: i64 = -32603;
pub const DUPLICATE_HANDLER: i64 = -32010;
pub const UNKNOWN_PEER: i64 = -32011;
pub const UNKNOWN_CORRELATION_ID: i64 = -32012;
pub const CONNECTION_INACTIVE: i64 = -32013;
pub const TRANSPORT_ERROR: i64 = -32014;

impl RpcError {
    /// Numeric error code, stable across releases.
    pub fn code(&self) -> i64 {
        match self {
            RpcError::DuplicateHandler(_) => DUPLICATE_HANDLER,
            RpcError::UnknownMethod(_) => METHOD_NOT_FOUND,
            RpcError::UnknownPeer(_) => UNKNOWN_PEER,
            RpcError::UnknownCorrelationId(_) => UNKNOWN_CORRELATION_ID,
            RpcError::ConnectionInactive(_) => CONNECTION_INACTIVE,
            RpcError::Transport(_) => TRANSPORT_ERROR,
            RpcError::InvalidPayload(_) => INVALID_REQUEST,
            RpcError::HandlerFailed { .. } => INTERNAL_ERROR,
        }
    }
}

// ---------------------------------------------------------------------------
// axum integration (opt-in via feature flag)
// ---------------------------------------------------------------------------

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for RpcError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            RpcError::DuplicateHandler(_) => StatusCode::CONFLICT,
            RpcError::UnknownMethod(_) => StatusCode::NOT_FOUND,
            RpcError::UnknownPeer(_) => StatusCode::NOT_FOUND,
            RpcError::UnknownCorrelationId(_) => StatusCode::GONE,
            RpcError::ConnectionInactive(_) => StatusCode::CONFLICT,
            RpcError::Transport(_) => StatusCode::BAD_GATEWAY,
            RpcError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            RpcError::HandlerFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({ "error": self.to_string(), "code": self.code() });
        (status, axum::Json(body)).into_response()
    }
}
