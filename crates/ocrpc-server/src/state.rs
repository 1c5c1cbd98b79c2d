//! Shared application state for the axum server.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ocrpc_core::RpcService;

/// Shared state accessible by all API handlers.
pub struct AppStateInner {
    pub rpc: Arc<RpcService>,
    pub started_at: DateTime<Utc>,
}

pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    pub fn new(rpc: Arc<RpcService>) -> Self {
        Self {
            rpc,
            started_at: Utc::now(),
        }
    }
}
