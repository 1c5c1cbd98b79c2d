//! Connected peers - /api/peers
//!
//! GET /api/peers - list connected game servers

use axum::{extract::State, routing::get, Json, Router};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_peers))
}

async fn list_peers(State(state): State<AppState>) -> Json<serde_json::Value> {
    let peers = state.rpc.pool().peers().await;
    Json(serde_json::json!({ "peers": peers, "count": peers.len() }))
}
