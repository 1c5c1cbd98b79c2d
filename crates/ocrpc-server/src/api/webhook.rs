//! Inbound webhook - /webhook
//!
//! POST /webhook/roblox-webhook - every message the bus delivers to this
//! backend lands here and is handed to `RpcService::handle_rpc_body`.

use axum::{extract::State, routing::post, Json, Router};
use ocrpc_core::{Ack, RpcError};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/roblox-webhook", post(handle_message))
}

async fn handle_message(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<Ack>, RpcError> {
    let ack = state.rpc.handle_rpc_body(body).await?;
    Ok(Json(ack))
}
