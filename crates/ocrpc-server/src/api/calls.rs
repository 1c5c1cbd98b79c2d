//! Outbound calls - /api/call
//!
//! POST /api/call - call a method on one game server (`jobId` set) or on
//! every connected game server (`jobId` omitted) and wait for the result.

use axum::{extract::State, routing::post, Json, Router};
use ocrpc_core::{CallReply, CallResult, NoAnswer, RpcError};
use serde::Deserialize;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(call))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallParams {
    pub method: String,
    #[serde(default)]
    pub args: serde_json::Value,
    pub job_id: Option<String>,
}

async fn call(
    State(state): State<AppState>,
    Json(params): Json<CallParams>,
) -> Result<Json<serde_json::Value>, RpcError> {
    let reply = state
        .rpc
        .call(&params.method, params.args, params.job_id.as_deref())
        .await?;
    Ok(Json(reply_to_json(reply)))
}

fn reply_to_json(reply: CallReply) -> serde_json::Value {
    match reply {
        CallReply::Peer(CallResult::Answered(result)) => {
            serde_json::json!({ "answered": true, "result": result })
        }
        CallReply::Peer(CallResult::NoAnswer(reason)) => {
            let reason = match reason {
                NoAnswer::TimedOut => "timedOut",
                NoAnswer::Disconnected => "disconnected",
                NoAnswer::NotConnected => "notConnected",
            };
            serde_json::json!({ "answered": false, "result": null, "reason": reason })
        }
        CallReply::FanOut(result) => serde_json::to_value(result).unwrap_or_default(),
    }
}
