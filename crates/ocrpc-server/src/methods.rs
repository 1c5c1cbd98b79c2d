//! Built-in global RPC methods that game servers can invoke.
//!
//! Methods:
//! - `Ping` - liveness check, returns `{ "pong": true, "time": <rfc3339> }`
//! - `Echo` - returns its arguments unchanged

use ocrpc_core::{handler_fn, MethodHandler};

/// The method → handler mapping installed on every server.
pub fn builtin_handlers() -> Vec<(String, MethodHandler)> {
    vec![
        (
            "Ping".to_string(),
            handler_fn(|_| async {
                Ok(serde_json::json!({
                    "pong": true,
                    "time": chrono::Utc::now().to_rfc3339(),
                }))
            }),
        ),
        ("Echo".to_string(), handler_fn(|args| async move { Ok(args) })),
    ]
}
