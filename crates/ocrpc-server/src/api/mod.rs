pub mod calls;
pub mod peers;
pub mod webhook;

use axum::Router;

use crate::state::AppState;

/// Build the complete API router with all sub-routes.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/webhook", webhook::router())
        .nest("/api/call", calls::router())
        .nest("/api/peers", peers::router())
}
