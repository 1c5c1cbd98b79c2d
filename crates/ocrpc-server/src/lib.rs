//! ocrpc Server - webhook ingestion and Open Cloud publishing
//!
//! Hosts an [`RpcService`] behind an axum HTTP server:
//! - `POST /webhook/roblox-webhook`: inbound bus messages
//! - `POST /api/call`: call one game server, or every connected one
//! - `GET  /api/peers`: connected game servers
//! - `GET  /api/health`: liveness
//!
//! Outbound messages are published through Roblox Open Cloud
//! ([`opencloud::OpenCloudClient`]).

pub mod api;
pub mod methods;
pub mod opencloud;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use ocrpc_core::{MessageBus, RpcConfig, RpcService};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use self::opencloud::{OpenCloudClient, OpenCloudConfig};
use self::state::{AppState, AppStateInner};

/// Configuration for the ocrpc server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub opencloud: OpenCloudConfig,
    pub rpc: RpcConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            opencloud: OpenCloudConfig::default(),
            rpc: RpcConfig::default(),
        }
    }
}

/// Create the RPC service on top of `bus` with the built-in global methods
/// installed.
pub async fn create_service(
    bus: Arc<dyn MessageBus>,
    rpc: RpcConfig,
) -> Result<Arc<RpcService>, String> {
    let service = RpcService::new(bus, rpc);
    service
        .register_handlers(methods::builtin_handlers())
        .await
        .map_err(|e| format!("Failed to register built-in handlers: {}", e))?;
    Ok(Arc::new(service))
}

/// Build the axum app for a service. Useful for in-process tests.
pub fn app(service: Arc<RpcService>) -> Router {
    let state: AppState = Arc::new(AppStateInner::new(service));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api::api_router())
        .route("/api/health", axum::routing::get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the server publishing through Open Cloud.
///
/// Returns the actual address the server is listening on.
pub async fn start_server(config: ServerConfig) -> Result<SocketAddr, String> {
    // Initialize tracing (a no-op if the host already did)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ocrpc_server=info,ocrpc_core=info,tower_http=info".into()),
        )
        .try_init();

    tracing::info!(
        "Starting ocrpc server on {}:{} (universe {}, topic {})",
        config.host,
        config.port,
        config.opencloud.universe_id,
        config.rpc.default_topic
    );

    let bus: Arc<dyn MessageBus> = Arc::new(OpenCloudClient::new(config.opencloud.clone())?);
    let service = create_service(bus, config.rpc.clone()).await?;

    start_server_with_service(config, service).await
}

/// Start the HTTP server with a pre-built service.
///
/// This variant is useful when the host wants to register its own
/// handlers or use a different bus.
pub async fn start_server_with_service(
    config: ServerConfig,
    service: Arc<RpcService>,
) -> Result<SocketAddr, String> {
    let app = app(service);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    let local_addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to get local address: {}", e))?;

    tracing::info!("ocrpc server listening on {}", local_addr);

    // Spawn the server in a background task
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok(local_addr)
}

async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "server": "ocrpc-server",
        "version": env!("CARGO_PKG_VERSION"),
        "startedAt": state.started_at.to_rfc3339(),
        "peers": state.rpc.pool().len().await,
    }))
}
