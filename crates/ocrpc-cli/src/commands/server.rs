//! `ocrpc server` - Start the webhook server.

use ocrpc_core::RpcConfig;
use ocrpc_server::opencloud::OpenCloudConfig;

pub async fn run(
    host: String,
    port: u16,
    opencloud: OpenCloudConfig,
    rpc: RpcConfig,
) -> Result<(), String> {
    let config = ocrpc_server::ServerConfig {
        host: host.clone(),
        port,
        opencloud,
        rpc,
    };

    println!("Starting ocrpc server on {}:{}...", host, port);

    let addr = ocrpc_server::start_server(config).await?;
    println!("ocrpc server listening on http://{}", addr);
    println!("  webhook: http://{}/webhook/roblox-webhook", addr);

    // Keep the process running until interrupted
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to listen for Ctrl+C: {}", e))?;

    println!("\nShutting down...");
    Ok(())
}
