//! ocrpc CLI - command-line interface for the game server RPC backend.
//!
//! Reuses the same engine (ocrpc-core) and server bootstrap (ocrpc-server)
//! that a host application would embed.

mod commands;

use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use ocrpc_core::RpcConfig;
use ocrpc_server::opencloud::OpenCloudConfig;

/// ocrpc - RPC between Roblox game servers and a backend
#[derive(Parser)]
#[command(name = "ocrpc", version, about = "ocrpc - RPC between Roblox game servers and a backend")]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook server
    Server {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on
        #[arg(long, env = "PORT", default_value_t = 3000)]
        port: u16,
        #[command(flatten)]
        opencloud: OpenCloudArgs,
        /// Global topic for fan-out calls and global replies
        #[arg(long, env = "OCRPC_TOPIC", default_value = "rpc-global")]
        topic: String,
        /// Deadline for outbound calls, in milliseconds
        #[arg(long, env = "OCRPC_TIMEOUT_MS", default_value_t = 10_000)]
        timeout_ms: u64,
    },

    /// Publish one raw message through Open Cloud
    Publish {
        #[command(flatten)]
        opencloud: OpenCloudArgs,
        /// Topic to publish to
        #[arg(long, env = "OCRPC_TOPIC", default_value = "rpc-global")]
        topic: String,
        /// Message text (usually a JSON envelope)
        #[arg(long)]
        message: String,
    },

    /// Call a method through a running server
    Call {
        /// Base URL of the running ocrpc server
        #[arg(long, env = "OCRPC_URL", default_value = "http://127.0.0.1:3000")]
        url: String,
        /// Method name (e.g. "GetPlayers")
        #[arg(long)]
        method: String,
        /// Arguments as a JSON string
        #[arg(long, default_value = "{}")]
        args: String,
        /// Target game server. Omit to call every connected one.
        #[arg(long)]
        job_id: Option<String>,
    },
}

/// Open Cloud credentials shared by `server` and `publish`.
#[derive(Args)]
struct OpenCloudArgs {
    /// Universe whose MessagingService is used
    #[arg(long, env = "UNIVERSE_ID")]
    universe_id: Option<String>,
    /// Open Cloud API key with messaging publish permission
    #[arg(long, env = "ROBLOX_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    /// Open Cloud base URL
    #[arg(long, env = "OCRPC_OPEN_CLOUD_URL", default_value = "https://apis.roblox.com")]
    base_url: String,
}

impl OpenCloudArgs {
    fn into_config(self) -> OpenCloudConfig {
        OpenCloudConfig {
            universe_id: self.universe_id.unwrap_or_default(),
            api_key: self.api_key.unwrap_or_default(),
            base_url: self.base_url,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ocrpc_core=info,ocrpc_server=info,ocrpc_cli=info".into()),
        )
        .init();

    let result = match cli.command {
        Some(Commands::Server {
            host,
            port,
            opencloud,
            topic,
            timeout_ms,
        }) => {
            let rpc = RpcConfig {
                default_topic: topic,
                default_timeout: Duration::from_millis(timeout_ms),
                ..RpcConfig::default()
            };
            commands::server::run(host, port, opencloud.into_config(), rpc).await
        }

        Some(Commands::Publish {
            opencloud,
            topic,
            message,
        }) => commands::publish::run(opencloud.into_config(), &topic, message).await,

        Some(Commands::Call {
            url,
            method,
            args,
            job_id,
        }) => commands::call::run(&url, &method, &args, job_id.as_deref()).await,

        None => {
            // No subcommand - show help
            use clap::CommandFactory;
            Cli::command().print_help().ok();
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
