//! `ocrpc publish` - One raw publish through Open Cloud.

use ocrpc_core::MessageBus;
use ocrpc_server::opencloud::{OpenCloudClient, OpenCloudConfig};

pub async fn run(opencloud: OpenCloudConfig, topic: &str, message: String) -> Result<(), String> {
    let client = OpenCloudClient::new(opencloud)?;
    let bytes = message.len();

    client
        .publish(topic, message)
        .await
        .map_err(|e| format!("Publish to '{}' failed: {}", topic, e))?;

    println!("Published {} bytes to '{}'", bytes, topic);
    Ok(())
}
