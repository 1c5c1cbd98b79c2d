//! Roblox Open Cloud messaging client.
//!
//! Implements [`MessageBus`] by calling the `publishMessage` endpoint of the
//! universe's MessagingService.

use std::time::Duration;

use async_trait::async_trait;
use ocrpc_core::{MessageBus, TransportError};

/// Credentials and endpoint for Open Cloud.
#[derive(Debug, Clone)]
pub struct OpenCloudConfig {
    pub universe_id: String,
    pub api_key: String,
    /// Override for tests and proxies.
    pub base_url: String,
}

impl Default for OpenCloudConfig {
    fn default() -> Self {
        Self {
            universe_id: String::new(),
            api_key: String::new(),
            base_url: "https://apis.roblox.com".to_string(),
        }
    }
}

/// Publishes bus messages through Open Cloud.
pub struct OpenCloudClient {
    http: reqwest::Client,
    config: OpenCloudConfig,
}

impl OpenCloudClient {
    pub fn new(config: OpenCloudConfig) -> Result<Self, String> {
        if config.universe_id.is_empty() {
            return Err("Open Cloud universe id is not set (UNIVERSE_ID)".to_string());
        }
        if config.api_key.is_empty() {
            return Err("Open Cloud API key is not set (ROBLOX_API_KEY)".to_string());
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

        Ok(Self { http, config })
    }

    pub fn publish_url(&self) -> String {
        format!(
            "{}/cloud/v2/universes/{}:publishMessage",
            self.config.base_url.trim_end_matches('/'),
            self.config.universe_id
        )
    }
}

#[async_trait]
impl MessageBus for OpenCloudClient {
    async fn publish(&self, topic: &str, message: String) -> Result<(), TransportError> {
        let response = self
            .http
            .post(self.publish_url())
            .header("x-api-key", &self.config.api_key)
            .json(&serde_json::json!({ "topic": topic, "message": message }))
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                "[OpenCloud] publishMessage to '{}' failed: {} {}",
                topic,
                status,
                body
            );
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!("[OpenCloud] Published to '{}'", topic);
        Ok(())
    }
}
