//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for an [`RpcService`](crate::RpcService).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcConfig {
    /// Shared topic for fan-out invokes and global replies.
    pub default_topic: String,
    /// Deadline applied to every outbound call.
    #[serde(with = "duration_ms")]
    pub default_timeout: Duration,
    /// Peer topics are `"{peer_topic_prefix}-{jobId}"` unless the `connect`
    /// envelope names one.
    pub peer_topic_prefix: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            default_topic: "rpc-global".to_string(),
            default_timeout: Duration::from_millis(10_000),
            peer_topic_prefix: "rpc".to_string(),
        }
    }
}

impl RpcConfig {
    pub fn peer_topic(&self, job_id: &str) -> String {
        format!("{}-{}", self.peer_topic_prefix, job_id)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RpcConfig::default();
        assert_eq!(config.default_topic, "rpc-global");
        assert_eq!(config.default_timeout, Duration::from_secs(10));
        assert_eq!(config.peer_topic("job-42"), "rpc-job-42");
    }

    #[test]
    fn test_timeout_serializes_as_millis() {
        let value = serde_json::to_value(RpcConfig::default()).unwrap();
        assert_eq!(value["defaultTimeout"], 10_000);
        let back: RpcConfig = serde_json::from_value(value).unwrap();
        assert_eq!(back.default_timeout, Duration::from_secs(10));
    }
}
