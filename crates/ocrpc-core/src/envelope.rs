//! Wire envelopes exchanged over the message bus.
//!
//! Inbound messages are JSON objects tagged by `type`. The peer id always
//! travels in the top-level `jobId` field, never inside `result`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RpcError;

/// Identifier of a remote peer (the game server's job id).
pub type PeerId = String;

/// Opaque token pairing one outbound `invoke` with its `response`.
///
/// Locally minted ids are UUID v4 strings; ids minted by peers are accepted
/// verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CorrelationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `type` discriminator of an inbound envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    Connect,
    Disconnect,
    Invoke,
    Response,
    /// Anything else; rejected by the dispatcher.
    #[serde(other)]
    Unknown,
}

/// An inbound bus message, as delivered by the webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    /// Peer id. Absent means "global".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<PeerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CorrelationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_topic: Option<String>,
    #[serde(default)]
    pub result: serde_json::Value,
    /// Topic override carried by `connect` envelopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

impl Envelope {
    /// Parse a raw JSON body. Anything that is not a well-formed envelope
    /// is an `InvalidPayload`.
    pub fn from_value(value: serde_json::Value) -> Result<Self, RpcError> {
        serde_json::from_value(value)
            .map_err(|e| RpcError::InvalidPayload(format!("Malformed envelope: {}", e)))
    }

    pub fn require_job_id(&self) -> Result<&PeerId, RpcError> {
        self.job_id.as_ref().ok_or_else(|| {
            RpcError::InvalidPayload(format!("'{:?}' envelope requires jobId", self.kind))
        })
    }

    pub fn require_method(&self) -> Result<&str, RpcError> {
        self.method
            .as_deref()
            .ok_or_else(|| RpcError::InvalidPayload("invoke envelope requires method".into()))
    }

    pub fn require_id(&self) -> Result<&CorrelationId, RpcError> {
        self.id
            .as_ref()
            .ok_or_else(|| RpcError::InvalidPayload("response envelope requires id".into()))
    }
}

/// An outbound bus message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Outbound {
    #[serde(rename_all = "camelCase")]
    Invoke {
        id: CorrelationId,
        method: String,
        args: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        job_id: Option<PeerId>,
    },
    #[serde(rename_all = "camelCase")]
    Response {
        id: CorrelationId,
        result: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        job_id: Option<PeerId>,
    },
}

impl Outbound {
    /// Serialize to the JSON text that goes into the bus message.
    pub fn to_message(&self) -> String {
        // A tagged enum of strings and `Value`s cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Status returned to the delivery layer for a handled envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Ok,
    Connected,
    Disconnected,
}

/// Synchronous outcome of handling one inbound envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub status: AckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl Ack {
    pub fn ok() -> Self {
        Self { status: AckStatus::Ok, result: None }
    }

    pub fn with_result(result: serde_json::Value) -> Self {
        Self { status: AckStatus::Ok, result: Some(result) }
    }

    pub fn connected() -> Self {
        Self { status: AckStatus::Connected, result: None }
    }

    pub fn disconnected() -> Self {
        Self { status: AckStatus::Disconnected, result: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_invoke_envelope() {
        let env = Envelope::from_value(json!({
            "type": "invoke",
            "id": "abc",
            "method": "GetPlayers",
            "args": { "limit": 5 },
            "jobId": "job-1",
            "replyTopic": "rpc-reply"
        }))
        .unwrap();

        assert_eq!(env.kind, EnvelopeKind::Invoke);
        assert_eq!(env.id, Some(CorrelationId::from("abc")));
        assert_eq!(env.job_id.as_deref(), Some("job-1"));
        assert_eq!(env.reply_topic.as_deref(), Some("rpc-reply"));
        assert_eq!(env.args["limit"], 5);
    }

    #[test]
    fn test_unknown_type_parses_as_unknown() {
        let env = Envelope::from_value(json!({ "type": "subscribe" })).unwrap();
        assert_eq!(env.kind, EnvelopeKind::Unknown);
    }

    #[test]
    fn test_missing_type_is_invalid_payload() {
        let err = Envelope::from_value(json!({ "id": "x" })).unwrap_err();
        assert!(matches!(err, RpcError::InvalidPayload(_)));
    }

    #[test]
    fn test_outbound_invoke_wire_shape() {
        let msg = Outbound::Invoke {
            id: CorrelationId::from("c1"),
            method: "Kick".into(),
            args: json!({ "userId": 7 }),
            job_id: Some("job-9".into()),
        };
        let value: serde_json::Value = serde_json::from_str(&msg.to_message()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "invoke",
                "id": "c1",
                "method": "Kick",
                "args": { "userId": 7 },
                "jobId": "job-9"
            })
        );
    }

    #[test]
    fn test_outbound_response_omits_absent_job_id() {
        let msg = Outbound::Response {
            id: CorrelationId::from("c2"),
            result: json!(null),
            job_id: None,
        };
        let value: serde_json::Value = serde_json::from_str(&msg.to_message()).unwrap();
        assert_eq!(value, json!({ "type": "response", "id": "c2", "result": null }));
    }

    #[test]
    fn test_minted_ids_are_unique() {
        assert_ne!(CorrelationId::new(), CorrelationId::new());
    }
}
