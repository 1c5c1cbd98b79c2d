//! Connection - one remote peer reachable over its bus topic.
//!
//! Lifecycle:
//!   1. created by the pool when the peer sends `connect`
//!   2. `call(method, args)` - publish `invoke`, wait for `response` or deadline
//!   3. `handle_invocation(envelope)` - run a per-peer handler, publish the reply
//!   4. `handle_response(envelope)` - resolve the matching pending call
//!   5. `disconnect()` - resolve everything pending with `NoAnswer`
//!
//! The "connected" flag and the pending table share one lock: once a
//! connection is disconnected no call can be registered on it and every
//! call that was registered has already been resolved.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{oneshot, RwLock};

use crate::bus::MessageBus;
use crate::envelope::{Ack, CorrelationId, Envelope, Outbound, PeerId};
use crate::error::RpcError;
use crate::handler::{self, HandlerTable, MethodHandler};
use crate::pending::PendingTable;

/// Why a call resolved without an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoAnswer {
    /// The deadline elapsed first.
    TimedOut,
    /// The peer disconnected while the call was outstanding.
    Disconnected,
    /// The peer was not connected when the call was made; nothing was sent.
    NotConnected,
}

/// Outcome of a call to a single peer.
///
/// A peer that answers `null` yields `Answered(Value::Null)`, which is
/// distinct from every `NoAnswer` case.
#[derive(Debug, Clone, PartialEq)]
pub enum CallResult {
    Answered(serde_json::Value),
    NoAnswer(NoAnswer),
}

impl CallResult {
    /// The answer, or `None` for any no-answer outcome.
    pub fn answer(self) -> Option<serde_json::Value> {
        match self {
            CallResult::Answered(value) => Some(value),
            CallResult::NoAnswer(_) => None,
        }
    }
}

/// Everything needed to open a [`Connection`].
#[derive(Clone)]
pub struct ConnectionConfig {
    pub job_id: PeerId,
    /// Topic the peer subscribes to.
    pub topic: String,
    pub timeout: Duration,
    pub bus: Arc<dyn MessageBus>,
}

/// A connected peer.
pub struct Connection {
    job_id: PeerId,
    topic: String,
    timeout: Duration,
    bus: Arc<dyn MessageBus>,
    handlers: RwLock<HandlerTable>,
    pending: PendingTable<oneshot::Sender<CallResult>>,
    connected_at: DateTime<Utc>,
}

impl Connection {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            job_id: config.job_id,
            topic: config.topic,
            timeout: config.timeout,
            bus: config.bus,
            handlers: RwLock::new(HandlerTable::new()),
            pending: PendingTable::new(),
            connected_at: Utc::now(),
        }
    }

    pub fn job_id(&self) -> &PeerId {
        &self.job_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub async fn is_connected(&self) -> bool {
        !self.pending.is_closed().await
    }

    /// Number of calls still waiting for this peer.
    pub async fn pending_calls(&self) -> usize {
        self.pending.len().await
    }

    /// Register a method handler specific to this connection.
    pub async fn register_handler(
        &self,
        method: &str,
        handler: MethodHandler,
    ) -> Result<(), RpcError> {
        self.handlers.write().await.register(method, handler)
    }

    /// Registered per-peer method names.
    pub async fn methods(&self) -> Vec<String> {
        self.handlers.read().await.methods()
    }

    /// Call `method` on the peer and wait for its answer.
    ///
    /// Never fails for timeouts or disconnects; those resolve as
    /// [`CallResult::NoAnswer`]. Only a publish failure is an error.
    pub async fn call(
        &self,
        method: &str,
        args: serde_json::Value,
    ) -> Result<CallResult, RpcError> {
        let id = CorrelationId::new();
        let (tx, rx) = oneshot::channel();

        let registered = self
            .pending
            .insert(id.clone(), tx, self.timeout, |tx| {
                let _ = tx.send(CallResult::NoAnswer(NoAnswer::TimedOut));
                None
            })
            .await;
        if registered.is_err() {
            tracing::debug!(
                "[Connection:{}] Not connected, skipping call to {}",
                self.job_id,
                method
            );
            return Ok(CallResult::NoAnswer(NoAnswer::NotConnected));
        }

        let msg = Outbound::Invoke {
            id: id.clone(),
            method: method.to_string(),
            args,
            job_id: Some(self.job_id.clone()),
        };
        tracing::debug!("[Connection:{}] Invoke {} (id={})", self.job_id, method, id);

        if let Err(e) = self.bus.publish(&self.topic, msg.to_message()).await {
            tracing::error!("[Connection:{}] Publish of {} failed: {}", self.job_id, method, e);
            let _ = self.pending.take(&id).await;
            return Err(e.into());
        }

        // The sender only disappears without a value if the table is torn
        // down, which is a disconnect.
        Ok(rx
            .await
            .unwrap_or(CallResult::NoAnswer(NoAnswer::Disconnected)))
    }

    /// Run a per-peer handler for an `invoke` envelope from this peer.
    pub async fn handle_invocation(&self, envelope: &Envelope) -> Result<Ack, RpcError> {
        if !self.is_connected().await {
            return Err(RpcError::ConnectionInactive(self.job_id.clone()));
        }

        let method = envelope.require_method()?;
        let result = handler::invoke(&self.handlers, method, envelope.args.clone()).await?;

        if let Some(id) = &envelope.id {
            let reply_topic = envelope.reply_topic.as_deref().unwrap_or(&self.topic);
            let msg = Outbound::Response {
                id: id.clone(),
                result: result.clone(),
                job_id: Some(self.job_id.clone()),
            };
            self.bus.publish(reply_topic, msg.to_message()).await?;
        }

        Ok(Ack::with_result(result))
    }

    /// Resolve the pending call matching a `response` envelope.
    pub async fn handle_response(&self, envelope: &Envelope) -> Result<Ack, RpcError> {
        let id = envelope.require_id()?;
        let resolver = self
            .pending
            .take(id)
            .await
            .map_err(|_| RpcError::ConnectionInactive(self.job_id.clone()))?;

        match resolver {
            Some(tx) => {
                // The caller may have gone away; the call is resolved either way.
                let _ = tx.send(CallResult::Answered(envelope.result.clone()));
                Ok(Ack::ok())
            }
            None => {
                tracing::warn!("[Connection:{}] Response for unknown id {}", self.job_id, id);
                Err(RpcError::UnknownCorrelationId(id.clone()))
            }
        }
    }

    /// Mark the connection inactive and resolve every outstanding call with
    /// [`NoAnswer::Disconnected`]. Calling it again does nothing.
    pub async fn disconnect(&self) {
        let Some(outstanding) = self.pending.close().await else {
            return;
        };
        tracing::info!(
            "[Connection:{}] Disconnected ({} pending call(s) released)",
            self.job_id,
            outstanding.len()
        );
        for tx in outstanding {
            let _ = tx.send(CallResult::NoAnswer(NoAnswer::Disconnected));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;
    use crate::handler::handler_fn;
    use serde_json::json;

    type Fixture = (
        Arc<Connection>,
        Arc<MemoryBus>,
        tokio::sync::mpsc::UnboundedReceiver<crate::bus::Published>,
    );

    fn connection(timeout: Duration) -> Fixture {
        let (bus, rx) = MemoryBus::new();
        let bus = Arc::new(bus);
        let conn = Connection::new(ConnectionConfig {
            job_id: "job-a".into(),
            topic: "rpc-job-a".into(),
            timeout,
            bus: bus.clone(),
        });
        (Arc::new(conn), bus, rx)
    }

    fn response(id: &str, result: serde_json::Value) -> Envelope {
        Envelope::from_value(json!({
            "type": "response",
            "id": id,
            "result": result,
            "jobId": "job-a"
        }))
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_resolves_with_response() {
        let (conn, _bus, mut rx) = connection(Duration::from_secs(10));

        let caller = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.call("GetInfo", json!({ "verbose": true })).await })
        };

        let invoke = rx.recv().await.unwrap();
        assert_eq!(invoke.topic, "rpc-job-a");
        let body = invoke.json();
        assert_eq!(body["type"], "invoke");
        assert_eq!(body["method"], "GetInfo");
        assert_eq!(body["jobId"], "job-a");

        let id = body["id"].as_str().unwrap();
        let ack = conn.handle_response(&response(id, json!({ "players": 3 }))).await.unwrap();
        assert_eq!(ack, Ack::ok());

        let result = caller.await.unwrap().unwrap();
        assert_eq!(result, CallResult::Answered(json!({ "players": 3 })));

        let err = conn.handle_response(&response(id, json!(null))).await.unwrap_err();
        assert!(matches!(err, RpcError::UnknownCorrelationId(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_null_answer_is_not_a_timeout() {
        let (conn, _bus, mut rx) = connection(Duration::from_secs(10));
        let caller = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.call("Nothing", json!(null)).await })
        };
        let id = rx.recv().await.unwrap().json()["id"].as_str().unwrap().to_string();
        conn.handle_response(&response(&id, json!(null))).await.unwrap();

        assert_eq!(caller.await.unwrap().unwrap(), CallResult::Answered(json!(null)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_times_out() {
        let (conn, _bus, _rx) = connection(Duration::from_millis(250));
        let result = conn.call("Slow", json!({})).await.unwrap();
        assert_eq!(result, CallResult::NoAnswer(NoAnswer::TimedOut));
        assert_eq!(conn.pending_calls().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_after_timeout_is_unknown() {
        let (conn, _bus, mut rx) = connection(Duration::from_millis(250));
        let result = conn.call("Slow", json!({})).await.unwrap();
        assert_eq!(result, CallResult::NoAnswer(NoAnswer::TimedOut));

        let id = rx.recv().await.unwrap().json()["id"].as_str().unwrap().to_string();
        let err = conn.handle_response(&response(&id, json!(1))).await.unwrap_err();
        assert!(matches!(err, RpcError::UnknownCorrelationId(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_failure_propagates_and_cleans_up() {
        let (conn, bus, _rx) = connection(Duration::from_secs(10));
        bus.set_failing(true);

        let err = conn.call("Anything", json!({})).await.unwrap_err();
        assert!(matches!(err, RpcError::Transport(_)));
        assert_eq!(conn.pending_calls().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_releases_pending_calls() {
        let (conn, _bus, mut rx) = connection(Duration::from_secs(60));

        let mut callers = Vec::new();
        for i in 0..3 {
            let conn = conn.clone();
            callers.push(tokio::spawn(async move { conn.call("Wait", json!(i)).await }));
        }
        for _ in 0..3 {
            rx.recv().await.unwrap();
        }
        assert_eq!(conn.pending_calls().await, 3);

        conn.disconnect().await;
        for caller in callers {
            assert_eq!(
                caller.await.unwrap().unwrap(),
                CallResult::NoAnswer(NoAnswer::Disconnected)
            );
        }

        assert!(!conn.is_connected().await);
        conn.disconnect().await;

        let result = conn.call("Wait", json!(0)).await.unwrap();
        assert_eq!(result, CallResult::NoAnswer(NoAnswer::NotConnected));

        let err = conn.handle_response(&response("whatever", json!(1))).await.unwrap_err();
        assert!(matches!(err, RpcError::ConnectionInactive(_)));
    }

    #[tokio::test]
    async fn test_handle_invocation_replies_on_reply_topic() {
        let (conn, _bus, mut rx) = connection(Duration::from_secs(10));
        conn.register_handler("Echo", handler_fn(|args| async move { Ok(args) }))
            .await
            .unwrap();

        let envelope = Envelope::from_value(json!({
            "type": "invoke",
            "id": "inv-1",
            "method": "Echo",
            "args": { "x": 1 },
            "jobId": "job-a",
            "replyTopic": "replies"
        }))
        .unwrap();

        let ack = conn.handle_invocation(&envelope).await.unwrap();
        assert_eq!(ack, Ack::with_result(json!({ "x": 1 })));

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.topic, "replies");
        assert_eq!(
            reply.json(),
            json!({ "type": "response", "id": "inv-1", "result": { "x": 1 }, "jobId": "job-a" })
        );
    }

    #[tokio::test]
    async fn test_handle_invocation_without_id_does_not_reply() {
        let (conn, bus, _rx) = connection(Duration::from_secs(10));
        conn.register_handler("Log", handler_fn(|_| async { Ok(json!("logged")) }))
            .await
            .unwrap();

        let envelope =
            Envelope::from_value(json!({ "type": "invoke", "method": "Log", "jobId": "job-a" }))
                .unwrap();
        let ack = conn.handle_invocation(&envelope).await.unwrap();
        assert_eq!(ack.result, Some(json!("logged")));
        assert!(bus.published().is_empty());
    }

    #[tokio::test]
    async fn test_handle_invocation_errors() {
        let (conn, _bus, _rx) = connection(Duration::from_secs(10));
        conn.register_handler("Fail", handler_fn(|_| async { Err("boom".to_string()) }))
            .await
            .unwrap();

        let unknown =
            Envelope::from_value(json!({ "type": "invoke", "method": "Nope", "jobId": "job-a" }))
                .unwrap();
        assert!(matches!(
            conn.handle_invocation(&unknown).await.unwrap_err(),
            RpcError::UnknownMethod(_)
        ));

        let failing =
            Envelope::from_value(json!({ "type": "invoke", "method": "Fail", "jobId": "job-a" }))
                .unwrap();
        assert!(matches!(
            conn.handle_invocation(&failing).await.unwrap_err(),
            RpcError::HandlerFailed { .. }
        ));

        conn.disconnect().await;
        assert!(matches!(
            conn.handle_invocation(&failing).await.unwrap_err(),
            RpcError::ConnectionInactive(_)
        ));
    }
}
