//! RpcService - routes bus traffic between peers, connections and the
//! global scope.
//!
//! `RpcService` owns the global handler table, the global (fan-out) pending
//! calls and the connection pool. Every inbound message goes through
//! [`RpcService::handle_rpc_body`]; every outbound call goes through
//! [`RpcService::call`] (or its typed variants `call_peer` / `call_all`).
//!
//! # Fan-out calls
//!
//! A call without a target is published once on the shared topic. The set
//! of peers connected at that instant is the expected set; peers that
//! connect later are not waited for, peers that disconnect later simply
//! never answer. The call resolves as soon as every expected peer has
//! answered, or at the deadline with whatever arrived. A short result is
//! not an error.
//!
//! A resolved fan-out leaves a settled marker in the pending table until its
//! deadline (or for one more timeout period when the deadline resolved it).
//! Answers that reach a settled call are acknowledged and dropped.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{oneshot, RwLock};

use crate::bus::MessageBus;
use crate::config::RpcConfig;
use crate::connection::{CallResult, ConnectionConfig, NoAnswer};
use crate::envelope::{Ack, CorrelationId, Envelope, EnvelopeKind, Outbound, PeerId};
use crate::error::RpcError;
use crate::handler::{self, HandlerTable, MethodHandler};
use crate::pending::{PendingTable, Step};
use crate::pool::ConnectionPool;

// ─── Results ────────────────────────────────────────────────────────────

/// One peer's contribution to a fan-out call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerResponse {
    pub job_id: PeerId,
    pub response: serde_json::Value,
}

/// Aggregated fan-out result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FanOutResult {
    /// Answers in arrival order.
    pub responses: Vec<PeerResponse>,
    /// Expected peers that did not answer before the deadline, sorted.
    pub missing: Vec<PeerId>,
}

impl FanOutResult {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn get(&self, job_id: &str) -> Option<&serde_json::Value> {
        self.responses
            .iter()
            .find(|r| r.job_id == job_id)
            .map(|r| &r.response)
    }
}

/// What [`RpcService::call`] resolved with.
#[derive(Debug, Clone, PartialEq)]
pub enum CallReply {
    Peer(CallResult),
    FanOut(FanOutResult),
}

// ─── Fan-out bookkeeping ────────────────────────────────────────────────

enum Recorded {
    Accepted,
    Duplicate,
    Unexpected,
    Anonymous,
    Late,
}

/// Entry in the global pending table.
enum FanOutSlot {
    Open(FanOut),
    /// Already resolved; absorbs late and redelivered answers.
    Settled,
}

struct FanOut {
    expected: HashSet<PeerId>,
    responses: Vec<PeerResponse>,
    tx: oneshot::Sender<FanOutResult>,
}

impl FanOut {
    fn record(&mut self, job_id: &PeerId, response: serde_json::Value) -> Recorded {
        if !self.expected.contains(job_id) {
            return Recorded::Unexpected;
        }
        // At-least-once delivery: the first answer from a peer wins.
        if self.responses.iter().any(|r| &r.job_id == job_id) {
            return Recorded::Duplicate;
        }
        self.responses.push(PeerResponse {
            job_id: job_id.clone(),
            response,
        });
        Recorded::Accepted
    }

    fn is_complete(&self) -> bool {
        self.responses.len() == self.expected.len()
    }

    fn finish(self) {
        let mut missing: Vec<PeerId> = self
            .expected
            .into_iter()
            .filter(|id| !self.responses.iter().any(|r| &r.job_id == id))
            .collect();
        missing.sort();
        let _ = self.tx.send(FanOutResult {
            responses: self.responses,
            missing,
        });
    }
}

// ─── Service ────────────────────────────────────────────────────────────

/// Top-level RPC engine. Share it as `Arc<RpcService>`.
pub struct RpcService {
    bus: Arc<dyn MessageBus>,
    config: RpcConfig,
    global_handlers: RwLock<HandlerTable>,
    global_pending: PendingTable<FanOutSlot>,
    pool: ConnectionPool,
}

impl RpcService {
    pub fn new(bus: Arc<dyn MessageBus>, config: RpcConfig) -> Self {
        Self {
            bus,
            config,
            global_handlers: RwLock::new(HandlerTable::new()),
            global_pending: PendingTable::new(),
            pool: ConnectionPool::new(),
        }
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Fan-out calls still waiting for answers.
    pub async fn pending_fan_outs(&self) -> usize {
        self.global_pending
            .count_where(|slot| matches!(slot, FanOutSlot::Open(_)))
            .await
    }

    /// Global method names, sorted.
    pub async fn global_methods(&self) -> Vec<String> {
        self.global_handlers.read().await.methods()
    }

    // ── Registration ──

    /// Register `handler` globally, or on the connection for `job_id`.
    ///
    /// Per-peer handlers live on the connection and are dropped when the
    /// peer reconnects.
    pub async fn register_handler(
        &self,
        method: &str,
        handler: MethodHandler,
        job_id: Option<&str>,
    ) -> Result<(), RpcError> {
        match job_id {
            Some(job_id) => {
                let conn = self
                    .pool
                    .get(job_id)
                    .await
                    .ok_or_else(|| RpcError::UnknownPeer(job_id.to_string()))?;
                conn.register_handler(method, handler).await
            }
            None => self.global_handlers.write().await.register(method, handler),
        }
    }

    /// Register a prepared `method → handler` mapping in the global scope.
    pub async fn register_handlers<I>(&self, handlers: I) -> Result<(), RpcError>
    where
        I: IntoIterator<Item = (String, MethodHandler)>,
    {
        let mut table = self.global_handlers.write().await;
        for (method, handler) in handlers {
            table.register(&method, handler)?;
        }
        Ok(())
    }

    // ── Outbound calls ──

    /// Call one peer (`job_id = Some`) or every connected peer (`None`).
    pub async fn call(
        &self,
        method: &str,
        args: serde_json::Value,
        job_id: Option<&str>,
    ) -> Result<CallReply, RpcError> {
        match job_id {
            Some(job_id) => self.call_peer(job_id, method, args).await.map(CallReply::Peer),
            None => self.call_all(method, args).await.map(CallReply::FanOut),
        }
    }

    /// Call `method` on one peer. An unknown peer resolves immediately with
    /// [`NoAnswer::NotConnected`] and nothing is published.
    pub async fn call_peer(
        &self,
        job_id: &str,
        method: &str,
        args: serde_json::Value,
    ) -> Result<CallResult, RpcError> {
        match self.pool.get(job_id).await {
            Some(conn) => conn.call(method, args).await,
            None => {
                tracing::debug!("[RpcService] Call {} to unknown peer {}", method, job_id);
                Ok(CallResult::NoAnswer(NoAnswer::NotConnected))
            }
        }
    }

    /// Call `method` on every peer connected right now and collect answers.
    ///
    /// The invoke is published even when no peer is connected; the call then
    /// resolves at once with an empty result.
    pub async fn call_all(
        &self,
        method: &str,
        args: serde_json::Value,
    ) -> Result<FanOutResult, RpcError> {
        let expected: HashSet<PeerId> = self.pool.peer_ids().await.into_iter().collect();
        let id = CorrelationId::new();
        let peer_count = expected.len();
        let msg = Outbound::Invoke {
            id: id.clone(),
            method: method.to_string(),
            args,
            job_id: None,
        };

        if expected.is_empty() {
            tracing::debug!("[RpcService] Fan-out {} (id={}) with no peers connected", method, id);
            if let Err(e) = self.bus.publish(&self.config.default_topic, msg.to_message()).await {
                tracing::error!("[RpcService] Publish of fan-out {} failed: {}", method, e);
                return Err(e.into());
            }
            return Ok(FanOutResult::default());
        }

        let (tx, rx) = oneshot::channel();
        let fan_out = FanOut {
            expected,
            responses: Vec::new(),
            tx,
        };

        let expire_id = id.clone();
        // The global table is never closed, so registration always succeeds.
        let _ = self
            .global_pending
            .insert(
                id.clone(),
                FanOutSlot::Open(fan_out),
                self.config.default_timeout,
                move |slot| match slot {
                    FanOutSlot::Open(fan_out) => {
                        tracing::debug!(
                            "[RpcService] Fan-out {} deadline: {}/{} answered",
                            expire_id,
                            fan_out.responses.len(),
                            fan_out.expected.len()
                        );
                        fan_out.finish();
                        Some(FanOutSlot::Settled)
                    }
                    FanOutSlot::Settled => None,
                },
            )
            .await;

        tracing::debug!(
            "[RpcService] Fan-out {} to {} peer(s) (id={})",
            method,
            peer_count,
            id
        );

        if let Err(e) = self.bus.publish(&self.config.default_topic, msg.to_message()).await {
            tracing::error!("[RpcService] Publish of fan-out {} failed: {}", method, e);
            let _ = self.global_pending.take(&id).await;
            return Err(e.into());
        }

        Ok(rx.await.unwrap_or_default())
    }

    // ── Inbound dispatch ──

    /// Entry point for every message delivered by the bus.
    pub async fn handle_rpc_body(&self, body: serde_json::Value) -> Result<Ack, RpcError> {
        let envelope = Envelope::from_value(body).map_err(|e| {
            tracing::warn!("[RpcService] Rejected inbound message: {}", e);
            e
        })?;
        self.handle_envelope(envelope).await
    }

    pub async fn handle_envelope(&self, envelope: Envelope) -> Result<Ack, RpcError> {
        let kind = envelope.kind;
        let result = match kind {
            EnvelopeKind::Connect => self.on_connect(&envelope).await,
            EnvelopeKind::Disconnect => self.on_disconnect(&envelope).await,
            EnvelopeKind::Invoke => self.on_invoke(&envelope).await,
            EnvelopeKind::Response => self.on_response(&envelope).await,
            EnvelopeKind::Unknown => Err(RpcError::InvalidPayload("Unknown envelope type".into())),
        };

        if let Err(e) = &result {
            tracing::warn!(
                "[RpcService] {:?} envelope from {} failed: {}",
                kind,
                envelope.job_id.as_deref().unwrap_or("<global>"),
                e
            );
        }
        result
    }

    async fn on_connect(&self, envelope: &Envelope) -> Result<Ack, RpcError> {
        let job_id = envelope.require_job_id()?;
        let topic = envelope
            .topic
            .clone()
            .unwrap_or_else(|| self.config.peer_topic(job_id));

        self.pool
            .connect(ConnectionConfig {
                job_id: job_id.clone(),
                topic,
                timeout: self.config.default_timeout,
                bus: self.bus.clone(),
            })
            .await;
        Ok(Ack::connected())
    }

    async fn on_disconnect(&self, envelope: &Envelope) -> Result<Ack, RpcError> {
        let job_id = envelope.require_job_id()?;
        self.pool.disconnect(job_id).await;
        Ok(Ack::disconnected())
    }

    async fn on_invoke(&self, envelope: &Envelope) -> Result<Ack, RpcError> {
        if let Some(job_id) = &envelope.job_id {
            let conn = self
                .pool
                .get(job_id)
                .await
                .ok_or_else(|| RpcError::UnknownPeer(job_id.clone()))?;
            return conn.handle_invocation(envelope).await;
        }

        let method = envelope.require_method()?;
        let result = handler::invoke(&self.global_handlers, method, envelope.args.clone()).await?;

        if let Some(id) = &envelope.id {
            let reply_topic = envelope
                .reply_topic
                .as_deref()
                .unwrap_or(&self.config.default_topic);
            let msg = Outbound::Response {
                id: id.clone(),
                result: result.clone(),
                job_id: None,
            };
            self.bus.publish(reply_topic, msg.to_message()).await?;
        }

        Ok(Ack::with_result(result))
    }

    async fn on_response(&self, envelope: &Envelope) -> Result<Ack, RpcError> {
        let id = envelope.require_id()?;

        if let Some(ack) = self.record_fan_out_response(id, envelope).await? {
            return Ok(ack);
        }

        let job_id = envelope
            .job_id
            .as_ref()
            .ok_or_else(|| RpcError::UnknownCorrelationId(id.clone()))?;
        let conn = self
            .pool
            .get(job_id)
            .await
            .ok_or_else(|| RpcError::UnknownPeer(job_id.clone()))?;
        conn.handle_response(envelope).await
    }

    /// Record a peer's answer to a fan-out call. `Ok(None)` means `id` is not
    /// a known fan-out call.
    async fn record_fan_out_response(
        &self,
        id: &CorrelationId,
        envelope: &Envelope,
    ) -> Result<Option<Ack>, RpcError> {
        let mut recorded = Recorded::Anonymous;
        let mut completed = false;
        let known = self
            .global_pending
            .advance(id, |slot| {
                let FanOutSlot::Open(fan_out) = slot else {
                    recorded = Recorded::Late;
                    return Step::Pending;
                };
                let Some(job_id) = &envelope.job_id else {
                    return Step::Pending;
                };
                recorded = fan_out.record(job_id, envelope.result.clone());
                if fan_out.is_complete() {
                    // Resolve now, keep the id around for stragglers.
                    let settled = std::mem::replace(slot, FanOutSlot::Settled);
                    if let FanOutSlot::Open(fan_out) = settled {
                        fan_out.finish();
                    }
                    completed = true;
                }
                Step::Pending
            })
            .await;

        if known.is_none() {
            return Ok(None);
        }
        if completed {
            tracing::debug!("[RpcService] Fan-out {} complete", id);
        }

        let from = envelope.job_id.as_deref().unwrap_or("<global>");
        match recorded {
            Recorded::Accepted => {}
            Recorded::Duplicate => {
                tracing::debug!("[RpcService] Duplicate fan-out answer from {} for {}", from, id);
            }
            Recorded::Late => {
                tracing::debug!("[RpcService] Late fan-out answer from {} for {}", from, id);
            }
            Recorded::Unexpected => {
                tracing::warn!("[RpcService] Fan-out {} answered by unexpected peer {}", id, from);
            }
            Recorded::Anonymous => {
                return Err(RpcError::InvalidPayload(format!(
                    "Response to fan-out call {} is missing jobId",
                    id
                )));
            }
        }
        Ok(Some(Ack::ok()))
    }
}
