//! The outbound side of the message bus.
//!
//! The engine only ever calls `publish`. The concrete client is passed in
//! explicitly (`Arc<dyn MessageBus>`), so tests and embedders can swap in
//! [`MemoryBus`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Publishing a message failed. Propagated to the caller, never retried.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Publish request failed: {0}")]
    Request(String),

    #[error("Publish rejected with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Transport closed")]
    Closed,
}

/// Fire-and-forget publisher. Delivery is at-least-once and unordered, and
/// nothing is acknowledged back.
#[async_trait]
pub trait MessageBus: Send + Sync + 'static {
    async fn publish(&self, topic: &str, message: String) -> Result<(), TransportError>;
}

/// One message handed to [`MemoryBus::publish`].
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub topic: String,
    pub message: String,
}

impl Published {
    /// Parse the message body back into JSON.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.message).unwrap_or(serde_json::Value::Null)
    }
}

/// In-process bus: keeps a log of every publish and forwards each one to a
/// channel so a simulated peer can react to it.
pub struct MemoryBus {
    log: Mutex<Vec<Published>>,
    tx: mpsc::UnboundedSender<Published>,
    failing: AtomicBool,
}

impl MemoryBus {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Published>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let bus = Self {
            log: Mutex::new(Vec::new()),
            tx,
            failing: AtomicBool::new(false),
        };
        (bus, rx)
    }

    /// Make subsequent publishes fail with `TransportError::Closed`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of everything published so far, in publish order.
    pub fn published(&self) -> Vec<Published> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, topic: &str, message: String) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let published = Published {
            topic: topic.to_string(),
            message,
        };
        if let Ok(mut log) = self.log.lock() {
            log.push(published.clone());
        }
        // Nobody listening is fine; the log still has it.
        let _ = self.tx.send(published);
        Ok(())
    }
}
