//! Registry of connected peers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::connection::{Connection, ConnectionConfig};
use crate::envelope::PeerId;

/// Snapshot of one connection for listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub job_id: PeerId,
    pub topic: String,
    pub connected_at: DateTime<Utc>,
    pub pending_calls: usize,
    pub methods: Vec<String>,
}

/// Owns every [`Connection`], keyed by job id.
#[derive(Default)]
pub struct ConnectionPool {
    connections: RwLock<HashMap<PeerId, Arc<Connection>>>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a connection for `config.job_id`.
    ///
    /// A reconnect replaces the previous connection outright. The replaced
    /// one is not disconnected: its outstanding calls run out their own
    /// deadlines.
    pub async fn connect(&self, config: ConnectionConfig) -> Arc<Connection> {
        let job_id = config.job_id.clone();
        let conn = Arc::new(Connection::new(config));

        let replaced = self
            .connections
            .write()
            .await
            .insert(job_id.clone(), conn.clone());

        if replaced.is_some() {
            tracing::warn!("[ConnectionPool] {} reconnected, previous connection replaced", job_id);
        } else {
            tracing::info!("[ConnectionPool] {} connected on {}", job_id, conn.topic());
        }
        conn
    }

    /// Disconnect and forget `job_id`. Returns whether it was connected.
    pub async fn disconnect(&self, job_id: &str) -> bool {
        let removed = self.connections.write().await.remove(job_id);
        match removed {
            Some(conn) => {
                conn.disconnect().await;
                true
            }
            None => {
                tracing::debug!("[ConnectionPool] Disconnect for unknown peer {}", job_id);
                false
            }
        }
    }

    pub async fn get(&self, job_id: &str) -> Option<Arc<Connection>> {
        self.connections.read().await.get(job_id).cloned()
    }

    pub async fn is_connected(&self, job_id: &str) -> bool {
        self.connections.read().await.contains_key(job_id)
    }

    pub async fn all(&self) -> Vec<(PeerId, Arc<Connection>)> {
        self.connections
            .read()
            .await
            .iter()
            .map(|(id, conn)| (id.clone(), conn.clone()))
            .collect()
    }

    /// Point-in-time set of connected peer ids.
    pub async fn peer_ids(&self) -> Vec<PeerId> {
        self.connections.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Listing of every connection, sorted by job id.
    pub async fn peers(&self) -> Vec<PeerInfo> {
        let mut peers = Vec::new();
        for (job_id, conn) in self.all().await {
            peers.push(PeerInfo {
                job_id,
                topic: conn.topic().to_string(),
                connected_at: conn.connected_at(),
                pending_calls: conn.pending_calls().await,
                methods: conn.methods().await,
            });
        }
        peers.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        peers
    }
}
