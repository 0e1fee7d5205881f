//! Peer presence registry and transient signaling buffers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::models::{CapabilityUpdate, LocationUpdate, Peer};
use crate::store::PeerStore;

/// Partial stats report from a peer or gateway.
#[derive(Debug, Clone, Default)]
pub struct StatsUpdate {
    /// Current bandwidth in Mbps, when measured
    pub bandwidth: Option<f64>,
    /// Current latency in ms, when measured
    pub latency: Option<f64>,
    /// Bytes shared since the last report
    pub data_shared: u64,
    /// Bytes consumed since the last report
    pub data_consumed: u64,
}

/// Peer presence and capability bookkeeping.
///
/// Presence is purely event-driven: `register` marks a peer online,
/// `unregister` marks it offline. There is no staleness timeout; `last_seen`
/// is refreshed on every touch so an external janitor could evict.
pub struct PeerService {
    peers: Arc<dyn PeerStore>,
    signaling: SignalingRegistry,
}

impl PeerService {
    pub fn new(peers: Arc<dyn PeerStore>) -> Self {
        Self {
            peers,
            signaling: SignalingRegistry::new(),
        }
    }

    /// Upsert a peer. Existing peers keep every capability/location field
    /// the update leaves unset; new peers start from defaults overridden by
    /// the supplied fields.
    pub async fn register(
        &self,
        peer_id: &str,
        wallet_address: &str,
        capabilities: CapabilityUpdate,
        location: LocationUpdate,
    ) -> Result<Peer> {
        let caps = capabilities.clone();
        let loc = location.clone();
        let wallet = wallet_address.to_string();

        let updated = self
            .peers
            .update(
                peer_id,
                Box::new(move |peer| {
                    peer.is_online = true;
                    peer.last_seen = Utc::now();
                    peer.wallet_address = wallet;
                    caps.apply(&mut peer.capabilities);
                    loc.apply(&mut peer.location);
                    Ok(())
                }),
            )
            .await?;

        let peer = match updated {
            Some(peer) => peer,
            None => {
                let mut peer = Peer::new(peer_id.to_string(), wallet_address.to_string());
                peer.is_online = true;
                capabilities.apply(&mut peer.capabilities);
                location.apply(&mut peer.location);
                self.peers.insert(peer.clone()).await?;
                peer
            }
        };

        info!(peer_id, "peer registered");
        Ok(peer)
    }

    /// Mark a peer offline and release its transient signaling buffers.
    /// Unknown peers are a no-op.
    pub async fn unregister(&self, peer_id: &str) -> Result<()> {
        self.peers
            .update(
                peer_id,
                Box::new(|peer| {
                    peer.is_online = false;
                    peer.last_seen = Utc::now();
                    Ok(())
                }),
            )
            .await?;

        self.signaling.clear(peer_id).await;
        info!(peer_id, "peer disconnected");
        Ok(())
    }

    /// Record a stats report: sets current bandwidth/latency when supplied,
    /// refreshes `last_seen`, and adds transfer deltas to the monotonic
    /// totals.
    pub async fn update_stats(&self, peer_id: &str, stats: StatsUpdate) -> Result<Peer> {
        self.peers
            .update(
                peer_id,
                Box::new(move |peer| {
                    if let Some(bandwidth) = stats.bandwidth {
                        peer.capabilities.bandwidth = bandwidth;
                    }
                    if let Some(latency) = stats.latency {
                        peer.capabilities.latency = latency;
                    }
                    peer.total_data_shared += stats.data_shared;
                    peer.total_data_consumed += stats.data_consumed;
                    peer.last_seen = Utc::now();
                    Ok(())
                }),
            )
            .await?
            .ok_or_else(|| AppError::PeerNotFound(peer_id.to_string()))
    }

    pub async fn get(&self, peer_id: &str) -> Result<Peer> {
        self.peers
            .get(peer_id)
            .await?
            .ok_or_else(|| AppError::PeerNotFound(peer_id.to_string()))
    }

    pub async fn list_online(&self) -> Result<Vec<Peer>> {
        self.peers.list_online().await
    }

    pub fn signaling(&self) -> &SignalingRegistry {
        &self.signaling
    }
}

/// A buffered WebRTC signaling payload.
#[derive(Debug, Clone, Serialize)]
pub struct SignalingEnvelope {
    pub from_peer: String,
    pub payload: serde_json::Value,
    pub timestamp: chrono::DateTime<Utc>,
}

/// Pending offers and answers for one peer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SignalingData {
    pub offers: Vec<SignalingEnvelope>,
    pub answers: Vec<SignalingEnvelope>,
}

/// Per-peer offer/answer buffers for connection signaling.
///
/// Ephemeral process state, never persisted: buffers exist between a
/// relay write and the target peer draining them, and are dropped when the
/// peer unregisters. Constructed per process (owned by [`PeerService`]) so
/// independent instances can coexist in tests.
#[derive(Default)]
pub struct SignalingRegistry {
    buffers: RwLock<HashMap<String, SignalingData>>,
}

impl SignalingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_offer(&self, from_peer: &str, to_peer: &str, payload: serde_json::Value) {
        let mut buffers = self.buffers.write().await;
        buffers
            .entry(to_peer.to_string())
            .or_default()
            .offers
            .push(SignalingEnvelope {
                from_peer: from_peer.to_string(),
                payload,
                timestamp: Utc::now(),
            });
        debug!(from_peer, to_peer, "buffered signaling offer");
    }

    pub async fn add_answer(&self, from_peer: &str, to_peer: &str, payload: serde_json::Value) {
        let mut buffers = self.buffers.write().await;
        buffers
            .entry(to_peer.to_string())
            .or_default()
            .answers
            .push(SignalingEnvelope {
                from_peer: from_peer.to_string(),
                payload,
                timestamp: Utc::now(),
            });
        debug!(from_peer, to_peer, "buffered signaling answer");
    }

    /// Drain and return everything buffered for a peer.
    pub async fn take(&self, peer_id: &str) -> SignalingData {
        self.buffers.write().await.remove(peer_id).unwrap_or_default()
    }

    pub async fn clear(&self, peer_id: &str) {
        self.buffers.write().await.remove(peer_id);
    }
}
