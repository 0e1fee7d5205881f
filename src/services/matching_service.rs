//! Provider discovery and selection over the peer registry.

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::geo::{haversine_km, GeoPoint};
use crate::models::Peer;
use crate::store::PeerStore;

/// Weights of the provider score components.
const BANDWIDTH_WEIGHT: f64 = 0.4;
const LATENCY_WEIGHT: f64 = 0.3;
const REPUTATION_WEIGHT: f64 = 0.3;

/// A candidate provider with its computed score.
#[derive(Debug, Clone)]
pub struct ScoredProvider {
    pub peer: Peer,
    pub score: f64,
}

/// Best-effort provider matching against a point-in-time registry snapshot.
pub struct MatchingService {
    peers: Arc<dyn PeerStore>,
    default_radius_km: f64,
}

impl MatchingService {
    pub fn new(peers: Arc<dyn PeerStore>, default_radius_km: f64) -> Self {
        Self {
            peers,
            default_radius_km,
        }
    }

    /// Online providers within `radius_km` of `location`, pre-sorted by
    /// reputation then bandwidth (both descending).
    ///
    /// Candidates without known coordinates pass the filter — an unknown
    /// distance is not grounds for exclusion. No location given means no
    /// distance filtering at all.
    pub async fn find_nearby(
        &self,
        location: Option<GeoPoint>,
        radius_km: Option<f64>,
    ) -> Result<Vec<Peer>> {
        let radius = radius_km.unwrap_or(self.default_radius_km);
        let pool = self.peers.list_providers().await?;

        let candidates = match location {
            Some(here) => pool
                .into_iter()
                .filter(|peer| match peer.location.point() {
                    Some(there) => haversine_km(here, there) <= radius,
                    None => true,
                })
                .collect(),
            None => pool,
        };

        Ok(candidates)
    }

    /// The highest-scoring nearby provider, or `None` when the candidate
    /// pool is empty. Ties keep the earlier element of the pre-sorted pool.
    pub async fn find_optimal_provider(
        &self,
        location: Option<GeoPoint>,
        required_bandwidth: f64,
    ) -> Result<Option<ScoredProvider>> {
        let candidates = self.find_nearby(location, None).await?;

        let mut best: Option<ScoredProvider> = None;
        for peer in candidates {
            let score = provider_score(&peer, required_bandwidth);
            // Strictly-greater keeps the earlier pre-sorted candidate on ties.
            if best.as_ref().map_or(true, |b| score > b.score) {
                best = Some(ScoredProvider { peer, score });
            }
        }

        if let Some(ref chosen) = best {
            debug!(
                peer_id = %chosen.peer.peer_id,
                score = chosen.score,
                "selected optimal provider"
            );
        }
        Ok(best)
    }
}

/// Weighted score in [0, 1]: bandwidth sufficiency, latency headroom below
/// 1000 ms, and reputation capped at 100.
fn provider_score(peer: &Peer, required_bandwidth: f64) -> f64 {
    let bandwidth_score = (peer.capabilities.bandwidth / required_bandwidth).min(1.0);
    let latency_score = (1.0 - peer.capabilities.latency / 1000.0).max(0.0);
    let reputation_score = (peer.reputation / 100.0).min(1.0);

    bandwidth_score * BANDWIDTH_WEIGHT
        + latency_score * LATENCY_WEIGHT
        + reputation_score * REPUTATION_WEIGHT
}
