//! Network-wide aggregates and the provider leaderboard.

use std::sync::Arc;

use serde::Serialize;

use crate::error::Result;
use crate::store::{PeerStore, SessionStore};

/// Point-in-time snapshot of the mesh.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkStats {
    pub total_peers: usize,
    pub online_peers: usize,
    pub providers: usize,
    pub total_sessions: usize,
    pub total_sessions_active: usize,
    pub total_data_shared: u64,
    pub avg_reputation: f64,
}

/// One leaderboard row.
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub peer_id: String,
    pub points: u64,
    pub total_data_shared: u64,
    pub tokens: f64,
}

/// Read-only aggregates over peers and sessions. Eventually consistent by
/// construction; the numbers are display material, not accounting.
pub struct StatsService {
    peers: Arc<dyn PeerStore>,
    sessions: Arc<dyn SessionStore>,
}

impl StatsService {
    pub fn new(peers: Arc<dyn PeerStore>, sessions: Arc<dyn SessionStore>) -> Self {
        Self { peers, sessions }
    }

    pub async fn network_stats(&self) -> Result<NetworkStats> {
        let all = self.peers.list_all().await?;
        let online = all.iter().filter(|p| p.is_online).count();
        let providers = all
            .iter()
            .filter(|p| p.is_online && p.capabilities.can_provide_internet)
            .count();
        let total_data_shared = all.iter().map(|p| p.total_data_shared).sum();
        let avg_reputation = if all.is_empty() {
            0.0
        } else {
            all.iter().map(|p| p.reputation).sum::<f64>() / all.len() as f64
        };

        let sessions = self.sessions.list_all().await?;
        let active = self.sessions.list_active().await?;

        Ok(NetworkStats {
            total_peers: all.len(),
            online_peers: online,
            providers,
            total_sessions: sessions.len(),
            total_sessions_active: active.len(),
            total_data_shared,
            avg_reputation,
        })
    }

    /// Top peers by points, with their sharing totals.
    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        let mut peers = self.peers.list_all().await?;
        peers.sort_by(|a, b| {
            b.points
                .cmp(&a.points)
                .then(b.total_data_shared.cmp(&a.total_data_shared))
        });
        peers.truncate(limit);

        Ok(peers
            .into_iter()
            .map(|p| LeaderboardEntry {
                peer_id: p.peer_id,
                points: p.points,
                total_data_shared: p.total_data_shared,
                tokens: p.tokens,
            })
            .collect())
    }
}
