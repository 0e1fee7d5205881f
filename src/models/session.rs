//! Internet-sharing session lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session lifecycle status.
///
/// `pending -> active -> {completed, failed, terminated}`, with
/// `active <-> paused`. Terminal states accept no further mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Active,
    Paused,
    Completed,
    Failed,
    Terminated,
    Ended,
}

impl SessionStatus {
    /// Terminal states permit no further join/leave/end.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Terminated
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Terminated => "terminated",
            SessionStatus::Ended => "ended",
        };
        write!(f, "{s}")
    }
}

/// Connection quality observed over a session, reported by the caller at
/// `end`. Missing fields fall back to neutral defaults in scoring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionQuality {
    /// Average round-trip latency in ms
    pub avg_latency: Option<f64>,
    /// Average bandwidth in Mbps
    pub avg_bandwidth: Option<f64>,
    /// Uptime fraction in [0, 1]
    pub uptime: Option<f64>,
}

/// A provider/consumer sharing session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub provider_id: String,
    pub consumer_id: String,
    pub status: SessionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Wall-clock duration in seconds, set at end
    pub duration_secs: f64,
    pub bytes_transferred: u64,
    pub quality: Option<SessionQuality>,
    /// Connected users in join order; uniqueness enforced on join,
    /// cardinality bounded by `max_users`
    pub connected_users: Vec<String>,
    pub max_users: usize,
    /// MESH reward computed at end
    pub reward_amount: f64,
    /// Latched true once the settlement oracle confirms payout
    pub reward_paid: bool,
    pub tx_hash: Option<String>,
}

impl Session {
    pub fn new(
        session_id: String,
        provider_id: String,
        consumer_id: String,
        max_users: usize,
    ) -> Self {
        Self {
            session_id,
            provider_id,
            consumer_id,
            status: SessionStatus::Active,
            start_time: Utc::now(),
            end_time: None,
            duration_secs: 0.0,
            bytes_transferred: 0,
            quality: None,
            connected_users: Vec::new(),
            max_users,
            reward_amount: 0.0,
            reward_paid: false,
            tx_hash: None,
        }
    }
}
