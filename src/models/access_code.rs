//! Metered access codes issued by providers and redeemed by consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A quota-bearing access code.
///
/// Invariant: `0 <= remaining_mb <= total_mb`. `remaining_mb` only ever
/// decreases; `redeemed_by` is bound at most once (first redeemer wins).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessCode {
    /// Unique code token (8 chars, unambiguous alphabet)
    pub code: String,
    /// Peer id of the issuing provider
    pub owner_provider: String,
    /// Total quota in megabytes
    pub total_mb: f64,
    /// Remaining quota in megabytes
    pub remaining_mb: f64,
    /// False once explicitly deactivated
    pub is_active: bool,
    /// Consumer the code is bound to, once redeemed
    pub redeemed_by: Option<String>,
    /// Optional expiry timestamp
    pub expire_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AccessCode {
    pub fn new(
        code: String,
        owner_provider: String,
        total_mb: f64,
        expire_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            code,
            owner_provider,
            total_mb,
            remaining_mb: total_mb,
            is_active: true,
            redeemed_by: None,
            expire_at,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expire_at, Some(at) if at <= now)
    }

    /// A code can authorize traffic iff it is active, unexpired, and has
    /// quota left.
    pub fn is_consumable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired(now) && self.remaining_mb > 0.0
    }
}
