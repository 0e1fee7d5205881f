//! Settlement oracle seam and reward arithmetic.
//!
//! The chain client lives outside this crate; the core only depends on this
//! trait. Calls may be slow or fail outright and are always treated as
//! retryable — a failed payout leaves the session eligible for the
//! reconciliation sweep.

use async_trait::async_trait;

use crate::error::Result;

const BYTES_PER_GB: f64 = (1u64 << 30) as f64;

/// Confirmation of an on-chain reward transfer.
#[derive(Debug, Clone)]
pub struct RewardReceipt {
    pub tx_hash: String,
}

/// External settlement ledger.
#[async_trait]
pub trait SettlementOracle: Send + Sync {
    /// Transfer `amount` MESH to `wallet_address`. `reason` is carried into
    /// the ledger event for auditability.
    async fn reward(&self, wallet_address: &str, amount: f64, reason: &str)
        -> Result<RewardReceipt>;

    /// Current MESH balance of a wallet.
    async fn balance(&self, wallet_address: &str) -> Result<f64>;
}

/// Reward for a finished session: `rate_per_gb` MESH per GB transferred,
/// scaled by the quality score, floored at `min_reward` so trivial usage
/// still settles to a nonzero payout.
pub fn estimate_reward(
    bytes_transferred: u64,
    quality_score: f64,
    rate_per_gb: f64,
    min_reward: f64,
) -> f64 {
    let gb = bytes_transferred as f64 / BYTES_PER_GB;
    (gb * rate_per_gb * quality_score).max(min_reward)
}
