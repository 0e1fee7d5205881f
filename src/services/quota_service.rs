//! Access-code quota ledger: issuance, redemption, metered consumption,
//! and the gateway usage-reporting flow.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::Rng;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::models::{AccessCode, UsageLog, UsageReporter};
use crate::store::{CodeStore, PeerStore, UsageStore};

const BYTES_PER_MB: f64 = (1u64 << 20) as f64;

/// Tolerance when checking a decrement against remaining quota, in MB.
/// Gateways report in byte counts that can overshoot by a packet or two.
const QUOTA_EPSILON_MB: f64 = 0.01;

/// Points credited to a provider per MB served.
const POINTS_PER_MB: f64 = 1.0;

/// Unambiguous alphabet for code tokens (no 0/O, 1/I).
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 8;

/// Provider-facing usage summary.
#[derive(Debug)]
pub struct UsageDashboard {
    pub total_bytes: u64,
    pub logs: Vec<UsageLog>,
}

/// Quota ledger over the access-code collection.
pub struct QuotaService {
    codes: Arc<dyn CodeStore>,
    usage: Arc<dyn UsageStore>,
    peers: Arc<dyn PeerStore>,
}

impl QuotaService {
    pub fn new(
        codes: Arc<dyn CodeStore>,
        usage: Arc<dyn UsageStore>,
        peers: Arc<dyn PeerStore>,
    ) -> Self {
        Self { codes, usage, peers }
    }

    /// Issue `count` codes of `total_mb` each for a provider. Codes expire
    /// `expire_hours` from now when given, otherwise never.
    pub async fn issue(
        &self,
        provider_id: &str,
        total_mb: f64,
        count: usize,
        expire_hours: Option<i64>,
    ) -> Result<Vec<AccessCode>> {
        if total_mb <= 0.0 {
            return Err(AppError::Validation("totalMB must be > 0".into()));
        }
        if count == 0 || count > 50 {
            return Err(AppError::Validation("count must be 1..=50".into()));
        }

        let expire_at = expire_hours.map(|h| Utc::now() + Duration::hours(h));
        let mut issued = Vec::with_capacity(count);
        for _ in 0..count {
            // The store treats the token as a unique key; regenerate on a
            // collision rather than clobbering a live code.
            let mut attempts = 0;
            let code = loop {
                let candidate = AccessCode::new(
                    generate_code(),
                    provider_id.to_string(),
                    total_mb,
                    expire_at,
                );
                match self.codes.insert(candidate.clone()).await {
                    Ok(()) => break candidate,
                    Err(e) if attempts < 3 => {
                        attempts += 1;
                        debug!(error = %e, "access code insert failed, regenerating token");
                    }
                    Err(e) => return Err(e),
                }
            };
            issued.push(code);
        }

        debug!(provider_id, count, total_mb, "issued access codes");
        Ok(issued)
    }

    /// Bind a code to a consumer. First redeemer wins; re-redeeming by the
    /// same consumer is a no-op success.
    pub async fn redeem(&self, code: &str, consumer_id: &str) -> Result<AccessCode> {
        let token = code.to_string();
        let consumer = consumer_id.to_string();
        let now = Utc::now();

        self.codes
            .update(
                code,
                Box::new(move |doc| {
                    if !doc.is_active {
                        return Err(AppError::CodeNotFound(token.clone()));
                    }
                    if doc.is_expired(now) {
                        return Err(AppError::CodeExpired(token.clone()));
                    }
                    match &doc.redeemed_by {
                        Some(owner) if *owner != consumer => {
                            Err(AppError::CodeAlreadyRedeemed(token.clone()))
                        }
                        _ => {
                            doc.redeemed_by = Some(consumer.clone());
                            Ok(())
                        }
                    }
                }),
            )
            .await?
            .ok_or_else(|| AppError::CodeNotFound(code.to_string()))
    }

    /// Decrement a code's remaining quota by `bytes`. The entire
    /// check-and-decrement runs as one store mutation, so concurrent
    /// consumes on the same code serialize and no decrement is lost.
    pub async fn consume(&self, code: &str, bytes: u64) -> Result<AccessCode> {
        let token = code.to_string();
        let mb = bytes as f64 / BYTES_PER_MB;
        let now = Utc::now();

        self.codes
            .update(
                code,
                Box::new(move |doc| {
                    if !doc.is_active {
                        return Err(AppError::CodeNotFound(token.clone()));
                    }
                    if doc.is_expired(now) {
                        return Err(AppError::CodeExpired(token.clone()));
                    }
                    let new_remaining = doc.remaining_mb - mb;
                    if new_remaining < -QUOTA_EPSILON_MB {
                        return Err(AppError::QuotaExceeded {
                            code: token.clone(),
                            requested_mb: mb,
                            remaining_mb: doc.remaining_mb,
                        });
                    }
                    doc.remaining_mb = new_remaining.max(0.0);
                    Ok(())
                }),
            )
            .await?
            .ok_or_else(|| AppError::CodeNotFound(code.to_string()))
    }

    /// Sum of remaining quota over a consumer's active codes.
    pub async fn balance(&self, consumer_id: &str) -> Result<f64> {
        let codes = self.codes.redeemed_by(consumer_id).await?;
        Ok(codes
            .iter()
            .filter(|c| c.is_active)
            .map(|c| c.remaining_mb)
            .sum())
    }

    /// Gateway flow: decrement the quota, then log the transfer and credit
    /// provider points and consumer totals.
    ///
    /// The three follow-up writes are independent of the decrement and of
    /// each other; a failure after the decrement is logged and the call
    /// still succeeds with the decremented balance. Accepted
    /// eventual-consistency gap, not rolled back.
    pub async fn report_usage(
        &self,
        code: &str,
        bytes: u64,
        consumer_id: Option<&str>,
        reported_by: UsageReporter,
    ) -> Result<AccessCode> {
        if bytes == 0 {
            return Err(AppError::Validation("bytes must be > 0".into()));
        }

        let updated = self.consume(code, bytes).await?;
        let consumer = consumer_id
            .map(str::to_string)
            .or_else(|| updated.redeemed_by.clone());

        let log = UsageLog::new(
            updated.owner_provider.clone(),
            consumer.clone(),
            updated.code.clone(),
            bytes,
            reported_by,
        );
        if let Err(e) = self.usage.insert(log).await {
            warn!(code, error = %e, "usage log write failed after quota decrement");
        }

        if let Err(e) = self.award_points(&updated.owner_provider, bytes).await {
            warn!(provider_id = %updated.owner_provider, error = %e, "provider points credit failed");
        }

        if let Some(consumer_id) = consumer {
            let credited = self
                .peers
                .update(
                    &consumer_id,
                    Box::new(move |peer| {
                        peer.total_data_consumed += bytes;
                        Ok(())
                    }),
                )
                .await;
            if let Err(e) = credited {
                warn!(consumer_id, error = %e, "consumer usage credit failed");
            }
        }

        Ok(updated)
    }

    /// Explicitly retire a code.
    pub async fn deactivate(&self, code: &str) -> Result<AccessCode> {
        self.codes
            .update(
                code,
                Box::new(|doc| {
                    doc.is_active = false;
                    Ok(())
                }),
            )
            .await?
            .ok_or_else(|| AppError::CodeNotFound(code.to_string()))
    }

    /// A provider's issued codes, newest first.
    pub async fn list_codes(&self, provider_id: &str) -> Result<Vec<AccessCode>> {
        self.codes.owned_by(provider_id).await
    }

    /// A provider's recent usage records plus their byte total.
    pub async fn usage_dashboard(&self, provider_id: &str, limit: usize) -> Result<UsageDashboard> {
        let logs = self.usage.list_for_provider(provider_id, limit).await?;
        let total_bytes = logs.iter().map(|l| l.bytes).sum();
        Ok(UsageDashboard { total_bytes, logs })
    }

    /// Credit leaderboard points and shared-data totals to a provider.
    /// Unknown providers are skipped (points track registered peers only).
    async fn award_points(&self, provider_id: &str, bytes: u64) -> Result<u64> {
        let points = ((bytes as f64 / BYTES_PER_MB) * POINTS_PER_MB).floor() as u64;
        if points == 0 {
            return Ok(0);
        }

        let updated = self
            .peers
            .update(
                provider_id,
                Box::new(move |peer| {
                    peer.points += points;
                    peer.total_data_shared += bytes;
                    Ok(())
                }),
            )
            .await?;

        Ok(if updated.is_some() { points } else { 0 })
    }
}

/// Generate an 8-character code token from the unambiguous alphabet.
fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}
