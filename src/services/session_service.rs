//! Session lifecycle coordination, reward computation, and settlement
//! dispatch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{Session, SessionQuality, SessionStatus};
use crate::services::settlement::{estimate_reward, SettlementOracle};
use crate::store::{PeerStore, SessionStore};

/// Outcome of one settlement attempt, as reported by the reconciliation
/// sweep.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementOutcome {
    pub session_id: String,
    pub provider_id: String,
    pub amount: f64,
    pub success: bool,
    pub tx_hash: Option<String>,
    pub error: Option<String>,
}

/// Session state machine and reward coordinator.
///
/// Membership and status checks run inside single store mutations, so
/// join/leave/end on one session serialize. Settlement is dispatched as a
/// detached task and retried by [`SessionService::reconcile_rewards`]; a
/// failed payout never fails `end`.
#[derive(Clone)]
pub struct SessionService {
    sessions: Arc<dyn SessionStore>,
    peers: Arc<dyn PeerStore>,
    oracle: Arc<dyn SettlementOracle>,
    max_users: usize,
    reward_rate_per_gb: f64,
    min_reward: f64,
    reconcile_batch_size: usize,
}

impl SessionService {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        peers: Arc<dyn PeerStore>,
        oracle: Arc<dyn SettlementOracle>,
        config: &Config,
    ) -> Self {
        Self {
            sessions,
            peers,
            oracle,
            max_users: config.max_session_users,
            reward_rate_per_gb: config.reward_rate_per_gb,
            min_reward: config.min_reward,
            reconcile_batch_size: config.reconcile_batch_size,
        }
    }

    /// Open a new active session between a provider and a consumer.
    pub async fn start(&self, provider_id: &str, consumer_id: &str) -> Result<Session> {
        if provider_id.is_empty() || consumer_id.is_empty() {
            return Err(AppError::Validation(
                "provider and consumer ids are required".into(),
            ));
        }

        let session = Session::new(
            Uuid::new_v4().to_string(),
            provider_id.to_string(),
            consumer_id.to_string(),
            self.max_users,
        );
        self.sessions.insert(session.clone()).await?;

        info!(
            session_id = %session.session_id,
            provider_id,
            consumer_id,
            "session started"
        );
        Ok(session)
    }

    /// Connect a user to an active session. The status, duplicate, and
    /// capacity checks run inside one mutation, keeping the cardinality
    /// bound race-free.
    pub async fn join(&self, session_id: &str, user_id: &str, user_name: &str) -> Result<Session> {
        let sid = session_id.to_string();
        let uid = user_id.to_string();

        let session = self
            .sessions
            .update(
                session_id,
                Box::new(move |s| {
                    if s.status != SessionStatus::Active {
                        return Err(AppError::SessionNotActive(sid.clone()));
                    }
                    if s.connected_users.iter().any(|u| *u == uid) {
                        return Err(AppError::AlreadyJoined {
                            session_id: sid.clone(),
                            user_id: uid.clone(),
                        });
                    }
                    if s.connected_users.len() >= s.max_users {
                        return Err(AppError::SessionFull(sid.clone()));
                    }
                    s.connected_users.push(uid.clone());
                    Ok(())
                }),
            )
            .await?
            .ok_or_else(|| AppError::SessionNotFound(session_id.to_string()))?;

        info!(session_id, user_id, user_name, "user joined session");
        Ok(session)
    }

    /// Disconnect a user. Removing an absent member is a no-op success;
    /// terminal sessions reject the call.
    pub async fn leave(&self, session_id: &str, user_id: &str) -> Result<Session> {
        let sid = session_id.to_string();
        let uid = user_id.to_string();

        self.sessions
            .update(
                session_id,
                Box::new(move |s| {
                    if s.status.is_terminal() {
                        return Err(AppError::SessionNotActive(sid.clone()));
                    }
                    s.connected_users.retain(|u| *u != uid);
                    Ok(())
                }),
            )
            .await?
            .ok_or_else(|| AppError::SessionNotFound(session_id.to_string()))
    }

    /// Close an active session: record transfer volume and quality, compute
    /// the reward, transition to completed, and dispatch settlement as a
    /// detached task. The transition always succeeds independent of payout.
    pub async fn end(
        &self,
        session_id: &str,
        bytes_transferred: u64,
        quality: Option<SessionQuality>,
    ) -> Result<Session> {
        let sid = session_id.to_string();
        let score = quality_score(quality.as_ref());
        let reward = estimate_reward(
            bytes_transferred,
            score,
            self.reward_rate_per_gb,
            self.min_reward,
        );
        let now = Utc::now();

        let session = self
            .sessions
            .update(
                session_id,
                Box::new(move |s| {
                    if s.status != SessionStatus::Active {
                        return Err(AppError::SessionNotActive(sid.clone()));
                    }
                    s.end_time = Some(now);
                    s.duration_secs = (now - s.start_time).num_milliseconds() as f64 / 1000.0;
                    s.bytes_transferred = bytes_transferred;
                    s.quality = quality;
                    s.reward_amount = reward;
                    s.status = SessionStatus::Completed;
                    Ok(())
                }),
            )
            .await?
            .ok_or_else(|| AppError::SessionNotFound(session_id.to_string()))?;

        info!(
            session_id,
            status = %session.status,
            bytes_transferred,
            reward_amount = session.reward_amount,
            quality_score = score,
            "session closed"
        );

        // Fire-and-forget; a failure here leaves the session unpaid and
        // eligible for the reconciliation sweep.
        let svc = self.clone();
        let pending = session.clone();
        tokio::spawn(async move {
            if let Err(e) = svc.settle(&pending).await {
                warn!(
                    session_id = %pending.session_id,
                    error = %e,
                    "settlement dispatch failed, session left for reconciliation"
                );
            }
        });

        Ok(session)
    }

    /// Retry settlement for up to `batch_size` unpaid completed sessions
    /// (defaulting to the configured sweep size). Re-entrant: sessions paid
    /// since being listed are skipped, and partial progress is kept.
    pub async fn reconcile_rewards(
        &self,
        batch_size: Option<usize>,
    ) -> Result<Vec<SettlementOutcome>> {
        let limit = batch_size.unwrap_or(self.reconcile_batch_size);
        let pending = self.sessions.list_unpaid_completed(limit).await?;

        let mut outcomes = Vec::with_capacity(pending.len());
        for session in pending {
            let outcome = match self.settle(&session).await {
                Ok(tx_hash) => SettlementOutcome {
                    session_id: session.session_id.clone(),
                    provider_id: session.provider_id.clone(),
                    amount: session.reward_amount,
                    success: true,
                    tx_hash,
                    error: None,
                },
                Err(e) => {
                    if e.is_domain() {
                        warn!(
                            session_id = %session.session_id,
                            error = %e,
                            "settlement rejected, retrying will not help"
                        );
                    } else {
                        debug!(
                            session_id = %session.session_id,
                            error = %e,
                            "settlement attempt failed, left for the next sweep"
                        );
                    }
                    SettlementOutcome {
                        session_id: session.session_id.clone(),
                        provider_id: session.provider_id.clone(),
                        amount: session.reward_amount,
                        success: false,
                        tx_hash: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }

        info!(
            processed = outcomes.len(),
            paid = outcomes.iter().filter(|o| o.success).count(),
            "reward reconciliation sweep finished"
        );
        Ok(outcomes)
    }

    pub async fn get(&self, session_id: &str) -> Result<Session> {
        self.sessions
            .get(session_id)
            .await?
            .ok_or_else(|| AppError::SessionNotFound(session_id.to_string()))
    }

    pub async fn list_active(&self) -> Result<Vec<Session>> {
        self.sessions.list_active().await
    }

    /// Sessions a peer took part in, as provider, consumer, or joiner.
    pub async fn sessions_for_peer(&self, peer_id: &str) -> Result<Vec<Session>> {
        self.sessions.list_for_peer(peer_id).await
    }

    /// Pay out one session's reward through the oracle and latch the result.
    ///
    /// Returns the transaction hash, or `Ok(None)` when the session turned
    /// out to be already paid or another settlement latched it first. The
    /// paid check precedes the oracle call, and only the call that flips
    /// `reward_paid` credits the provider, so two settlements racing past
    /// the check still credit the tokens exactly once.
    async fn settle(&self, session: &Session) -> Result<Option<String>> {
        let fresh = self
            .sessions
            .get(&session.session_id)
            .await?
            .ok_or_else(|| AppError::SessionNotFound(session.session_id.clone()))?;
        if fresh.reward_paid {
            return Ok(None);
        }

        let provider = self
            .peers
            .get(&fresh.provider_id)
            .await?
            .ok_or_else(|| AppError::PeerNotFound(fresh.provider_id.clone()))?;
        if provider.wallet_address.is_empty() {
            return Err(AppError::Settlement(format!(
                "provider {} has no wallet address",
                provider.peer_id
            )));
        }

        let receipt = self
            .oracle
            .reward(
                &provider.wallet_address,
                fresh.reward_amount,
                &format!("Internet sharing session {}", fresh.session_id),
            )
            .await?;

        let tx_hash = receipt.tx_hash.clone();
        let latched = Arc::new(AtomicBool::new(false));
        let flag = latched.clone();
        self.sessions
            .update(
                &fresh.session_id,
                Box::new(move |s| {
                    if !s.reward_paid {
                        s.reward_paid = true;
                        s.tx_hash = Some(receipt.tx_hash.clone());
                        flag.store(true, Ordering::SeqCst);
                    }
                    Ok(())
                }),
            )
            .await?;

        if !latched.load(Ordering::SeqCst) {
            warn!(
                session_id = %fresh.session_id,
                "concurrent settlement latched the session first, skipping credit"
            );
            return Ok(None);
        }

        let amount = fresh.reward_amount;
        self.peers
            .update(
                &fresh.provider_id,
                Box::new(move |peer| {
                    peer.tokens += amount;
                    Ok(())
                }),
            )
            .await?;

        info!(
            session_id = %fresh.session_id,
            provider_id = %fresh.provider_id,
            amount = fresh.reward_amount,
            tx_hash = %tx_hash,
            "session reward settled"
        );
        Ok(Some(tx_hash))
    }
}

/// Quality multiplier in [0.1, 1]: uptime scaled by bandwidth sufficiency
/// and latency headroom. Missing fields fall back to neutral defaults; no
/// quality report at all scores 1.
fn quality_score(quality: Option<&SessionQuality>) -> f64 {
    let Some(q) = quality else {
        return 1.0;
    };

    let uptime = q.uptime.unwrap_or(1.0);
    let bandwidth = q.avg_bandwidth.unwrap_or(1.0);
    let latency = q.avg_latency.unwrap_or(100.0);

    uptime * (bandwidth / 1.0).min(1.0) * (1.0 - latency / 1000.0).max(0.1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_quality_scores_one() {
        assert_eq!(quality_score(None), 1.0);
    }

    #[test]
    fn perfect_quality_scores_one() {
        let q = SessionQuality {
            avg_latency: Some(0.0),
            avg_bandwidth: Some(10.0),
            uptime: Some(1.0),
        };
        assert!((quality_score(Some(&q)) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn latency_penalty_is_floored_at_a_tenth() {
        let q = SessionQuality {
            avg_latency: Some(5000.0),
            avg_bandwidth: Some(10.0),
            uptime: Some(1.0),
        };
        assert!((quality_score(Some(&q)) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn missing_fields_use_neutral_defaults() {
        let q = SessionQuality::default();
        // uptime 1 * min(1, 1/1) * max(0.1, 1 - 100/1000) = 0.9
        assert!((quality_score(Some(&q)) - 0.9).abs() < 1e-9);
    }
}
