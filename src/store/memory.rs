//! In-process store backend.
//!
//! One `RwLock`-guarded map per collection. Mutations are applied to a
//! draft copy and written back only on success, so a failed mutation never
//! leaves a half-modified document. Holding the collection write lock for
//! the duration of a mutation is what serializes concurrent updates to the
//! same document.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{AppError, Result};
use crate::models::{
    AccessCode, EmergencyMessage, Peer, Priority, Session, SessionStatus, UsageLog,
};

use super::{CodeStore, MessageFilter, MessageStore, Mutation, PeerStore, SessionStore, UsageStore};

/// In-memory implementation of every store trait.
#[derive(Default)]
pub struct MemoryStore {
    codes: RwLock<HashMap<String, AccessCode>>,
    peers: RwLock<HashMap<String, Peer>>,
    sessions: RwLock<HashMap<String, Session>>,
    messages: RwLock<HashMap<String, EmergencyMessage>>,
    usage: RwLock<Vec<UsageLog>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Apply a mutation to a draft copy, committing only on success.
async fn update_in<T: Clone>(
    map: &RwLock<HashMap<String, T>>,
    key: &str,
    mutation: Mutation<T>,
) -> Result<Option<T>> {
    let mut guard = map.write().await;
    let Some(entry) = guard.get_mut(key) else {
        return Ok(None);
    };

    let mut draft = entry.clone();
    mutation(&mut draft)?;
    *entry = draft.clone();
    Ok(Some(draft))
}

#[async_trait]
impl CodeStore for MemoryStore {
    async fn insert(&self, code: AccessCode) -> Result<()> {
        let mut codes = self.codes.write().await;
        if codes.contains_key(&code.code) {
            return Err(AppError::Storage(format!(
                "duplicate access code {}",
                code.code
            )));
        }
        codes.insert(code.code.clone(), code);
        Ok(())
    }

    async fn get(&self, code: &str) -> Result<Option<AccessCode>> {
        Ok(self.codes.read().await.get(code).cloned())
    }

    async fn update(
        &self,
        code: &str,
        mutation: Mutation<AccessCode>,
    ) -> Result<Option<AccessCode>> {
        update_in(&self.codes, code, mutation).await
    }

    async fn redeemed_by(&self, consumer_id: &str) -> Result<Vec<AccessCode>> {
        Ok(self
            .codes
            .read()
            .await
            .values()
            .filter(|c| c.redeemed_by.as_deref() == Some(consumer_id))
            .cloned()
            .collect())
    }

    async fn owned_by(&self, provider_id: &str) -> Result<Vec<AccessCode>> {
        let mut codes: Vec<AccessCode> = self
            .codes
            .read()
            .await
            .values()
            .filter(|c| c.owner_provider == provider_id)
            .cloned()
            .collect();
        codes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(codes)
    }
}

#[async_trait]
impl PeerStore for MemoryStore {
    async fn insert(&self, peer: Peer) -> Result<()> {
        self.peers.write().await.insert(peer.peer_id.clone(), peer);
        Ok(())
    }

    async fn get(&self, peer_id: &str) -> Result<Option<Peer>> {
        Ok(self.peers.read().await.get(peer_id).cloned())
    }

    async fn update(&self, peer_id: &str, mutation: Mutation<Peer>) -> Result<Option<Peer>> {
        update_in(&self.peers, peer_id, mutation).await
    }

    async fn find_by_wallet(&self, wallet_address: &str) -> Result<Option<Peer>> {
        Ok(self
            .peers
            .read()
            .await
            .values()
            .find(|p| p.wallet_address == wallet_address)
            .cloned())
    }

    async fn list_online(&self) -> Result<Vec<Peer>> {
        Ok(self
            .peers
            .read()
            .await
            .values()
            .filter(|p| p.is_online)
            .cloned()
            .collect())
    }

    async fn list_providers(&self) -> Result<Vec<Peer>> {
        let mut providers: Vec<Peer> = self
            .peers
            .read()
            .await
            .values()
            .filter(|p| {
                p.is_online && p.capabilities.can_provide_internet && p.capabilities.bandwidth > 0.0
            })
            .cloned()
            .collect();

        // Reputation desc, bandwidth desc, peer id for a deterministic tail.
        providers.sort_by(|a, b| {
            b.reputation
                .total_cmp(&a.reputation)
                .then(b.capabilities.bandwidth.total_cmp(&a.capabilities.bandwidth))
                .then_with(|| a.peer_id.cmp(&b.peer_id))
        });
        Ok(providers)
    }

    async fn list_all(&self) -> Result<Vec<Peer>> {
        Ok(self.peers.read().await.values().cloned().collect())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert(&self, session: Session) -> Result<()> {
        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), session);
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn update(
        &self,
        session_id: &str,
        mutation: Mutation<Session>,
    ) -> Result<Option<Session>> {
        update_in(&self.sessions, session_id, mutation).await
    }

    async fn list_unpaid_completed(&self, limit: usize) -> Result<Vec<Session>> {
        let mut sessions: Vec<Session> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| {
                s.status == SessionStatus::Completed && !s.reward_paid && s.reward_amount > 0.0
            })
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        sessions.truncate(limit);
        Ok(sessions)
    }

    async fn list_active(&self) -> Result<Vec<Session>> {
        let mut sessions: Vec<Session> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.status == SessionStatus::Active)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(sessions)
    }

    async fn list_for_peer(&self, peer_id: &str) -> Result<Vec<Session>> {
        let mut sessions: Vec<Session> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| {
                s.provider_id == peer_id
                    || s.consumer_id == peer_id
                    || s.connected_users.iter().any(|u| u == peer_id)
            })
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(sessions)
    }

    async fn list_all(&self) -> Result<Vec<Session>> {
        Ok(self.sessions.read().await.values().cloned().collect())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert(&self, message: EmergencyMessage) -> Result<()> {
        self.messages
            .write()
            .await
            .insert(message.message_id.clone(), message);
        Ok(())
    }

    async fn get(&self, message_id: &str) -> Result<Option<EmergencyMessage>> {
        Ok(self.messages.read().await.get(message_id).cloned())
    }

    async fn update(
        &self,
        message_id: &str,
        mutation: Mutation<EmergencyMessage>,
    ) -> Result<Option<EmergencyMessage>> {
        update_in(&self.messages, message_id, mutation).await
    }

    async fn list_for_peer(
        &self,
        peer_id: &str,
        filter: &MessageFilter,
    ) -> Result<Vec<EmergencyMessage>> {
        let mut messages: Vec<EmergencyMessage> = self
            .messages
            .read()
            .await
            .values()
            .filter(|m| {
                (m.to_peer.as_deref() == Some(peer_id)
                    || m.to_peer.is_none()
                    || m.from_peer == peer_id)
                    && m.created_at >= filter.since
                    && filter.priority.map_or(true, |p| m.priority == p)
                    && filter.message_type.map_or(true, |t| m.message_type == t)
            })
            .cloned()
            .collect();

        messages.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.created_at.cmp(&a.created_at))
        });
        messages.truncate(filter.limit);
        Ok(messages)
    }

    async fn list_undelivered_priority(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<EmergencyMessage>> {
        Ok(self
            .messages
            .read()
            .await
            .values()
            .filter(|m| {
                !m.delivered
                    && m.priority >= Priority::High
                    && m.created_at >= since
            })
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<EmergencyMessage>> {
        Ok(self.messages.read().await.values().cloned().collect())
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn insert(&self, log: UsageLog) -> Result<()> {
        self.usage.write().await.push(log);
        Ok(())
    }

    async fn list_for_provider(&self, provider_id: &str, limit: usize) -> Result<Vec<UsageLog>> {
        let mut logs: Vec<UsageLog> = self
            .usage
            .read()
            .await
            .iter()
            .filter(|l| l.provider_id == provider_id)
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        logs.truncate(limit);
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[tokio::test]
    async fn failed_mutation_leaves_document_untouched() {
        let store = MemoryStore::new();
        CodeStore::insert(
            &store,
            AccessCode::new("AAAA2222".into(), "prov".into(), 100.0, None),
        )
        .await
        .unwrap();

        let err = CodeStore::update(
            &store,
            "AAAA2222",
            Box::new(|c| {
                c.remaining_mb = 1.0;
                Err(AppError::Validation("abort".into()))
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let code = CodeStore::get(&store, "AAAA2222").await.unwrap().unwrap();
        assert_eq!(code.remaining_mb, 100.0);
    }

    #[tokio::test]
    async fn duplicate_code_token_is_rejected_not_clobbered() {
        let store = MemoryStore::new();
        CodeStore::insert(
            &store,
            AccessCode::new("AAAA2222".into(), "prov".into(), 100.0, None),
        )
        .await
        .unwrap();

        let err = CodeStore::insert(
            &store,
            AccessCode::new("AAAA2222".into(), "other".into(), 5.0, None),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));

        let code = CodeStore::get(&store, "AAAA2222").await.unwrap().unwrap();
        assert_eq!(code.owner_provider, "prov");
        assert_eq!(code.remaining_mb, 100.0);
    }

    #[tokio::test]
    async fn update_of_missing_key_returns_none() {
        let store = MemoryStore::new();
        let updated = SessionStore::update(&store, "nope", Box::new(|_| Ok(()))).await.unwrap();
        assert!(updated.is_none());
    }

    #[tokio::test]
    async fn provider_pool_is_sorted_by_reputation_then_bandwidth() {
        let store = MemoryStore::new();
        for (id, rep, bw) in [("a", 50.0, 10.0), ("b", 80.0, 5.0), ("c", 80.0, 20.0)] {
            let mut p = Peer::new(id.into(), format!("0x{id}"));
            p.is_online = true;
            p.capabilities.can_provide_internet = true;
            p.capabilities.bandwidth = bw;
            p.reputation = rep;
            PeerStore::insert(&store, p).await.unwrap();
        }

        let pool = store.list_providers().await.unwrap();
        let ids: Vec<&str> = pool.iter().map(|p| p.peer_id.as_str()).collect();
        assert_eq!(ids, ["c", "b", "a"]);
    }
}
