//! Persistence collaborator traits.
//!
//! The core assumes a document store offering per-document atomic
//! read-modify-write and indexed equality/range queries; these traits are
//! that contract. [`memory::MemoryStore`] is the in-process backend; a
//! database-backed implementation drops in behind the same traits.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{AccessCode, EmergencyMessage, MessageType, Peer, Priority, Session, UsageLog};

pub use memory::MemoryStore;

/// An atomic read-modify-write applied to one document.
///
/// The store runs the closure under its own synchronization: concurrent
/// mutations of the same document serialize, and a closure returning `Err`
/// leaves the document unmodified. This is what makes quota decrements
/// linearizable per code and membership checks race-free per session.
pub type Mutation<T> = Box<dyn FnOnce(&mut T) -> Result<()> + Send>;

/// Access-code collection.
#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Insert a freshly issued code. The token is the unique key; inserting
    /// an existing token fails with a storage error instead of clobbering
    /// the live code.
    async fn insert(&self, code: AccessCode) -> Result<()>;

    async fn get(&self, code: &str) -> Result<Option<AccessCode>>;

    /// Atomically mutate one code. Returns the updated document, or
    /// `Ok(None)` when the code does not exist.
    async fn update(&self, code: &str, mutation: Mutation<AccessCode>)
        -> Result<Option<AccessCode>>;

    /// Codes redeemed by a consumer.
    async fn redeemed_by(&self, consumer_id: &str) -> Result<Vec<AccessCode>>;

    /// Codes issued by a provider, newest first.
    async fn owned_by(&self, provider_id: &str) -> Result<Vec<AccessCode>>;
}

/// Peer collection.
#[async_trait]
pub trait PeerStore: Send + Sync {
    async fn insert(&self, peer: Peer) -> Result<()>;

    async fn get(&self, peer_id: &str) -> Result<Option<Peer>>;

    async fn update(&self, peer_id: &str, mutation: Mutation<Peer>) -> Result<Option<Peer>>;

    async fn find_by_wallet(&self, wallet_address: &str) -> Result<Option<Peer>>;

    async fn list_online(&self) -> Result<Vec<Peer>>;

    /// The matcher's candidate pool: online peers that can provide internet
    /// with bandwidth > 0, sorted by reputation desc then bandwidth desc.
    async fn list_providers(&self) -> Result<Vec<Peer>>;

    async fn list_all(&self) -> Result<Vec<Peer>>;
}

/// Session collection.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: Session) -> Result<()>;

    async fn get(&self, session_id: &str) -> Result<Option<Session>>;

    async fn update(&self, session_id: &str, mutation: Mutation<Session>)
        -> Result<Option<Session>>;

    /// Completed sessions with a positive reward not yet paid out, oldest
    /// first, at most `limit`.
    async fn list_unpaid_completed(&self, limit: usize) -> Result<Vec<Session>>;

    async fn list_active(&self) -> Result<Vec<Session>>;

    /// Sessions where the peer is provider, consumer, or a connected user,
    /// newest first.
    async fn list_for_peer(&self, peer_id: &str) -> Result<Vec<Session>>;

    async fn list_all(&self) -> Result<Vec<Session>>;
}

/// Query window for [`MessageStore::list_for_peer`].
#[derive(Debug, Clone)]
pub struct MessageFilter {
    /// Lower bound on `created_at`
    pub since: DateTime<Utc>,
    pub priority: Option<Priority>,
    pub message_type: Option<MessageType>,
    pub limit: usize,
}

/// Emergency-message collection.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert(&self, message: EmergencyMessage) -> Result<()>;

    async fn get(&self, message_id: &str) -> Result<Option<EmergencyMessage>>;

    async fn update(
        &self,
        message_id: &str,
        mutation: Mutation<EmergencyMessage>,
    ) -> Result<Option<EmergencyMessage>>;

    /// Messages addressed to the peer, broadcast, or sent by the peer,
    /// within the filter window, ordered by priority desc then created_at
    /// desc, truncated to `filter.limit`.
    async fn list_for_peer(&self, peer_id: &str, filter: &MessageFilter)
        -> Result<Vec<EmergencyMessage>>;

    /// Undelivered high/emergency messages created at or after `since`.
    async fn list_undelivered_priority(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<EmergencyMessage>>;

    async fn list_all(&self) -> Result<Vec<EmergencyMessage>>;
}

/// Usage-log collection (append-only).
#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn insert(&self, log: UsageLog) -> Result<()>;

    /// A provider's usage records, newest first, at most `limit`.
    async fn list_for_provider(&self, provider_id: &str, limit: usize) -> Result<Vec<UsageLog>>;
}
