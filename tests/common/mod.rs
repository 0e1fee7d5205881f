//! Shared test harness: in-memory store, a scripted settlement oracle, and
//! the full service set wired together.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use meshshare_core::config::Config;
use meshshare_core::error::{AppError, Result};
use meshshare_core::models::{CapabilityUpdate, LocationUpdate};
use meshshare_core::services::emergency_service::EmergencyService;
use meshshare_core::services::matching_service::MatchingService;
use meshshare_core::services::peer_service::PeerService;
use meshshare_core::services::quota_service::QuotaService;
use meshshare_core::services::session_service::SessionService;
use meshshare_core::services::settlement::{RewardReceipt, SettlementOracle};
use meshshare_core::services::stats_service::StatsService;
use meshshare_core::store::MemoryStore;

/// Scripted oracle: records every reward call, optionally failing them.
pub struct ScriptedOracle {
    pub calls: Mutex<Vec<(String, f64)>>,
    failing: AtomicBool,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn reward_calls(&self) -> Vec<(String, f64)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SettlementOracle for ScriptedOracle {
    async fn reward(&self, wallet_address: &str, amount: f64, _reason: &str)
        -> Result<RewardReceipt> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Settlement("oracle unavailable".into()));
        }
        self.calls
            .lock()
            .unwrap()
            .push((wallet_address.to_string(), amount));
        Ok(RewardReceipt {
            tx_hash: format!("0x{}", Uuid::new_v4().simple()),
        })
    }

    async fn balance(&self, _wallet_address: &str) -> Result<f64> {
        Ok(self
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, amount)| amount)
            .sum())
    }
}

/// Fully wired service set over one in-memory store.
pub struct TestEnv {
    pub store: Arc<MemoryStore>,
    pub oracle: Arc<ScriptedOracle>,
    pub quota: Arc<QuotaService>,
    pub peers: Arc<PeerService>,
    pub matching: Arc<MatchingService>,
    pub sessions: Arc<SessionService>,
    pub emergency: Arc<EmergencyService>,
    pub stats: Arc<StatsService>,
}

pub fn test_env() -> TestEnv {
    let config = Config::default();
    let store = Arc::new(MemoryStore::new());
    let oracle = Arc::new(ScriptedOracle::new());

    TestEnv {
        quota: Arc::new(QuotaService::new(store.clone(), store.clone(), store.clone())),
        peers: Arc::new(PeerService::new(store.clone())),
        matching: Arc::new(MatchingService::new(
            store.clone(),
            config.provider_radius_km,
        )),
        sessions: Arc::new(SessionService::new(
            store.clone(),
            store.clone(),
            oracle.clone(),
            &config,
        )),
        emergency: Arc::new(EmergencyService::new(store.clone(), &config)),
        stats: Arc::new(StatsService::new(store.clone(), store.clone())),
        store,
        oracle,
    }
}

/// Register an online provider peer with the given capabilities.
pub async fn register_provider(
    env: &TestEnv,
    peer_id: &str,
    bandwidth: f64,
    latency: f64,
    location: Option<(f64, f64)>,
) {
    let loc = match location {
        Some((lat, lng)) => LocationUpdate {
            lat: Some(lat),
            lng: Some(lng),
            ..Default::default()
        },
        None => LocationUpdate::default(),
    };
    env.peers
        .register(
            peer_id,
            &format!("0x{peer_id}"),
            CapabilityUpdate {
                can_provide_internet: Some(true),
                bandwidth: Some(bandwidth),
                latency: Some(latency),
                ..Default::default()
            },
            loc,
        )
        .await
        .unwrap();
}
