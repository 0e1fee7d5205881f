//! Application configuration loaded from environment variables.

use crate::error::{AppError, Result};
use std::env;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Log level filter (when RUST_LOG is unset)
    pub log_level: String,

    /// MESH tokens rewarded per GB shared
    pub reward_rate_per_gb: f64,

    /// Floor on any session reward (prevents zero-value payouts)
    pub min_reward: f64,

    /// Default connected-user capacity of a session
    pub max_session_users: usize,

    /// Default time-to-live of an emergency message, in hours
    pub emergency_ttl_hours: i64,

    /// Time-to-live of an SOS broadcast, in hours
    pub sos_ttl_hours: i64,

    /// Default search radius for provider discovery, in kilometers
    pub provider_radius_km: f64,

    /// Default search radius for nearby emergency messages, in kilometers
    pub emergency_radius_km: f64,

    /// Max unpaid sessions retried per reconciliation sweep
    pub reconcile_batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            reward_rate_per_gb: 1.0,
            min_reward: 0.001,
            max_session_users: 3,
            emergency_ttl_hours: 24,
            sos_ttl_hours: 48,
            provider_radius_km: 50.0,
            emergency_radius_km: 10.0,
            reconcile_batch_size: 10,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        Ok(Config {
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            reward_rate_per_gb: parse_var("DEFAULT_REWARD_RATE", defaults.reward_rate_per_gb)?,
            min_reward: parse_var("MIN_REWARD", defaults.min_reward)?,
            max_session_users: parse_var("MAX_SESSION_USERS", defaults.max_session_users)?,
            emergency_ttl_hours: parse_var("EMERGENCY_MESSAGE_TTL", defaults.emergency_ttl_hours)?,
            sos_ttl_hours: parse_var("SOS_MESSAGE_TTL", defaults.sos_ttl_hours)?,
            provider_radius_km: parse_var("PROVIDER_SEARCH_RADIUS", defaults.provider_radius_km)?,
            emergency_radius_km: parse_var("SOS_BROADCAST_RADIUS", defaults.emergency_radius_km)?,
            reconcile_batch_size: parse_var("RECONCILE_BATCH_SIZE", defaults.reconcile_batch_size)?,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::Config(format!("invalid value for {name}: {raw}"))),
        Err(_) => Ok(default),
    }
}
