//! Meshshare - Bandwidth-sharing marketplace core
//!
//! Coordination core for a peer-to-peer bandwidth-sharing marketplace:
//! metered access-code quotas, peer presence and provider matching, session
//! lifecycle with reward settlement, and priority emergency message routing.
//! Transport, auth, and the settlement ledger live outside this crate.

pub mod config;
pub mod error;
pub mod geo;
pub mod models;
pub mod services;
pub mod store;
pub mod telemetry;

pub use config::Config;
pub use error::{AppError, Result};
