//! Business logic services.

pub mod emergency_service;
pub mod matching_service;
pub mod peer_service;
pub mod quota_service;
pub mod session_service;
pub mod settlement;
pub mod stats_service;
