//! Mesh peer presence, capabilities, and accounting totals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

/// What a peer can do on the mesh and how well.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    pub can_provide_internet: bool,
    pub can_receive_internet: bool,
    /// Current uplink bandwidth in Mbps
    pub bandwidth: f64,
    /// Current round-trip latency in ms
    pub latency: f64,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            can_provide_internet: false,
            can_receive_internet: true,
            bandwidth: 0.0,
            latency: 0.0,
        }
    }
}

/// Partial capability update supplied on (re-)registration. Unset fields
/// leave the stored value untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityUpdate {
    pub can_provide_internet: Option<bool>,
    pub can_receive_internet: Option<bool>,
    pub bandwidth: Option<f64>,
    pub latency: Option<f64>,
}

impl CapabilityUpdate {
    /// Merge the supplied fields into `caps`, preserving everything else.
    pub fn apply(&self, caps: &mut Capabilities) {
        if let Some(v) = self.can_provide_internet {
            caps.can_provide_internet = v;
        }
        if let Some(v) = self.can_receive_internet {
            caps.can_receive_internet = v;
        }
        if let Some(v) = self.bandwidth {
            caps.bandwidth = v;
        }
        if let Some(v) = self.latency {
            caps.latency = v;
        }
    }
}

/// Where a peer is. All fields optional; coordinates are only usable for
/// distance filtering when both are present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerLocation {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub city: Option<String>,
    pub country: Option<String>,
}

impl PeerLocation {
    /// The peer's coordinates, when both are known.
    pub fn point(&self) -> Option<GeoPoint> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
            _ => None,
        }
    }
}

/// Partial location update. Same merge semantics as [`CapabilityUpdate`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocationUpdate {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub city: Option<String>,
    pub country: Option<String>,
}

impl LocationUpdate {
    pub fn apply(&self, location: &mut PeerLocation) {
        if self.lat.is_some() {
            location.lat = self.lat;
        }
        if self.lng.is_some() {
            location.lng = self.lng;
        }
        if self.city.is_some() {
            location.city = self.city.clone();
        }
        if self.country.is_some() {
            location.country = self.country.clone();
        }
    }
}

/// A mesh peer. Created on first registration, never deleted; presence is
/// purely event-driven (register/unregister), with `last_seen` recorded for
/// external janitors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peer {
    pub peer_id: String,
    pub wallet_address: String,
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
    pub capabilities: Capabilities,
    pub location: PeerLocation,
    pub reputation: f64,
    /// Lifetime bytes shared as a provider (monotonic)
    pub total_data_shared: u64,
    /// Lifetime bytes consumed (monotonic)
    pub total_data_consumed: u64,
    /// MESH token balance credited by settlement
    pub tokens: f64,
    /// Leaderboard points credited per MB shared (monotonic)
    pub points: u64,
    pub created_at: DateTime<Utc>,
}

impl Peer {
    pub fn new(peer_id: String, wallet_address: String) -> Self {
        Self {
            peer_id,
            wallet_address,
            is_online: false,
            last_seen: Utc::now(),
            capabilities: Capabilities::default(),
            location: PeerLocation::default(),
            reputation: 0.0,
            total_data_shared: 0,
            total_data_consumed: 0,
            tokens: 0.0,
            points: 0,
            created_at: Utc::now(),
        }
    }
}
