//! Store-and-forward emergency messages for mesh relay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

/// Routing priority. Derived ordering is semantic:
/// `Low < Medium < High < Emergency`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Emergency,
}

/// Payload category of an emergency message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageType {
    Text,
    Location,
    Sos,
    ResourceRequest,
    Status,
}

/// One relay/delivery confirmation in a message's provenance trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hop {
    pub peer_id: String,
    pub timestamp: DateTime<Utc>,
}

/// A priority message routed store-and-forward across the mesh.
///
/// Mutated only by delivery confirmation: each confirmation appends a hop;
/// the first one latches `delivered`/`delivered_at`. Routing relevance ends
/// `ttl_hours` after creation, but the record itself is retained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyMessage {
    pub message_id: String,
    pub from_peer: String,
    /// None denotes broadcast
    pub to_peer: Option<String>,
    pub content: String,
    pub priority: Priority,
    pub message_type: MessageType,
    pub location: Option<GeoPoint>,
    /// Routing time-to-live in hours
    pub ttl_hours: i64,
    pub delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    /// Append-only relay provenance
    pub hops: Vec<Hop>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering_is_semantic() {
        assert!(Priority::Emergency > Priority::High);
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
    }

    #[test]
    fn serde_names_match_wire_values() {
        assert_eq!(serde_json::to_string(&Priority::Emergency).unwrap(), "\"emergency\"");
        assert_eq!(
            serde_json::to_string(&MessageType::ResourceRequest).unwrap(),
            "\"resource-request\""
        );
    }
}
