//! Store-and-forward routing for priority emergency messages.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::geo::{haversine_km, GeoPoint};
use crate::models::{EmergencyMessage, Hop, MessageType, Priority};
use crate::store::{MessageFilter, MessageStore};

/// Window for peer message queries, in hours.
const PEER_QUERY_WINDOW_HOURS: i64 = 24;

/// Window for location-based queries, in hours.
const NEARBY_QUERY_WINDOW_HOURS: i64 = 12;

const DEFAULT_PEER_QUERY_LIMIT: usize = 50;

const DEFAULT_SOS_CONTENT: &str = "SOS - Need immediate assistance";

/// Parameters of a new emergency message.
#[derive(Debug, Clone)]
pub struct SendMessage {
    pub from_peer: String,
    /// None broadcasts to the whole mesh
    pub to_peer: Option<String>,
    pub content: String,
    pub priority: Priority,
    pub message_type: MessageType,
    pub location: Option<GeoPoint>,
    /// Routing time-to-live in hours; None takes the configured default
    pub ttl_hours: Option<i64>,
}

/// Optional restrictions on a peer's message feed.
#[derive(Debug, Clone, Default)]
pub struct MessageQuery {
    pub priority: Option<Priority>,
    pub message_type: Option<MessageType>,
    pub limit: Option<usize>,
}

/// Aggregate routing statistics.
#[derive(Debug, Clone, Serialize)]
pub struct EmergencyStats {
    pub total: usize,
    pub delivered: usize,
    pub emergency: usize,
    pub recent_24h: usize,
    /// Delivered fraction of all messages, in percent
    pub delivery_rate: f64,
    pub by_type: HashMap<String, usize>,
    pub by_priority: HashMap<String, usize>,
}

/// TTL/priority-bounded emergency message router.
pub struct EmergencyService {
    messages: Arc<dyn MessageStore>,
    default_ttl_hours: i64,
    sos_ttl_hours: i64,
    default_radius_km: f64,
}

impl EmergencyService {
    pub fn new(messages: Arc<dyn MessageStore>, config: &Config) -> Self {
        Self {
            messages,
            default_ttl_hours: config.emergency_ttl_hours,
            sos_ttl_hours: config.sos_ttl_hours,
            default_radius_km: config.emergency_radius_km,
        }
    }

    /// Persist a message for store-and-forward relay. Repeated identical
    /// sends create distinct records; deduplication is a relay concern.
    pub async fn send(&self, params: SendMessage) -> Result<EmergencyMessage> {
        if params.from_peer.is_empty() || params.content.is_empty() {
            return Err(AppError::Validation(
                "from peer and content are required".into(),
            ));
        }

        let message = EmergencyMessage {
            message_id: Uuid::new_v4().to_string(),
            from_peer: params.from_peer,
            to_peer: params.to_peer,
            content: params.content,
            priority: params.priority,
            message_type: params.message_type,
            location: params.location,
            ttl_hours: params.ttl_hours.unwrap_or(self.default_ttl_hours),
            delivered: false,
            delivered_at: None,
            hops: Vec::new(),
            created_at: Utc::now(),
        };
        self.messages.insert(message.clone()).await?;

        if message.priority >= Priority::High {
            warn!(
                message_id = %message.message_id,
                from_peer = %message.from_peer,
                priority = ?message.priority,
                "high-priority emergency message stored"
            );
        }
        Ok(message)
    }

    /// Broadcast an SOS: emergency priority, extended TTL, location
    /// mandatory.
    pub async fn sos(
        &self,
        from_peer: &str,
        location: Option<GeoPoint>,
        details: Option<String>,
    ) -> Result<EmergencyMessage> {
        let location =
            location.ok_or_else(|| AppError::InvalidLocation("SOS requires lat/lng".into()))?;

        self.send(SendMessage {
            from_peer: from_peer.to_string(),
            to_peer: None,
            content: details.unwrap_or_else(|| DEFAULT_SOS_CONTENT.to_string()),
            priority: Priority::Emergency,
            message_type: MessageType::Sos,
            location: Some(location),
            ttl_hours: Some(self.sos_ttl_hours),
        })
        .await
    }

    /// A peer's feed: messages addressed to it, broadcasts, and its own
    /// sends from the last 24 hours, highest priority first.
    pub async fn for_peer(
        &self,
        peer_id: &str,
        query: MessageQuery,
    ) -> Result<Vec<EmergencyMessage>> {
        let filter = MessageFilter {
            since: Utc::now() - Duration::hours(PEER_QUERY_WINDOW_HOURS),
            priority: query.priority,
            message_type: query.message_type,
            limit: query.limit.unwrap_or(DEFAULT_PEER_QUERY_LIMIT),
        };
        self.messages.list_for_peer(peer_id, &filter).await
    }

    /// Undelivered high/emergency messages from the last 12 hours within
    /// `radius_km` of `location`. An explicit `priority` narrows further.
    pub async fn nearby(
        &self,
        location: Option<GeoPoint>,
        radius_km: Option<f64>,
        priority: Option<Priority>,
    ) -> Result<Vec<EmergencyMessage>> {
        let here = location
            .ok_or_else(|| AppError::InvalidLocation("nearby search requires lat/lng".into()))?;
        let radius = radius_km.unwrap_or(self.default_radius_km);
        let since = Utc::now() - Duration::hours(NEARBY_QUERY_WINDOW_HOURS);

        let candidates = self.messages.list_undelivered_priority(since).await?;
        Ok(candidates
            .into_iter()
            .filter(|m| priority.map_or(true, |p| m.priority == p))
            .filter(|m| match m.location {
                Some(there) => haversine_km(here, there) <= radius,
                None => false,
            })
            .collect())
    }

    /// Record a delivery confirmation. Every confirmation appends a hop to
    /// the provenance trail; the first one latches `delivered`.
    pub async fn mark_delivered(
        &self,
        message_id: &str,
        delivered_by: &str,
    ) -> Result<EmergencyMessage> {
        let by = delivered_by.to_string();
        let now = Utc::now();

        let message = self
            .messages
            .update(
                message_id,
                Box::new(move |m| {
                    m.hops.push(Hop {
                        peer_id: by.clone(),
                        timestamp: now,
                    });
                    if !m.delivered {
                        m.delivered = true;
                        m.delivered_at = Some(now);
                    }
                    Ok(())
                }),
            )
            .await?
            .ok_or_else(|| AppError::MessageNotFound(message_id.to_string()))?;

        info!(message_id, delivered_by, hops = message.hops.len(), "message delivery confirmed");
        Ok(message)
    }

    /// Aggregate counts over the whole message collection.
    pub async fn stats(&self) -> Result<EmergencyStats> {
        let all = self.messages.list_all().await?;
        let day_ago = Utc::now() - Duration::hours(24);

        let total = all.len();
        let delivered = all.iter().filter(|m| m.delivered).count();
        let emergency = all
            .iter()
            .filter(|m| m.priority == Priority::Emergency)
            .count();
        let recent_24h = all.iter().filter(|m| m.created_at >= day_ago).count();

        let mut by_type: HashMap<String, usize> = HashMap::new();
        let mut by_priority: HashMap<String, usize> = HashMap::new();
        for m in &all {
            *by_type.entry(label(&m.message_type)).or_default() += 1;
            *by_priority.entry(label(&m.priority)).or_default() += 1;
        }

        Ok(EmergencyStats {
            total,
            delivered,
            emergency,
            recent_24h,
            delivery_rate: if total > 0 {
                delivered as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            by_type,
            by_priority,
        })
    }
}

/// Wire name of a unit enum variant ("emergency", "resource-request", ...).
fn label<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}
